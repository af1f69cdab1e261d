//! Persistent resource slots.
//!
//! A persistent slot is declared once when the graph is built and rebound to
//! a different concrete resource every frame, without redeclaring the graph.
//! Slot handles are cheap clones of a shared inner state, so the handle kept
//! by the caller and the handle wired into a task attachment observe the
//! same binding.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{BufferId, ImageId, TlasId};

/// Parameters for declaring a persistent image slot.
#[derive(Debug, Clone, Default)]
pub struct TaskImageInfo {
    /// Whether this slot is rebound to the acquired swapchain image.
    pub swapchain_image: bool,
    /// Images bound before the first `set_images` call.
    pub initial_images: Vec<ImageId>,
    /// Slot name, used for dependency tracking and debugging.
    pub name: String,
}

/// A persistent image slot.
#[derive(Clone)]
pub struct TaskImage {
    inner: Arc<TaskImageInner>,
}

struct TaskImageInner {
    name: String,
    swapchain_image: bool,
    images: RwLock<Vec<ImageId>>,
}

impl TaskImage {
    /// Declare a new image slot.
    pub fn new(info: TaskImageInfo) -> Self {
        Self {
            inner: Arc::new(TaskImageInner {
                name: info.name,
                swapchain_image: info.swapchain_image,
                images: RwLock::new(info.initial_images),
            }),
        }
    }

    /// Get the slot name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the slot tracks the acquired swapchain image.
    pub fn is_swapchain_image(&self) -> bool {
        self.inner.swapchain_image
    }

    /// Rebind the slot to the given images for the current frame.
    pub fn set_images(&self, images: &[ImageId]) {
        *self.inner.images.write() = images.to_vec();
    }

    /// Get the currently bound images.
    pub fn images(&self) -> Vec<ImageId> {
        self.inner.images.read().clone()
    }
}

impl std::fmt::Debug for TaskImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskImage")
            .field("name", &self.inner.name)
            .field("swapchain_image", &self.inner.swapchain_image)
            .field("bound", &self.inner.images.read().len())
            .finish()
    }
}

/// Parameters for declaring a persistent buffer slot.
#[derive(Debug, Clone, Default)]
pub struct TaskBufferInfo {
    /// Buffers bound before the first `set_buffers` call.
    pub initial_buffers: Vec<BufferId>,
    /// Slot name, used for dependency tracking and debugging.
    pub name: String,
}

/// A persistent buffer slot.
#[derive(Clone)]
pub struct TaskBuffer {
    inner: Arc<TaskBufferInner>,
}

struct TaskBufferInner {
    name: String,
    buffers: RwLock<Vec<BufferId>>,
}

impl TaskBuffer {
    /// Declare a new buffer slot.
    pub fn new(info: TaskBufferInfo) -> Self {
        Self {
            inner: Arc::new(TaskBufferInner {
                name: info.name,
                buffers: RwLock::new(info.initial_buffers),
            }),
        }
    }

    /// Get the slot name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Rebind the slot to the given buffers for the current frame.
    pub fn set_buffers(&self, buffers: &[BufferId]) {
        *self.inner.buffers.write() = buffers.to_vec();
    }

    /// Get the currently bound buffers.
    pub fn buffers(&self) -> Vec<BufferId> {
        self.inner.buffers.read().clone()
    }
}

impl std::fmt::Debug for TaskBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBuffer")
            .field("name", &self.inner.name)
            .field("bound", &self.inner.buffers.read().len())
            .finish()
    }
}

/// Parameters for declaring a persistent acceleration-structure slot.
#[derive(Debug, Clone, Default)]
pub struct TaskTlasInfo {
    /// Acceleration structures bound before the first `set_tlas` call.
    pub initial_tlas: Vec<TlasId>,
    /// Slot name, used for dependency tracking and debugging.
    pub name: String,
}

/// A persistent top-level acceleration structure slot.
#[derive(Clone)]
pub struct TaskTlas {
    inner: Arc<TaskTlasInner>,
}

struct TaskTlasInner {
    name: String,
    tlas: RwLock<Vec<TlasId>>,
}

impl TaskTlas {
    /// Declare a new acceleration-structure slot.
    pub fn new(info: TaskTlasInfo) -> Self {
        Self {
            inner: Arc::new(TaskTlasInner {
                name: info.name,
                tlas: RwLock::new(info.initial_tlas),
            }),
        }
    }

    /// Get the slot name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Rebind the slot to the given acceleration structures.
    pub fn set_tlas(&self, tlas: &[TlasId]) {
        *self.inner.tlas.write() = tlas.to_vec();
    }

    /// Get the currently bound acceleration structures.
    pub fn tlas(&self) -> Vec<TlasId> {
        self.inner.tlas.read().clone()
    }
}

impl std::fmt::Debug for TaskTlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTlas")
            .field("name", &self.inner.name)
            .field("bound", &self.inner.tlas.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_binding() {
        let slot = TaskBuffer::new(TaskBufferInfo {
            name: "camera_buffer".to_string(),
            ..Default::default()
        });
        let wired = slot.clone();
        assert!(wired.buffers().is_empty());

        let id = BufferId::default();
        slot.set_buffers(&[id]);
        assert_eq!(wired.buffers(), vec![id]);
    }

    #[test]
    fn test_rebind_replaces_previous_binding() {
        let slot = TaskImage::new(TaskImageInfo {
            swapchain_image: true,
            name: "swapchain_image".to_string(),
            ..Default::default()
        });
        assert!(slot.is_swapchain_image());

        slot.set_images(&[ImageId::default()]);
        slot.set_images(&[]);
        assert!(slot.images().is_empty());
    }
}
