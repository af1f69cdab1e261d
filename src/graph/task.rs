//! Task nodes and their attachment declarations.
//!
//! A task declares how it accesses each persistent slot it touches. The
//! graph uses those declarations to infer execution barriers; the task's
//! `record` callback then reads the currently bound resources through a
//! [`TaskInterface`] and appends commands to the frame's recorder.

use std::sync::Arc;

use crate::commands::CommandRecorder;
use crate::device::{BufferId, Device, ImageId, TlasId};
use crate::error::RayTracingError;

use super::resource::{TaskBuffer, TaskImage, TaskTlas};

/// How a task accesses an attached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAccess {
    /// Read in a shader.
    ShaderRead,
    /// Written from a shader.
    ShaderWrite,
    /// Read and written from a shader.
    ShaderReadWrite,
    /// Source of a copy operation.
    TransferRead,
    /// Destination of a copy operation.
    TransferWrite,
}

impl TaskAccess {
    /// Check if this access reads the resource.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ShaderRead | Self::ShaderReadWrite | Self::TransferRead
        )
    }

    /// Check if this access writes the resource.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::ShaderWrite | Self::ShaderReadWrite | Self::TransferWrite
        )
    }
}

/// A barrier inferred between two accesses of the same slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierInfo {
    /// Name of the slot the barrier protects.
    pub slot: String,
    /// Access the barrier waits for.
    pub src: TaskAccess,
    /// Access the barrier makes safe.
    pub dst: TaskAccess,
}

/// The attachment of one persistent slot to a task.
#[derive(Debug, Clone)]
pub enum TaskAttachment {
    /// Image slot attachment.
    Image {
        /// The attached slot.
        view: TaskImage,
        /// Declared access.
        access: TaskAccess,
    },
    /// Buffer slot attachment.
    Buffer {
        /// The attached slot.
        view: TaskBuffer,
        /// Declared access.
        access: TaskAccess,
    },
    /// Acceleration-structure slot attachment.
    Tlas {
        /// The attached slot.
        view: TaskTlas,
        /// Declared access.
        access: TaskAccess,
    },
}

impl TaskAttachment {
    /// Get the name of the attached slot.
    pub fn name(&self) -> &str {
        match self {
            Self::Image { view, .. } => view.name(),
            Self::Buffer { view, .. } => view.name(),
            Self::Tlas { view, .. } => view.name(),
        }
    }

    /// Get the declared access.
    pub fn access(&self) -> TaskAccess {
        match self {
            Self::Image { access, .. } => *access,
            Self::Buffer { access, .. } => *access,
            Self::Tlas { access, .. } => *access,
        }
    }

    /// Raw id of the first bound resource, for shader-visible blobs.
    ///
    /// Unbound slots resolve to the empty id.
    pub fn bound_raw_id(&self) -> u64 {
        match self {
            Self::Image { view, .. } => view
                .images()
                .first()
                .copied()
                .unwrap_or_default()
                .to_raw(),
            Self::Buffer { view, .. } => view
                .buffers()
                .first()
                .copied()
                .unwrap_or_default()
                .to_raw(),
            Self::Tlas { view, .. } => {
                view.tlas().first().copied().unwrap_or_default().to_raw()
            }
        }
    }
}

/// A node of the task graph.
///
/// Implementations keep their attachment list stable after construction;
/// the graph reads it on every execution.
pub trait Task: Send + Sync {
    /// Get the task name.
    fn name(&self) -> &str;

    /// Get the declared attachments.
    fn attachments(&self) -> &[TaskAttachment];

    /// Record this task's commands against the currently bound resources.
    fn record(&self, ti: &mut TaskInterface<'_>) -> Result<(), RayTracingError>;
}

/// Execution context handed to a task's `record` callback.
pub struct TaskInterface<'a> {
    device: &'a Arc<Device>,
    recorder: &'a mut CommandRecorder,
    attachments: &'a [TaskAttachment],
}

impl<'a> TaskInterface<'a> {
    pub(crate) fn new(
        device: &'a Arc<Device>,
        recorder: &'a mut CommandRecorder,
        attachments: &'a [TaskAttachment],
    ) -> Self {
        Self {
            device,
            recorder,
            attachments,
        }
    }

    /// Get the device the graph executes on.
    pub fn device(&self) -> &Arc<Device> {
        self.device
    }

    /// Get the frame's command recorder.
    pub fn recorder(&mut self) -> &mut CommandRecorder {
        self.recorder
    }

    /// Get the declared attachments.
    pub fn attachments(&self) -> &[TaskAttachment] {
        self.attachments
    }

    /// Resolve the image bound to attachment `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment is not an image slot or nothing is
    /// bound to it.
    pub fn image(&self, index: usize) -> Result<ImageId, RayTracingError> {
        match self.attachments.get(index) {
            Some(TaskAttachment::Image { view, .. }) => {
                view.images().first().copied().ok_or_else(|| {
                    RayTracingError::InvalidParameter(format!(
                        "no image bound to slot `{}`",
                        view.name()
                    ))
                })
            }
            _ => Err(RayTracingError::InvalidParameter(format!(
                "attachment {index} is not an image slot"
            ))),
        }
    }

    /// Resolve the buffer bound to attachment `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment is not a buffer slot or nothing is
    /// bound to it.
    pub fn buffer(&self, index: usize) -> Result<BufferId, RayTracingError> {
        match self.attachments.get(index) {
            Some(TaskAttachment::Buffer { view, .. }) => {
                view.buffers().first().copied().ok_or_else(|| {
                    RayTracingError::InvalidParameter(format!(
                        "no buffer bound to slot `{}`",
                        view.name()
                    ))
                })
            }
            _ => Err(RayTracingError::InvalidParameter(format!(
                "attachment {index} is not a buffer slot"
            ))),
        }
    }

    /// Resolve the acceleration structure bound to attachment `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment is not a TLAS slot or nothing is
    /// bound to it.
    pub fn tlas(&self, index: usize) -> Result<TlasId, RayTracingError> {
        match self.attachments.get(index) {
            Some(TaskAttachment::Tlas { view, .. }) => {
                view.tlas().first().copied().ok_or_else(|| {
                    RayTracingError::InvalidParameter(format!(
                        "no tlas bound to slot `{}`",
                        view.name()
                    ))
                })
            }
            _ => Err(RayTracingError::InvalidParameter(format!(
                "attachment {index} is not a tlas slot"
            ))),
        }
    }

    /// Raw ids of all bound attachments, in declaration order.
    ///
    /// Shaders resolve bound resources by index through this blob.
    pub fn attachment_blob(&self) -> Vec<u64> {
        self.attachments
            .iter()
            .map(TaskAttachment::bound_raw_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::resource::{TaskBufferInfo, TaskImageInfo};
    use crate::types::{ImageDescriptor, ImageUsage};

    #[test]
    fn test_access_classification() {
        assert!(TaskAccess::ShaderRead.is_read());
        assert!(!TaskAccess::ShaderRead.is_write());
        assert!(TaskAccess::ShaderWrite.is_write());
        assert!(!TaskAccess::ShaderWrite.is_read());
        assert!(TaskAccess::ShaderReadWrite.is_read());
        assert!(TaskAccess::ShaderReadWrite.is_write());
    }

    #[test]
    fn test_interface_resolves_bound_image() {
        let device = Device::new("test");
        let image = device
            .create_image(&ImageDescriptor::new_2d(64, 64, ImageUsage::STORAGE))
            .unwrap();

        let slot = TaskImage::new(TaskImageInfo {
            name: "target".to_string(),
            ..Default::default()
        });
        slot.set_images(&[image]);

        let attachments = vec![TaskAttachment::Image {
            view: slot,
            access: TaskAccess::ShaderWrite,
        }];
        let mut recorder = CommandRecorder::new("test");
        let ti = TaskInterface::new(&device, &mut recorder, &attachments);

        assert_eq!(ti.image(0).unwrap(), image);
        assert_eq!(ti.attachment_blob(), vec![image.to_raw()]);
    }

    #[test]
    fn test_interface_rejects_unbound_slot() {
        let device = Device::new("test");
        let slot = TaskBuffer::new(TaskBufferInfo {
            name: "camera_buffer".to_string(),
            ..Default::default()
        });
        let attachments = vec![TaskAttachment::Buffer {
            view: slot,
            access: TaskAccess::ShaderRead,
        }];
        let mut recorder = CommandRecorder::new("test");
        let ti = TaskInterface::new(&device, &mut recorder, &attachments);

        assert!(ti.buffer(0).is_err());
        assert!(ti.image(0).is_err());
    }
}
