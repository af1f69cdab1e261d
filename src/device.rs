//! Graphics device.
//!
//! The [`Device`] is the interface for creating and destroying GPU resources
//! and for accepting recorded command lists. Resources are identified by
//! generation-checked ids ([`BufferId`], [`ImageId`], [`TlasId`]) so a stale
//! id can never alias a newer resource in the same slot.
//!
//! The device performs no actual GPU work: submissions are retained so the
//! recorded commands can be inspected, which keeps every layer above it
//! testable without GPU hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::commands::{CommandRecorder, Submission};
use crate::error::RayTracingError;
use crate::types::{BufferDescriptor, ImageDescriptor, TlasDescriptor};

/// Handle to a GPU buffer.
///
/// The default value is [`BufferId::EMPTY`], which never refers to a live
/// resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: u32,
    generation: u32,
}

impl BufferId {
    /// Id that refers to no buffer.
    pub const EMPTY: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Check whether this id refers to no buffer.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Slot index of this id.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Pack the id into a single value for shader-visible blobs.
    pub fn to_raw(&self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Handle to a GPU image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId {
    index: u32,
    generation: u32,
}

impl ImageId {
    /// Id that refers to no image.
    pub const EMPTY: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Check whether this id refers to no image.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Slot index of this id.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Pack the id into a single value for shader-visible blobs.
    pub fn to_raw(&self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Handle to a top-level acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlasId {
    index: u32,
    generation: u32,
}

impl TlasId {
    /// Id that refers to no acceleration structure.
    pub const EMPTY: Self = Self {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Check whether this id refers to no acceleration structure.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Slot index of this id.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Pack the id into a single value for shader-visible blobs.
    pub fn to_raw(&self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }
}

impl Default for TlasId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Limits of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum buffer size in bytes.
    pub max_buffer_size: u64,
    /// Maximum image dimension in pixels.
    pub max_image_dimension: u32,
    /// Whether ray tracing is supported.
    pub ray_tracing: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_buffer_size: 1 << 30, // 1 GB
            max_image_dimension: 16384,
            ray_tracing: true,
        }
    }
}

/// Slot-based storage with generation counters.
///
/// A destroyed slot bumps its generation, so ids created before the destroy
/// stop resolving.
struct Registry<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    fn insert(&mut self, entry: T) -> (u32, u32) {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            (index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            (index, 0)
        }
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index);
        self.live -= 1;
        Some(entry)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn live(&self) -> usize {
        self.live
    }
}

/// A graphics device.
///
/// Resources are created and destroyed explicitly; id validity is checked on
/// every access. The device can be invalidated to model device loss, after
/// which resource operations fail with [`RayTracingError::DeviceLost`] while
/// queries keep working.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync`; all methods take `&self` and use interior
/// mutability.
pub struct Device {
    name: String,
    capabilities: DeviceCapabilities,
    valid: AtomicBool,
    buffers: RwLock<Registry<BufferDescriptor>>,
    images: RwLock<Registry<ImageDescriptor>>,
    acceleration_structures: RwLock<Registry<TlasDescriptor>>,
    submissions: RwLock<Vec<Submission>>,
}

impl Device {
    /// Create a new device.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        log::info!("Creating device `{name}`");
        Arc::new(Self {
            name,
            capabilities: DeviceCapabilities::default(),
            valid: AtomicBool::new(true),
            buffers: RwLock::new(Registry::new()),
            images: RwLock::new(Registry::new()),
            acceleration_structures: RwLock::new(Registry::new()),
            submissions: RwLock::new(Vec::new()),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Check whether the device is still usable.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the device as lost.
    ///
    /// Subsequent resource creation, destruction and submission fail with
    /// [`RayTracingError::DeviceLost`].
    pub fn invalidate(&self) {
        log::warn!("Device `{}` marked as lost", self.name);
        self.valid.store(false, Ordering::Release);
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost, the size is zero, or the size
    /// exceeds device limits.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferId, RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        if descriptor.size == 0 {
            return Err(RayTracingError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(RayTracingError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        let (index, generation) = self.buffers.write().insert(descriptor.clone());
        log::trace!(
            "Device: created buffer {:?}, size={}",
            descriptor.label,
            descriptor.size
        );
        Ok(BufferId::new(index, generation))
    }

    /// Destroy a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost or the id is empty, stale or
    /// already destroyed.
    pub fn destroy_buffer(&self, id: BufferId) -> Result<(), RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        if id.is_empty() {
            return Err(RayTracingError::InvalidParameter(
                "cannot destroy empty buffer id".to_string(),
            ));
        }
        let descriptor = self
            .buffers
            .write()
            .remove(id.index, id.generation)
            .ok_or_else(|| {
                RayTracingError::InvalidParameter(format!("stale buffer id {:?}", id))
            })?;
        log::trace!("Device: destroyed buffer {:?}", descriptor.label);
        Ok(())
    }

    /// Get the descriptor of a live buffer.
    pub fn buffer_info(&self, id: BufferId) -> Option<BufferDescriptor> {
        self.buffers.read().get(id.index, id.generation).cloned()
    }

    /// Get the number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.read().live()
    }

    /// Create a GPU image.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost, a dimension is zero, or a
    /// dimension exceeds device limits.
    pub fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageId, RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        if descriptor.size.width == 0 || descriptor.size.height == 0 {
            return Err(RayTracingError::InvalidParameter(
                "image dimensions cannot be zero".to_string(),
            ));
        }
        let max_dim = self.capabilities.max_image_dimension;
        if descriptor.size.width > max_dim || descriptor.size.height > max_dim {
            return Err(RayTracingError::InvalidParameter(format!(
                "image dimension exceeds maximum {max_dim}"
            )));
        }

        let (index, generation) = self.images.write().insert(descriptor.clone());
        log::trace!(
            "Device: created image {:?}, size={}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        Ok(ImageId::new(index, generation))
    }

    /// Destroy a GPU image.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost or the id is empty, stale or
    /// already destroyed.
    pub fn destroy_image(&self, id: ImageId) -> Result<(), RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        if id.is_empty() {
            return Err(RayTracingError::InvalidParameter(
                "cannot destroy empty image id".to_string(),
            ));
        }
        let descriptor = self
            .images
            .write()
            .remove(id.index, id.generation)
            .ok_or_else(|| RayTracingError::InvalidParameter(format!("stale image id {:?}", id)))?;
        log::trace!("Device: destroyed image {:?}", descriptor.label);
        Ok(())
    }

    /// Get the descriptor of a live image.
    pub fn image_info(&self, id: ImageId) -> Option<ImageDescriptor> {
        self.images.read().get(id.index, id.generation).cloned()
    }

    /// Get the number of live images.
    pub fn image_count(&self) -> usize {
        self.images.read().live()
    }

    /// Register a top-level acceleration structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost.
    pub fn create_tlas(&self, descriptor: &TlasDescriptor) -> Result<TlasId, RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        let (index, generation) = self
            .acceleration_structures
            .write()
            .insert(descriptor.clone());
        log::trace!("Device: created tlas {:?}", descriptor.label);
        Ok(TlasId::new(index, generation))
    }

    /// Destroy a top-level acceleration structure.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost or the id is empty, stale or
    /// already destroyed.
    pub fn destroy_tlas(&self, id: TlasId) -> Result<(), RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        if id.is_empty() {
            return Err(RayTracingError::InvalidParameter(
                "cannot destroy empty tlas id".to_string(),
            ));
        }
        let descriptor = self
            .acceleration_structures
            .write()
            .remove(id.index, id.generation)
            .ok_or_else(|| RayTracingError::InvalidParameter(format!("stale tlas id {:?}", id)))?;
        log::trace!("Device: destroyed tlas {:?}", descriptor.label);
        Ok(())
    }

    /// Get the descriptor of a live acceleration structure.
    pub fn tlas_info(&self, id: TlasId) -> Option<TlasDescriptor> {
        self.acceleration_structures
            .read()
            .get(id.index, id.generation)
            .cloned()
    }

    /// Get the number of live acceleration structures.
    pub fn tlas_count(&self) -> usize {
        self.acceleration_structures.read().live()
    }

    /// Submit a recorded command list.
    ///
    /// Submissions are retained for inspection; nothing is waited on.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is lost.
    pub fn submit(&self, recorder: CommandRecorder) -> Result<(), RayTracingError> {
        if !self.is_valid() {
            return Err(RayTracingError::DeviceLost);
        }
        let submission = recorder.finish();
        log::trace!(
            "Device: submitted `{}` with {} commands",
            submission.name,
            submission.commands.len()
        );
        self.submissions.write().push(submission);
        Ok(())
    }

    /// Get the number of submissions accepted so far.
    pub fn submission_count(&self) -> usize {
        self.submissions.read().len()
    }

    /// Get a copy of the most recent submission.
    pub fn last_submission(&self) -> Option<Submission> {
        self.submissions.read().last().cloned()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// Ensure Device is Send + Sync
static_assertions::assert_impl_all!(Device: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, ImageUsage};

    #[test]
    fn test_create_and_destroy_buffer() {
        let device = Device::new("test");
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
            .unwrap();
        assert_eq!(device.buffer_count(), 1);
        assert_eq!(device.buffer_info(buffer).unwrap().size, 1024);

        device.destroy_buffer(buffer).unwrap();
        assert_eq!(device.buffer_count(), 0);
        assert!(device.buffer_info(buffer).is_none());
    }

    #[test]
    fn test_double_destroy_fails() {
        let device = Device::new("test");
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        device.destroy_buffer(buffer).unwrap();
        assert!(device.destroy_buffer(buffer).is_err());
    }

    #[test]
    fn test_stale_id_does_not_alias_reused_slot() {
        let device = Device::new("test");
        let first = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        device.destroy_buffer(first).unwrap();

        // Reuses the slot with a bumped generation.
        let second = device
            .create_buffer(&BufferDescriptor::new(128, BufferUsage::UNIFORM))
            .unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(device.buffer_info(first).is_none());
        assert_eq!(device.buffer_info(second).unwrap().size, 128);
    }

    #[test]
    fn test_zero_size_buffer_fails() {
        let device = Device::new("test");
        assert!(device
            .create_buffer(&BufferDescriptor::new(0, BufferUsage::STORAGE))
            .is_err());
    }

    #[test]
    fn test_invalidated_device_rejects_operations() {
        let device = Device::new("test");
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        device.invalidate();
        assert!(!device.is_valid());
        assert_eq!(
            device.create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM)),
            Err(RayTracingError::DeviceLost)
        );
        assert_eq!(
            device.destroy_buffer(buffer),
            Err(RayTracingError::DeviceLost)
        );
        // Queries keep working.
        assert!(device.buffer_info(buffer).is_some());
    }

    #[test]
    fn test_image_info_reports_extent() {
        let device = Device::new("test");
        let image = device
            .create_image(&ImageDescriptor::new_2d(800, 600, ImageUsage::STORAGE))
            .unwrap();
        let info = device.image_info(image).unwrap();
        assert_eq!(info.size.width, 800);
        assert_eq!(info.size.height, 600);
    }

    #[test]
    fn test_tlas_registry() {
        let device = Device::new("test");
        let tlas = device
            .create_tlas(&TlasDescriptor::new().with_label("scene"))
            .unwrap();
        assert_eq!(device.tlas_count(), 1);
        assert_eq!(device.tlas_info(tlas).unwrap().label.as_deref(), Some("scene"));
        device.destroy_tlas(tlas).unwrap();
        assert_eq!(device.tlas_count(), 0);
    }

    #[test]
    fn test_empty_id_is_default() {
        assert!(BufferId::default().is_empty());
        assert!(ImageId::default().is_empty());
        assert!(TlasId::default().is_empty());
    }
}
