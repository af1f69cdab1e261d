//! Swapchain image ring.
//!
//! A minimal presentation surface: a fixed-size ring of device images at one
//! extent. Real surface creation and presentation engines live outside this
//! crate; the ring provides the swapchain images the task graph's
//! present boundary and per-frame rebinding need.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{Device, ImageId};
use crate::error::RayTracingError;
use crate::types::{Extent3d, ImageDescriptor, ImageUsage};

/// Parameters for creating a swapchain.
#[derive(Debug, Clone)]
pub struct SwapchainInfo {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Number of images in the ring.
    pub image_count: u32,
    /// Swapchain name.
    pub name: String,
}

impl Default for SwapchainInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            image_count: 3,
            name: String::new(),
        }
    }
}

struct SwapchainState {
    extent: Extent3d,
    images: Vec<ImageId>,
    acquire_index: usize,
}

/// A ring of presentable images.
pub struct Swapchain {
    device: Arc<Device>,
    name: String,
    state: RwLock<SwapchainState>,
}

impl Swapchain {
    /// Create a swapchain on the given device.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent or image count is zero, or if image
    /// creation fails.
    pub fn new(device: Arc<Device>, info: SwapchainInfo) -> Result<Arc<Self>, RayTracingError> {
        if info.image_count == 0 {
            return Err(RayTracingError::InvalidParameter(
                "swapchain needs at least one image".to_string(),
            ));
        }

        let extent = Extent3d::new_2d(info.width, info.height);
        let images = create_ring(&device, &info.name, extent, info.image_count)?;
        log::info!(
            "Created swapchain `{}` ({}x{}, {} images)",
            info.name,
            info.width,
            info.height,
            info.image_count
        );

        Ok(Arc::new(Self {
            device,
            name: info.name,
            state: RwLock::new(SwapchainState {
                extent,
                images,
                acquire_index: 0,
            }),
        }))
    }

    /// Get the swapchain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device the images live on.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Get the current surface extent.
    pub fn extent(&self) -> Extent3d {
        self.state.read().extent
    }

    /// Get the number of images in the ring.
    pub fn image_count(&self) -> usize {
        self.state.read().images.len()
    }

    /// Get all images in the ring.
    pub fn images(&self) -> Vec<ImageId> {
        self.state.read().images.clone()
    }

    /// Acquire the next image in the ring.
    pub fn acquire_next_image(&self) -> ImageId {
        let mut state = self.state.write();
        let id = state.images[state.acquire_index];
        state.acquire_index = (state.acquire_index + 1) % state.images.len();
        id
    }

    /// Recreate the ring at a new extent.
    ///
    /// # Errors
    ///
    /// Returns an error if the new extent is zero or image creation fails.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), RayTracingError> {
        let mut state = self.state.write();
        let count = state.images.len() as u32;

        let extent = Extent3d::new_2d(width, height);
        let images = create_ring(&self.device, &self.name, extent, count)?;

        for image in state.images.drain(..) {
            if let Err(err) = self.device.destroy_image(image) {
                log::warn!("Failed to destroy swapchain image on resize: {err}");
            }
        }

        log::info!("Resized swapchain `{}` to {}x{}", self.name, width, height);
        state.extent = extent;
        state.images = images;
        state.acquire_index = 0;
        Ok(())
    }
}

fn create_ring(
    device: &Arc<Device>,
    name: &str,
    extent: Extent3d,
    count: u32,
) -> Result<Vec<ImageId>, RayTracingError> {
    let mut images = Vec::with_capacity(count as usize);
    for index in 0..count {
        let descriptor = ImageDescriptor {
            label: Some(format!("{name} image {index}")),
            size: extent,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::STORAGE,
        };
        match device.create_image(&descriptor) {
            Ok(id) => images.push(id),
            Err(err) => {
                for id in images {
                    let _ = device.destroy_image(id);
                }
                return Err(err);
            }
        }
    }
    Ok(images)
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if !self.device.is_valid() {
            return;
        }
        for image in self.state.read().images.iter() {
            let _ = self.device.destroy_image(*image);
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Swapchain")
            .field("name", &self.name)
            .field("extent", &state.extent)
            .field("images", &state.images.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_swapchain() -> (Arc<Device>, Arc<Swapchain>) {
        let device = Device::new("test");
        let swapchain = Swapchain::new(
            device.clone(),
            SwapchainInfo {
                width: 1280,
                height: 720,
                image_count: 2,
                name: "main".to_string(),
            },
        )
        .unwrap();
        (device, swapchain)
    }

    #[test]
    fn test_acquire_rotates_ring() {
        let (_, swapchain) = test_swapchain();
        let images = swapchain.images();
        assert_eq!(swapchain.acquire_next_image(), images[0]);
        assert_eq!(swapchain.acquire_next_image(), images[1]);
        assert_eq!(swapchain.acquire_next_image(), images[0]);
    }

    #[test]
    fn test_resize_recreates_images() {
        let (device, swapchain) = test_swapchain();
        let old = swapchain.images();

        swapchain.resize(1920, 1080).unwrap();

        assert_eq!(swapchain.extent().width, 1920);
        assert_eq!(swapchain.image_count(), 2);
        for image in old {
            assert!(device.image_info(image).is_none());
        }
        for image in swapchain.images() {
            assert_eq!(device.image_info(image).unwrap().size.width, 1920);
        }
    }

    #[test]
    fn test_drop_releases_images() {
        let (device, swapchain) = test_swapchain();
        assert_eq!(device.image_count(), 2);
        drop(swapchain);
        assert_eq!(device.image_count(), 0);
    }

    #[test]
    fn test_zero_extent_rejected() {
        let device = Device::new("test");
        let result = Swapchain::new(
            device,
            SwapchainInfo {
                width: 0,
                height: 0,
                image_count: 2,
                name: "bad".to_string(),
            },
        );
        assert!(result.is_err());
    }
}
