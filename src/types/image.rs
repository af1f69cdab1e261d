//! Image types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be used as a color render attachment.
        const COLOR_ATTACHMENT = 1 << 0;
        /// Image can be read/written as a storage image.
        const STORAGE = 1 << 1;
        /// Image can be sampled in shaders.
        const SAMPLED = 1 << 2;
        /// Image can be copied from.
        const TRANSFER_SRC = 1 << 3;
        /// Image can be copied to.
        const TRANSFER_DST = 1 << 4;
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Three-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 for 2D images).
    pub depth: u32,
}

impl Extent3d {
    /// Create a 2D extent with depth 1.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }
}

/// Descriptor for creating an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ImageDescriptor {
    /// Debug label for the image.
    pub label: Option<String>,
    /// Image extent in pixels.
    pub size: Extent3d,
    /// Usage flags.
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// Create a descriptor for a 2D image.
    pub fn new_2d(width: u32, height: u32, usage: ImageUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
