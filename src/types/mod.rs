//! Resource descriptor types.

mod acceleration;
mod buffer;
mod image;

pub use acceleration::TlasDescriptor;
pub use buffer::{BufferDescriptor, BufferUsage};
pub use image::{Extent3d, ImageDescriptor, ImageUsage};
