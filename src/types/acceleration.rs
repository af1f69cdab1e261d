//! Acceleration structure descriptors.
//!
//! Acceleration structure *construction* happens outside this crate; the
//! descriptor only carries what the device registry needs to track a
//! top-level acceleration structure handle.

/// Descriptor for registering a top-level acceleration structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TlasDescriptor {
    /// Debug label for the acceleration structure.
    pub label: Option<String>,
}

impl TlasDescriptor {
    /// Create a new TLAS descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
