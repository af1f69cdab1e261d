//! Error types for the ray-tracing graph.

use thiserror::Error;

/// Errors that can occur in the ray-tracing system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RayTracingError {
    /// Failed to initialize a subsystem.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a GPU resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The GPU device was lost or torn down.
    #[error("GPU device lost")]
    DeviceLost,
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
