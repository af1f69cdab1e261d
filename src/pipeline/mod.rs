//! Ray-tracing pipeline handle.
//!
//! A [`RayTracingPipeline`] represents an already compiled GPU ray-tracing
//! program. Compilation happens outside this crate; the handle carries the
//! declared shader groups and knows how to lay out a default shader binding
//! table over them.
//!
//! Pipelines are shared via `Arc`: the shader binding table manager and any
//! task dispatching with the pipeline hold references, and none of them has
//! destruction authority.

mod sbt;

pub use sbt::{
    GroupRegion, SbtEntries, SbtPair, ShaderBindingTable, ShaderBindingTableManager, StridedRegion,
};

use std::sync::Arc;

use crate::device::Device;
use crate::error::RayTracingError;
use crate::types::{BufferDescriptor, BufferUsage};

/// Kind of a shader group within a ray-tracing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderGroupKind {
    /// Ray-generation shader.
    RayGeneration,
    /// Miss shader.
    Miss,
    /// Hit group (closest-hit / any-hit / intersection).
    Hit,
    /// Callable shader.
    Callable,
}

/// One shader group of a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderGroup {
    /// Entry point name.
    pub name: String,
    /// Group kind.
    pub kind: ShaderGroupKind,
}

impl ShaderGroup {
    /// Create a ray-generation group.
    pub fn ray_generation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::RayGeneration,
        }
    }

    /// Create a miss group.
    pub fn miss(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::Miss,
        }
    }

    /// Create a hit group.
    pub fn hit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::Hit,
        }
    }

    /// Create a callable group.
    pub fn callable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShaderGroupKind::Callable,
        }
    }
}

/// Parameters for registering a compiled ray-tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct RayTracingPipelineInfo {
    /// Pipeline name.
    pub name: String,
    /// Shader groups in dispatch-lookup order. For the dispatch task the
    /// expected order is ray-generation, miss, hit.
    pub shader_groups: Vec<ShaderGroup>,
    /// Maximum ray recursion depth the pipeline was compiled for.
    pub max_ray_recursion_depth: u32,
}

/// A compiled ray-tracing pipeline.
pub struct RayTracingPipeline {
    device: Arc<Device>,
    info: RayTracingPipelineInfo,
}

impl RayTracingPipeline {
    /// Size in bytes of one shader group handle.
    pub const GROUP_HANDLE_SIZE: u64 = 32;
    /// Required alignment of entries within a region.
    pub const GROUP_HANDLE_ALIGNMENT: u64 = 32;
    /// Required alignment of region start offsets.
    pub const GROUP_BASE_ALIGNMENT: u64 = 64;

    /// Register a compiled pipeline with the device it was compiled for.
    ///
    /// # Errors
    ///
    /// Returns an error if no shader groups are declared or the first group
    /// is not a ray-generation group.
    pub fn new(
        device: Arc<Device>,
        info: RayTracingPipelineInfo,
    ) -> Result<Arc<Self>, RayTracingError> {
        if info.shader_groups.is_empty() {
            return Err(RayTracingError::InvalidParameter(format!(
                "ray tracing pipeline `{}` declares no shader groups",
                info.name
            )));
        }
        if info.shader_groups[0].kind != ShaderGroupKind::RayGeneration {
            return Err(RayTracingError::InvalidParameter(format!(
                "ray tracing pipeline `{}` must start with a ray-generation group",
                info.name
            )));
        }

        log::info!(
            "Created ray tracing pipeline `{}` with {} shader groups",
            info.name,
            info.shader_groups.len()
        );
        Ok(Arc::new(Self { device, info }))
    }

    /// Get the pipeline name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Get the device this pipeline was compiled for.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Get the declared shader groups.
    pub fn shader_groups(&self) -> &[ShaderGroup] {
        &self.info.shader_groups
    }

    /// Get the number of declared shader groups.
    pub fn group_count(&self) -> usize {
        self.info.shader_groups.len()
    }

    /// Get the maximum ray recursion depth.
    pub fn max_ray_recursion_depth(&self) -> u32 {
        self.info.max_ray_recursion_depth
    }

    /// Allocate a default shader binding table layout for this pipeline.
    ///
    /// Each shader group gets one strided region; region offsets are aligned
    /// to [`Self::GROUP_BASE_ALIGNMENT`] and entries to
    /// [`Self::GROUP_HANDLE_ALIGNMENT`]. The layout is backed by a table
    /// buffer and an entries staging buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer allocation fails. No buffer is leaked on
    /// partial failure.
    pub fn create_default_sbt(&self) -> Result<SbtPair, RayTracingError> {
        let entry_size = align_up(Self::GROUP_HANDLE_SIZE, Self::GROUP_HANDLE_ALIGNMENT);

        let mut group_regions = Vec::with_capacity(self.info.shader_groups.len());
        let mut offset = 0u64;
        for group in &self.info.shader_groups {
            offset = align_up(offset, Self::GROUP_BASE_ALIGNMENT);
            group_regions.push(GroupRegion {
                kind: group.kind,
                region: StridedRegion {
                    offset,
                    stride: entry_size,
                    size: entry_size,
                },
            });
            offset += entry_size;
        }
        let table_size = align_up(offset, Self::GROUP_BASE_ALIGNMENT);

        let buffer = self.device.create_buffer(
            &BufferDescriptor::new(
                table_size,
                BufferUsage::SHADER_BINDING_TABLE | BufferUsage::DEVICE_ADDRESS,
            )
            .with_label(format!("{} sbt table", self.info.name)),
        )?;

        let entries_size = self.info.shader_groups.len() as u64 * Self::GROUP_HANDLE_SIZE;
        let entries_buffer = match self.device.create_buffer(
            &BufferDescriptor::new(
                entries_size,
                BufferUsage::SHADER_BINDING_TABLE | BufferUsage::COPY_DST,
            )
            .with_label(format!("{} sbt entries", self.info.name)),
        ) {
            Ok(id) => id,
            Err(err) => {
                let _ = self.device.destroy_buffer(buffer);
                return Err(err);
            }
        };

        log::trace!(
            "Pipeline `{}`: allocated default sbt, table={} bytes, {} regions",
            self.info.name,
            table_size,
            group_regions.len()
        );

        Ok(SbtPair {
            buffer,
            entries: SbtEntries {
                buffer: entries_buffer,
                group_regions,
            },
        })
    }
}

impl std::fmt::Debug for RayTracingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayTracingPipeline")
            .field("name", &self.info.name)
            .field("groups", &self.info.shader_groups.len())
            .finish()
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
