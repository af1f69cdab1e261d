//! Shader binding table lifecycle.
//!
//! The shader binding table (SBT) maps shader groups to the strided memory
//! regions a trace-rays dispatch looks them up in. [`ShaderBindingTableManager`]
//! owns the backing allocation for exactly one live SBT at a time and exposes
//! the build / rebuild / free discipline:
//!
//! - [`build`](ShaderBindingTableManager::build) returns the region
//!   description, allocating on first use;
//! - [`rebuild`](ShaderBindingTableManager::rebuild) frees the previous
//!   allocation and lays out a fresh one;
//! - [`free`](ShaderBindingTableManager::free) releases the backing buffers
//!   and is idempotent.
//!
//! Whether an allocation is live is encoded in the type: the manager holds
//! `Option<SbtPair>`, and freeing takes the pair out, so a freed table cannot
//! be freed again or handed to a dispatch.
//!
//! Callers must guarantee the GPU is quiescent on the previous allocation
//! before `rebuild` or `free`; the manager does not fence.

use std::sync::Arc;

use crate::device::{BufferId, Device};
use crate::error::RayTracingError;
use crate::pipeline::{RayTracingPipeline, ShaderGroupKind};

/// A strided region of SBT memory, described by offset, stride and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StridedRegion {
    /// Byte offset of the region within the table buffer.
    pub offset: u64,
    /// Byte stride between entries.
    pub stride: u64,
    /// Total region size in bytes.
    pub size: u64,
}

impl StridedRegion {
    /// A region holding no entries.
    pub const EMPTY: Self = Self {
        offset: 0,
        stride: 0,
        size: 0,
    };

    /// Check whether the region holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// The region assigned to one shader group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRegion {
    /// Kind of the shader group the region belongs to.
    pub kind: ShaderGroupKind,
    /// The assigned region.
    pub region: StridedRegion,
}

/// Per-group entries of an allocated SBT.
#[derive(Debug, Clone)]
pub struct SbtEntries {
    /// Staging buffer holding the group handles.
    pub buffer: BufferId,
    /// One region per shader group, in pipeline declaration order.
    pub group_regions: Vec<GroupRegion>,
}

/// An allocated SBT: the table buffer plus its entries.
#[derive(Debug, Clone)]
pub struct SbtPair {
    /// Table buffer the dispatch reads regions from.
    pub buffer: BufferId,
    /// Group handle entries.
    pub entries: SbtEntries,
}

/// The four dispatch-time lookup regions of a shader binding table.
///
/// This is the frozen description a trace-rays dispatch consumes. The
/// callable region is always empty in this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderBindingTable {
    /// Ray-generation shader region.
    pub raygen_region: StridedRegion,
    /// Miss shader region.
    pub miss_region: StridedRegion,
    /// Hit group region.
    pub hit_region: StridedRegion,
    /// Callable shader region.
    pub callable_region: StridedRegion,
}

/// Owns the backing allocation of one shader binding table.
///
/// The manager shares ownership of the pipeline and holds the device it
/// allocates from. Dropping the manager frees the allocation.
///
/// Not internally synchronized; call from the frame-recording thread.
pub struct ShaderBindingTableManager {
    pipeline: Arc<RayTracingPipeline>,
    device: Arc<Device>,
    sbt: Option<SbtPair>,
}

impl ShaderBindingTableManager {
    /// Create a manager for a pipeline. No allocation happens until
    /// [`build`](Self::build) or [`rebuild`](Self::rebuild) is called.
    pub fn new(pipeline: Arc<RayTracingPipeline>, device: Arc<Device>) -> Self {
        Self {
            pipeline,
            device,
            sbt: None,
        }
    }

    /// Get the pipeline this manager builds tables for.
    pub fn pipeline(&self) -> &Arc<RayTracingPipeline> {
        &self.pipeline
    }

    /// Check whether a table is currently allocated.
    pub fn is_allocated(&self) -> bool {
        self.sbt.is_some()
    }

    /// Get the current allocation, if any.
    pub fn sbt_pair(&self) -> Option<&SbtPair> {
        self.sbt.as_ref()
    }

    /// Get the dispatch-time region description of the current table.
    ///
    /// Allocates via [`rebuild`](Self::rebuild) if no table is live;
    /// otherwise this has no side effects.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline exposes fewer than three shader groups; the
    /// fixed raygen/miss/hit mapping requires groups 0..3 to exist.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn build(&mut self) -> Result<ShaderBindingTable, RayTracingError> {
        let Some(pair) = &self.sbt else {
            return self.rebuild();
        };

        let regions = &pair.entries.group_regions;
        assert!(
            regions.len() >= 3,
            "pipeline `{}` exposes {} shader groups, raygen/miss/hit dispatch needs 3",
            self.pipeline.name(),
            regions.len()
        );

        Ok(ShaderBindingTable {
            raygen_region: regions[0].region,
            miss_region: regions[1].region,
            hit_region: regions[2].region,
            callable_region: StridedRegion::EMPTY,
        })
    }

    /// Free any previous table and allocate a fresh default layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails; the previous table is freed
    /// either way.
    pub fn rebuild(&mut self) -> Result<ShaderBindingTable, RayTracingError> {
        self.free();
        let pair = self.pipeline.create_default_sbt()?;
        self.sbt = Some(pair);
        self.build()
    }

    /// Release the backing buffers of the current table.
    ///
    /// Idempotent. If the device is no longer valid the handle is cleared
    /// without destroying anything; there is nothing left to release into.
    pub fn free(&mut self) {
        let Some(pair) = self.sbt.take() else {
            return;
        };

        if !self.device.is_valid() {
            log::warn!(
                "Device lost before sbt of pipeline `{}` was freed",
                self.pipeline.name()
            );
            return;
        }

        // A failed rebuild may have left either buffer unallocated.
        if !pair.buffer.is_empty() {
            if let Err(err) = self.device.destroy_buffer(pair.buffer) {
                log::warn!("Failed to destroy sbt table buffer: {err}");
            }
        }
        if !pair.entries.buffer.is_empty() {
            if let Err(err) = self.device.destroy_buffer(pair.entries.buffer) {
                log::warn!("Failed to destroy sbt entries buffer: {err}");
            }
        }
        log::trace!("Freed sbt of pipeline `{}`", self.pipeline.name());
    }
}

impl Drop for ShaderBindingTableManager {
    fn drop(&mut self) {
        self.free();
    }
}

impl std::fmt::Debug for ShaderBindingTableManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderBindingTableManager")
            .field("pipeline", &self.pipeline.name())
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RayTracingPipelineInfo, ShaderGroup};

    fn test_pipeline(device: &Arc<Device>) -> Arc<RayTracingPipeline> {
        RayTracingPipeline::new(
            device.clone(),
            RayTracingPipelineInfo {
                name: "test_rt".to_string(),
                shader_groups: vec![
                    ShaderGroup::ray_generation("rgen"),
                    ShaderGroup::miss("rmiss"),
                    ShaderGroup::hit("rchit"),
                ],
                max_ray_recursion_depth: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_build_on_fresh_manager_allocates_once() {
        let device = Device::new("test");
        let mut manager = ShaderBindingTableManager::new(test_pipeline(&device), device.clone());
        assert!(!manager.is_allocated());

        let sbt = manager.build().unwrap();
        assert!(manager.is_allocated());
        assert_eq!(device.buffer_count(), 2);

        // Region mapping is fixed: group 0 raygen, 1 miss, 2 hit, callable empty.
        let regions = &manager.sbt_pair().unwrap().entries.group_regions;
        assert_eq!(sbt.raygen_region, regions[0].region);
        assert_eq!(sbt.miss_region, regions[1].region);
        assert_eq!(sbt.hit_region, regions[2].region);
        assert!(sbt.callable_region.is_empty());

        // A second build reuses the allocation.
        let again = manager.build().unwrap();
        assert_eq!(again, sbt);
        assert_eq!(device.buffer_count(), 2);
    }

    #[test]
    fn test_rebuild_replaces_allocation_without_leak() {
        let device = Device::new("test");
        let mut manager = ShaderBindingTableManager::new(test_pipeline(&device), device.clone());

        assert!(manager.sbt_pair().is_none());
        manager.build().unwrap();
        let old_buffer = manager.sbt_pair().unwrap().buffer;

        manager.rebuild().unwrap();
        let new_buffer = manager.sbt_pair().unwrap().buffer;

        // Still exactly one live pair of buffers, with new identity.
        assert_eq!(device.buffer_count(), 2);
        assert_ne!(old_buffer, new_buffer);
        assert!(device.buffer_info(old_buffer).is_none());
        assert!(device.buffer_info(new_buffer).is_some());
    }

    #[test]
    fn test_free_is_idempotent() {
        let device = Device::new("test");
        let mut manager = ShaderBindingTableManager::new(test_pipeline(&device), device.clone());
        manager.build().unwrap();
        assert_eq!(device.buffer_count(), 2);

        manager.free();
        assert!(!manager.is_allocated());
        assert_eq!(device.buffer_count(), 0);

        // Second free must not touch the device again.
        manager.free();
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_free_then_build_produces_fresh_table() {
        let device = Device::new("test");
        let mut manager = ShaderBindingTableManager::new(test_pipeline(&device), device.clone());
        manager.build().unwrap();
        let old_buffer = manager.sbt_pair().unwrap().buffer;

        manager.free();
        let sbt = manager.build().unwrap();

        let pair = manager.sbt_pair().unwrap();
        assert_ne!(pair.buffer, old_buffer);
        assert_eq!(sbt.raygen_region, pair.entries.group_regions[0].region);
    }

    #[test]
    fn test_drop_releases_buffers() {
        let device = Device::new("test");
        {
            let mut manager =
                ShaderBindingTableManager::new(test_pipeline(&device), device.clone());
            manager.build().unwrap();
            assert_eq!(device.buffer_count(), 2);
        }
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_free_with_lost_device_is_silent() {
        let device = Device::new("test");
        let mut manager = ShaderBindingTableManager::new(test_pipeline(&device), device.clone());
        manager.build().unwrap();

        device.invalidate();
        manager.free();
        assert!(!manager.is_allocated());
    }

    #[test]
    #[should_panic(expected = "shader groups")]
    fn test_build_with_too_few_groups_panics() {
        let device = Device::new("test");
        let pipeline = RayTracingPipeline::new(
            device.clone(),
            RayTracingPipelineInfo {
                name: "raygen_only".to_string(),
                shader_groups: vec![ShaderGroup::ray_generation("rgen")],
                max_ray_recursion_depth: 1,
            },
        )
        .unwrap();

        let mut manager = ShaderBindingTableManager::new(pipeline, device);
        let _ = manager.build();
    }
}
