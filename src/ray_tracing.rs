//! Ray-tracing dispatch task and its orchestrating graph.
//!
//! [`RayTracingGraph`] declares five persistent slots (swapchain image,
//! camera buffer, top-level acceleration structure, rigid-body buffer and
//! AABB buffer), wires a single [`RayTraceTask`] to them, and seals the
//! graph once. Every frame the caller rebinds the slots with
//! [`update_resources`](RayTracingGraph::update_resources) and records a
//! dispatch with [`execute`](RayTracingGraph::execute); the declared
//! dependencies stay fixed while the concrete resources change (double
//! buffering, window resize, scene updates).
//!
//! Lifecycle operations communicate failure by `bool`: a second `create`,
//! or any operation before a successful `create`, returns `false` without
//! side effects.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::commands::TraceRaysInfo;
use crate::device::{BufferId, Device, ImageId, TlasId};
use crate::error::RayTracingError;
use crate::graph::{
    Task, TaskAccess, TaskAttachment, TaskBuffer, TaskBufferInfo, TaskGraph, TaskGraphInfo,
    TaskImage, TaskImageInfo, TaskInterface, TaskTlas, TaskTlasInfo,
};
use crate::pipeline::{RayTracingPipeline, ShaderBindingTable};
use crate::swapchain::Swapchain;

/// Provider of the current camera buffer.
///
/// The camera manager lives outside this crate; the orchestrator only needs
/// the buffer handle that is valid for the frame being recorded.
pub trait CameraSource {
    /// Get the camera buffer for the current frame.
    fn camera_buffer(&self) -> BufferId;
}

/// The device and swapchain the orchestrator records against.
#[derive(Clone)]
pub struct GpuContext {
    /// Device used for recording and resource queries.
    pub device: Arc<Device>,
    /// Swapchain the graph presents to.
    pub swapchain: Arc<Swapchain>,
}

/// Per-dispatch constant block.
///
/// Shaders resolve the bound attachment set by index through the raw ids in
/// this blob.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RayTracePushConstants {
    /// Raw resource ids of the bound attachments, in declaration order.
    pub attachments: [u64; RayTracePushConstants::MAX_ATTACHMENTS],
    /// Number of valid entries in `attachments`.
    pub attachment_count: u32,
    /// Padding to keep the block 8-byte aligned.
    pub _padding: u32,
}

impl RayTracePushConstants {
    /// Maximum number of attachments the constant block can reference.
    pub const MAX_ATTACHMENTS: usize = 8;

    /// Build the block from an attachment blob.
    ///
    /// # Panics
    ///
    /// Panics if the blob exceeds [`Self::MAX_ATTACHMENTS`] entries.
    pub fn new(blob: &[u64]) -> Self {
        assert!(
            blob.len() <= Self::MAX_ATTACHMENTS,
            "attachment blob has {} entries, constant block fits {}",
            blob.len(),
            Self::MAX_ATTACHMENTS
        );
        let mut attachments = [0u64; Self::MAX_ATTACHMENTS];
        attachments[..blob.len()].copy_from_slice(blob);
        Self {
            attachments,
            attachment_count: blob.len() as u32,
            _padding: 0,
        }
    }
}

/// The single dispatch node of the ray-tracing graph.
///
/// Given the currently bound attachments, binds the pipeline, pushes the
/// attachment constant block, and records one trace-rays dispatch sized to
/// the bound swapchain image. Commands are appended to the frame's
/// recorder; nothing is submitted or waited on here.
pub struct RayTraceTask {
    attachments: Vec<TaskAttachment>,
    pipeline: Arc<RayTracingPipeline>,
    shader_binding_table: ShaderBindingTable,
}

impl RayTraceTask {
    /// Attachment index of the swapchain image.
    pub const AT_SWAPCHAIN: usize = 0;
    /// Attachment index of the camera buffer.
    pub const AT_CAMERA: usize = 1;
    /// Attachment index of the top-level acceleration structure.
    pub const AT_TLAS: usize = 2;
    /// Attachment index of the rigid-body buffer.
    pub const AT_RIGID_BODIES: usize = 3;
    /// Attachment index of the AABB buffer.
    pub const AT_AABBS: usize = 4;

    /// Wire the task to its five slots with a frozen pipeline and SBT.
    pub fn new(
        swapchain_image: TaskImage,
        camera_buffer: TaskBuffer,
        tlas: TaskTlas,
        rigid_bodies: TaskBuffer,
        aabbs: TaskBuffer,
        pipeline: Arc<RayTracingPipeline>,
        shader_binding_table: ShaderBindingTable,
    ) -> Self {
        let attachments = vec![
            TaskAttachment::Image {
                view: swapchain_image,
                access: TaskAccess::ShaderWrite,
            },
            TaskAttachment::Buffer {
                view: camera_buffer,
                access: TaskAccess::ShaderRead,
            },
            TaskAttachment::Tlas {
                view: tlas,
                access: TaskAccess::ShaderRead,
            },
            TaskAttachment::Buffer {
                view: rigid_bodies,
                access: TaskAccess::ShaderRead,
            },
            TaskAttachment::Buffer {
                view: aabbs,
                access: TaskAccess::ShaderRead,
            },
        ];
        Self {
            attachments,
            pipeline,
            shader_binding_table,
        }
    }
}

impl Task for RayTraceTask {
    fn name(&self) -> &str {
        "ray_trace"
    }

    fn attachments(&self) -> &[TaskAttachment] {
        &self.attachments
    }

    fn record(&self, ti: &mut TaskInterface<'_>) -> Result<(), RayTracingError> {
        let image = ti.image(Self::AT_SWAPCHAIN)?;
        let image_info = ti.device().image_info(image).ok_or_else(|| {
            RayTracingError::InvalidParameter("bound swapchain image is stale".to_string())
        })?;

        let constants = RayTracePushConstants::new(&ti.attachment_blob());

        let recorder = ti.recorder();
        recorder.set_pipeline(&self.pipeline);
        recorder.push_constant(&constants);
        recorder.trace_rays(TraceRaysInfo {
            width: image_info.size.width,
            height: image_info.size.height,
            depth: 1,
            shader_binding_table: self.shader_binding_table,
        });
        Ok(())
    }
}

/// Parameters for creating the ray-tracing graph.
#[derive(Clone)]
pub struct RayTracingParams {
    /// The compiled ray-tracing pipeline to dispatch with.
    pub pipeline: Arc<RayTracingPipeline>,
    /// Frozen SBT regions for the dispatch.
    pub shader_binding_table: ShaderBindingTable,
}

/// The five slot handles and the sealed graph of an initialized orchestrator.
struct GraphSlots {
    graph: TaskGraph,
    swapchain_image: TaskImage,
    camera_buffer: TaskBuffer,
    tlas: TaskTlas,
    rigid_bodies: TaskBuffer,
    aabbs: TaskBuffer,
}

enum State {
    Uninitialized,
    Initialized(GraphSlots),
    Retired,
}

/// Orchestrates the single-dispatch ray-tracing task graph.
///
/// `create` is one-shot: it succeeds exactly once per instance, and
/// `destroy` retires the instance for good. All lifecycle operations are
/// assumed called from the single frame-recording thread.
pub struct RayTracingGraph {
    gpu: GpuContext,
    state: State,
}

impl RayTracingGraph {
    /// Create an orchestrator bound to its owning GPU context.
    pub fn new(gpu: GpuContext) -> Self {
        Self {
            gpu,
            state: State::Uninitialized,
        }
    }

    /// Whether `create` has succeeded and `destroy` has not been called.
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    /// Build and seal the one-task graph.
    ///
    /// Declares the five persistent slots, wires the dispatch task to them,
    /// and marks the submit, present and complete phase boundaries. Returns
    /// `false` without mutating anything if the orchestrator was already
    /// created.
    pub fn create(&mut self, name: &str, params: RayTracingParams) -> bool {
        if !matches!(self.state, State::Uninitialized) {
            return false;
        }

        let swapchain_image = TaskImage::new(TaskImageInfo {
            swapchain_image: true,
            name: "swapchain_image".to_string(),
            ..Default::default()
        });
        let camera_buffer = TaskBuffer::new(TaskBufferInfo {
            name: "camera_buffer".to_string(),
            ..Default::default()
        });
        let tlas = TaskTlas::new(TaskTlasInfo {
            name: "tlas".to_string(),
            ..Default::default()
        });
        let rigid_bodies = TaskBuffer::new(TaskBufferInfo {
            name: "rigid_bodies".to_string(),
            ..Default::default()
        });
        let aabbs = TaskBuffer::new(TaskBufferInfo {
            name: "aabbs".to_string(),
            ..Default::default()
        });

        let mut graph = TaskGraph::new(TaskGraphInfo {
            device: Some(self.gpu.device.clone()),
            swapchain: Some(self.gpu.swapchain.clone()),
            record_debug_information: true,
            name: name.to_string(),
        });
        graph.use_persistent_image(swapchain_image.clone());
        graph.use_persistent_buffer(camera_buffer.clone());
        graph.use_persistent_tlas(tlas.clone());
        graph.use_persistent_buffer(rigid_bodies.clone());
        graph.use_persistent_buffer(aabbs.clone());

        graph.add_task(RayTraceTask::new(
            swapchain_image.clone(),
            camera_buffer.clone(),
            tlas.clone(),
            rigid_bodies.clone(),
            aabbs.clone(),
            params.pipeline,
            params.shader_binding_table,
        ));

        graph.submit();
        graph.present();
        graph.complete();

        log::info!("Created ray tracing graph `{name}`");
        self.state = State::Initialized(GraphSlots {
            graph,
            swapchain_image,
            camera_buffer,
            tlas,
            rigid_bodies,
            aabbs,
        });
        true
    }

    /// Rebind all five slots to the given concrete resources.
    ///
    /// Partial rebinding is not supported; every slot is rebound on every
    /// call. Returns `false` if the orchestrator is not initialized.
    pub fn update_resources(
        &mut self,
        swapchain_image: ImageId,
        camera: &dyn CameraSource,
        tlas: TlasId,
        rigid_bodies: BufferId,
        aabbs: BufferId,
    ) -> bool {
        let State::Initialized(slots) = &self.state else {
            return false;
        };

        slots.swapchain_image.set_images(&[swapchain_image]);
        slots.camera_buffer.set_buffers(&[camera.camera_buffer()]);
        slots.tlas.set_tlas(&[tlas]);
        slots.rigid_bodies.set_buffers(&[rigid_bodies]);
        slots.aabbs.set_buffers(&[aabbs]);
        true
    }

    /// Run the sealed graph, recording the dispatch against the currently
    /// bound resources. Does not wait for GPU completion.
    ///
    /// Returns `false` if the orchestrator is not initialized or recording
    /// fails.
    pub fn execute(&mut self) -> bool {
        let State::Initialized(slots) = &mut self.state else {
            return false;
        };

        match slots.graph.execute() {
            Ok(()) => true,
            Err(err) => {
                log::error!("Ray tracing graph execution failed: {err}");
                false
            }
        }
    }

    /// Retire the orchestrator, dropping the sealed graph and the slot
    /// declarations. The instance cannot be re-created afterwards.
    pub fn destroy(&mut self) {
        if matches!(self.state, State::Initialized(_)) {
            log::info!("Destroying ray tracing graph");
        }
        self.state = State::Retired;
    }
}

impl std::fmt::Debug for RayTracingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Uninitialized => "uninitialized",
            State::Initialized(_) => "initialized",
            State::Retired => "retired",
        };
        f.debug_struct("RayTracingGraph")
            .field("state", &state)
            .finish()
    }
}
