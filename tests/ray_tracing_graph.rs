//! End-to-end tests for the ray-tracing task graph.
//!
//! These tests drive the public API the way a frame loop does: compile-time
//! collaborators (pipeline, scene buffers, TLAS) are registered on a
//! hardware-free device, the orchestrator is created once, and every frame
//! rebinds the five slots and executes. Assertions inspect the submissions
//! the device retained.

use std::sync::Arc;

use rstest::rstest;

use raytrace_graph::{
    BufferDescriptor, BufferId, BufferUsage, CameraSource, Command, Device, GpuContext, ImageId,
    ImageDescriptor, ImageUsage, RayTracePushConstants, RayTracingGraph, RayTracingParams,
    RayTracingPipeline, RayTracingPipelineInfo, ShaderBindingTableManager, ShaderGroup, Swapchain,
    SwapchainInfo, TlasDescriptor, TlasId,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FixedCamera {
    buffer: BufferId,
}

impl CameraSource for FixedCamera {
    fn camera_buffer(&self) -> BufferId {
        self.buffer
    }
}

struct TestContext {
    device: Arc<Device>,
    swapchain: Arc<Swapchain>,
    pipeline: Arc<RayTracingPipeline>,
    camera: FixedCamera,
    tlas: TlasId,
    rigid_bodies: BufferId,
    aabbs: BufferId,
}

impl TestContext {
    fn new(width: u32, height: u32) -> Self {
        init_logging();
        let device = Device::new("test device");
        let swapchain = Swapchain::new(
            device.clone(),
            SwapchainInfo {
                width,
                height,
                image_count: 2,
                name: "test swapchain".to_string(),
            },
        )
        .unwrap();

        let pipeline = RayTracingPipeline::new(
            device.clone(),
            RayTracingPipelineInfo {
                name: "test_rt".to_string(),
                shader_groups: vec![
                    ShaderGroup::ray_generation("rgen"),
                    ShaderGroup::miss("rmiss"),
                    ShaderGroup::hit("rchit"),
                ],
                max_ray_recursion_depth: 2,
            },
        )
        .unwrap();

        let camera = FixedCamera {
            buffer: device
                .create_buffer(
                    &BufferDescriptor::new(256, BufferUsage::UNIFORM).with_label("camera"),
                )
                .unwrap(),
        };
        let tlas = device
            .create_tlas(&TlasDescriptor::new().with_label("scene"))
            .unwrap();
        let rigid_bodies = device
            .create_buffer(
                &BufferDescriptor::new(4096, BufferUsage::STORAGE).with_label("rigid bodies"),
            )
            .unwrap();
        let aabbs = device
            .create_buffer(&BufferDescriptor::new(2048, BufferUsage::STORAGE).with_label("aabbs"))
            .unwrap();

        Self {
            device,
            swapchain,
            pipeline,
            camera,
            tlas,
            rigid_bodies,
            aabbs,
        }
    }

    fn gpu(&self) -> GpuContext {
        GpuContext {
            device: self.device.clone(),
            swapchain: self.swapchain.clone(),
        }
    }

    /// Create the orchestrator with a freshly built SBT.
    fn created_graph(&self) -> (RayTracingGraph, ShaderBindingTableManager) {
        let mut sbt_manager =
            ShaderBindingTableManager::new(self.pipeline.clone(), self.device.clone());
        let sbt = sbt_manager.build().unwrap();

        let mut graph = RayTracingGraph::new(self.gpu());
        assert!(graph.create(
            "ray_tracing_task_graph",
            RayTracingParams {
                pipeline: self.pipeline.clone(),
                shader_binding_table: sbt,
            },
        ));
        (graph, sbt_manager)
    }

    /// Bind the swapchain's next image plus the scene resources.
    fn bind_frame(&self, graph: &mut RayTracingGraph) -> ImageId {
        let image = self.swapchain.acquire_next_image();
        assert!(graph.update_resources(
            image,
            &self.camera,
            self.tlas,
            self.rigid_bodies,
            self.aabbs,
        ));
        image
    }
}

#[test]
fn create_succeeds_exactly_once() {
    let ctx = TestContext::new(1280, 720);
    let (mut graph, sbt_manager) = ctx.created_graph();

    // Second create fails and leaves the graph usable.
    let sbt = sbt_manager.sbt_pair().unwrap();
    assert!(!graph.create(
        "second",
        RayTracingParams {
            pipeline: ctx.pipeline.clone(),
            shader_binding_table: Default::default(),
        },
    ));
    assert!(graph.is_initialized());
    assert!(sbt_manager.is_allocated());
    assert!(!sbt.buffer.is_empty());

    ctx.bind_frame(&mut graph);
    assert!(graph.execute());
}

#[test]
fn operations_before_create_fail_without_side_effects() {
    let ctx = TestContext::new(1280, 720);
    let mut graph = RayTracingGraph::new(ctx.gpu());

    let image = ctx.swapchain.acquire_next_image();
    assert!(!graph.update_resources(
        image,
        &ctx.camera,
        ctx.tlas,
        ctx.rigid_bodies,
        ctx.aabbs
    ));
    assert!(!graph.execute());
    assert_eq!(ctx.device.submission_count(), 0);
}

#[rstest]
#[case::hd(1280, 720)]
#[case::full_hd(1920, 1080)]
fn execute_records_dispatch_sized_to_swapchain(#[case] width: u32, #[case] height: u32) {
    let ctx = TestContext::new(width, height);
    let (mut graph, sbt_manager) = ctx.created_graph();

    let image = ctx.bind_frame(&mut graph);
    assert!(graph.execute());
    assert_eq!(ctx.device.submission_count(), 1);

    let submission = ctx.device.last_submission().unwrap();
    assert_eq!(submission.name, "ray_tracing_task_graph");

    // Pipeline bind, constant block, dispatch, in that order.
    let [Command::SetPipeline(pipeline), Command::PushConstant(constants), Command::TraceRays(trace)] =
        &submission.commands[..]
    else {
        panic!("unexpected command stream: {:?}", submission.commands);
    };

    assert!(Arc::ptr_eq(pipeline, &ctx.pipeline));
    assert_eq!(trace.width, width);
    assert_eq!(trace.height, height);
    assert_eq!(trace.depth, 1);

    // The dispatch uses the frozen SBT regions.
    let regions = &sbt_manager.sbt_pair().unwrap().entries.group_regions;
    assert_eq!(trace.shader_binding_table.raygen_region, regions[0].region);
    assert_eq!(trace.shader_binding_table.miss_region, regions[1].region);
    assert_eq!(trace.shader_binding_table.hit_region, regions[2].region);
    assert!(trace.shader_binding_table.callable_region.is_empty());

    // The constant block references the bound attachment set by index.
    let block: RayTracePushConstants = bytemuck::pod_read_unaligned(constants);
    assert_eq!(block.attachment_count, 5);
    assert_eq!(block.attachments[0], image.to_raw());
    assert_eq!(block.attachments[1], ctx.camera.buffer.to_raw());
    assert_eq!(block.attachments[2], ctx.tlas.to_raw());
    assert_eq!(block.attachments[3], ctx.rigid_bodies.to_raw());
    assert_eq!(block.attachments[4], ctx.aabbs.to_raw());
}

#[test]
fn execute_without_bound_resources_fails() {
    let ctx = TestContext::new(1280, 720);
    let (mut graph, _sbt_manager) = ctx.created_graph();

    // Created but never bound: recording cannot resolve the slots.
    assert!(!graph.execute());
    assert_eq!(ctx.device.submission_count(), 0);
}

#[test]
fn rebinding_redirects_the_same_graph() {
    let ctx = TestContext::new(1280, 720);
    let (mut graph, _sbt_manager) = ctx.created_graph();

    // Frame 1 on the swapchain image.
    ctx.bind_frame(&mut graph);
    assert!(graph.execute());

    // Frame 2 on an off-screen target with a different extent, same graph.
    let offscreen = ctx
        .device
        .create_image(&ImageDescriptor::new_2d(640, 480, ImageUsage::STORAGE))
        .unwrap();
    assert!(graph.update_resources(
        offscreen,
        &ctx.camera,
        ctx.tlas,
        ctx.rigid_bodies,
        ctx.aabbs
    ));
    assert!(graph.execute());

    assert_eq!(ctx.device.submission_count(), 2);
    let submission = ctx.device.last_submission().unwrap();
    let Some(Command::TraceRays(trace)) = submission
        .commands
        .iter()
        .find(|c| matches!(c, Command::TraceRays(_)))
    else {
        panic!("expected a dispatch");
    };
    assert_eq!(trace.width, 640);
    assert_eq!(trace.height, 480);
}

#[test]
fn swapchain_resize_flows_through_rebind() {
    let ctx = TestContext::new(1280, 720);
    let (mut graph, _sbt_manager) = ctx.created_graph();

    ctx.bind_frame(&mut graph);
    assert!(graph.execute());

    ctx.swapchain.resize(1920, 1080).unwrap();
    ctx.bind_frame(&mut graph);
    assert!(graph.execute());

    let submission = ctx.device.last_submission().unwrap();
    let Some(Command::TraceRays(trace)) = submission
        .commands
        .iter()
        .find(|c| matches!(c, Command::TraceRays(_)))
    else {
        panic!("expected a dispatch");
    };
    assert_eq!(trace.width, 1920);
    assert_eq!(trace.height, 1080);
}

#[test]
fn destroy_retires_the_orchestrator() {
    let ctx = TestContext::new(1280, 720);
    let (mut graph, _sbt_manager) = ctx.created_graph();

    graph.destroy();
    assert!(!graph.is_initialized());

    let image = ctx.swapchain.acquire_next_image();
    assert!(!graph.update_resources(
        image,
        &ctx.camera,
        ctx.tlas,
        ctx.rigid_bodies,
        ctx.aabbs
    ));
    assert!(!graph.execute());

    // Create is one-shot per instance; a retired orchestrator stays retired.
    assert!(!graph.create(
        "again",
        RayTracingParams {
            pipeline: ctx.pipeline.clone(),
            shader_binding_table: Default::default(),
        },
    ));
}

#[test]
fn sbt_rebuild_swaps_allocation_under_a_live_graph() {
    let ctx = TestContext::new(1280, 720);
    let mut sbt_manager =
        ShaderBindingTableManager::new(ctx.pipeline.clone(), ctx.device.clone());

    let first = sbt_manager.build().unwrap();
    let first_buffer = sbt_manager.sbt_pair().unwrap().buffer;

    // Free then build: fresh buffers, same region mapping rule.
    sbt_manager.free();
    let second = sbt_manager.build().unwrap();
    let second_buffer = sbt_manager.sbt_pair().unwrap().buffer;

    assert_ne!(first_buffer, second_buffer);
    assert_eq!(first.raygen_region, second.raygen_region);
    assert_eq!(first.miss_region, second.miss_region);
    assert_eq!(first.hit_region, second.hit_region);
    assert!(second.callable_region.is_empty());

    // The rebuilt SBT drives a dispatch like the first one did.
    let mut graph = RayTracingGraph::new(ctx.gpu());
    assert!(graph.create(
        "ray_tracing_task_graph",
        RayTracingParams {
            pipeline: ctx.pipeline.clone(),
            shader_binding_table: second,
        },
    ));
    ctx.bind_frame(&mut graph);
    assert!(graph.execute());
}

#[test]
fn sbt_manager_teardown_leaves_no_buffers_behind() {
    let ctx = TestContext::new(1280, 720);
    let baseline = ctx.device.buffer_count();

    {
        let mut sbt_manager =
            ShaderBindingTableManager::new(ctx.pipeline.clone(), ctx.device.clone());
        sbt_manager.build().unwrap();
        assert_eq!(ctx.device.buffer_count(), baseline + 2);

        // Double free must not reach the device twice.
        sbt_manager.free();
        sbt_manager.free();
        assert_eq!(ctx.device.buffer_count(), baseline);

        sbt_manager.build().unwrap();
        assert_eq!(ctx.device.buffer_count(), baseline + 2);
    }

    // Drop released the rebuilt allocation.
    assert_eq!(ctx.device.buffer_count(), baseline);
}
