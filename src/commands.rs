//! Command recording.
//!
//! A [`CommandRecorder`] collects the GPU commands a task emits during graph
//! execution. Recording never blocks and never talks to hardware; the
//! finished list is handed to [`Device::submit`](crate::device::Device::submit)
//! and retained there for inspection.

use std::sync::Arc;

use bytemuck::Pod;

use crate::graph::BarrierInfo;
use crate::pipeline::{RayTracingPipeline, ShaderBindingTable};

/// Parameters of a trace-rays dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRaysInfo {
    /// Dispatch width in rays.
    pub width: u32,
    /// Dispatch height in rays.
    pub height: u32,
    /// Dispatch depth in rays.
    pub depth: u32,
    /// Shader binding table regions to dispatch with.
    pub shader_binding_table: ShaderBindingTable,
}

/// A single recorded GPU command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Bind a ray-tracing pipeline as the active program.
    SetPipeline(Arc<RayTracingPipeline>),
    /// Push a per-dispatch constant block.
    PushConstant(Vec<u8>),
    /// Dispatch rays.
    TraceRays(TraceRaysInfo),
    /// Synchronization barrier between resource accesses.
    Barrier(BarrierInfo),
}

/// A finished command list accepted by the device.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Name of the graph or recorder that produced the commands.
    pub name: String,
    /// Commands in recording order.
    pub commands: Vec<Command>,
}

/// Records GPU commands for one graph execution.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    name: String,
    commands: Vec<Command>,
}

impl CommandRecorder {
    /// Create a new recorder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// Bind a ray-tracing pipeline.
    pub fn set_pipeline(&mut self, pipeline: &Arc<RayTracingPipeline>) {
        self.commands.push(Command::SetPipeline(pipeline.clone()));
    }

    /// Push a constant block.
    pub fn push_constant<T: Pod>(&mut self, data: &T) {
        self.commands
            .push(Command::PushConstant(bytemuck::bytes_of(data).to_vec()));
    }

    /// Record a trace-rays dispatch.
    pub fn trace_rays(&mut self, info: TraceRaysInfo) {
        log::trace!(
            "CommandRecorder `{}`: trace_rays {}x{}x{}",
            self.name,
            info.width,
            info.height,
            info.depth
        );
        self.commands.push(Command::TraceRays(info));
    }

    /// Record a synchronization barrier.
    pub fn barrier(&mut self, info: BarrierInfo) {
        self.commands.push(Command::Barrier(info));
    }

    /// Get the commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Get the number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Finish recording.
    pub fn finish(self) -> Submission {
        Submission {
            name: self.name,
            commands: self.commands,
        }
    }
}
