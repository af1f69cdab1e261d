//! Declarative task graph.
//!
//! The task graph separates *what depends on what* (declared once) from
//! *which physical resource currently fills each role* (rebound every
//! frame). Persistent slots are registered while the graph records, task
//! nodes are wired to them, and the graph is sealed with three phase
//! boundaries:
//!
//! - [`submit`](TaskGraph::submit) - work is issued;
//! - [`present`](TaskGraph::present) - the result is presented;
//! - [`complete`](TaskGraph::complete) - the graph is sealed and ready to run.
//!
//! After sealing, [`execute`](TaskGraph::execute) runs the same graph every
//! frame against the currently bound resources. Synchronization between
//! tasks is inferred from their declared attachment accesses: a write
//! followed by any access of the same slot, or any access followed by a
//! write, records a barrier. Split barriers and queue transfers are not
//! modeled.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = TaskGraph::new(TaskGraphInfo {
//!     device: device.clone(),
//!     swapchain: Some(swapchain.clone()),
//!     name: "main".to_string(),
//!     ..Default::default()
//! });
//! graph.use_persistent_image(target.clone());
//! graph.add_task(my_task);
//! graph.submit();
//! graph.present();
//! graph.complete();
//!
//! // Every frame:
//! target.set_images(&[acquired]);
//! graph.execute()?;
//! ```

mod resource;
mod task;

pub use resource::{
    TaskBuffer, TaskBufferInfo, TaskImage, TaskImageInfo, TaskTlas, TaskTlasInfo,
};
pub use task::{BarrierInfo, Task, TaskAccess, TaskAttachment, TaskInterface};

use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::CommandRecorder;
use crate::device::Device;
use crate::error::RayTracingError;
use crate::swapchain::Swapchain;

/// Phase of a task graph's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphPhase {
    Recording,
    Submitted,
    Presented,
    Complete,
}

/// Parameters for creating a task graph.
#[derive(Clone, Default)]
pub struct TaskGraphInfo {
    /// Device the graph executes on.
    pub device: Option<Arc<Device>>,
    /// Swapchain presented to, if the graph presents.
    pub swapchain: Option<Arc<Swapchain>>,
    /// Whether to keep a human-readable summary of each execution.
    pub record_debug_information: bool,
    /// Graph name.
    pub name: String,
}

/// A declarative graph of GPU tasks over persistent resource slots.
pub struct TaskGraph {
    device: Arc<Device>,
    swapchain: Option<Arc<Swapchain>>,
    name: String,
    record_debug_information: bool,
    tasks: Vec<Box<dyn Task>>,
    used_images: Vec<TaskImage>,
    used_buffers: Vec<TaskBuffer>,
    used_tlas: Vec<TaskTlas>,
    phase: GraphPhase,
    debug_information: String,
}

impl TaskGraph {
    /// Create a new task graph in the recording phase.
    ///
    /// # Panics
    ///
    /// Panics if `info.device` is not set.
    pub fn new(info: TaskGraphInfo) -> Self {
        let device = info.device.expect("task graph requires a device");
        log::info!("Creating task graph `{}`", info.name);
        Self {
            device,
            swapchain: info.swapchain,
            name: info.name,
            record_debug_information: info.record_debug_information,
            tasks: Vec::new(),
            used_images: Vec::new(),
            used_buffers: Vec::new(),
            used_tlas: Vec::new(),
            phase: GraphPhase::Recording,
            debug_information: String::new(),
        }
    }

    /// Get the graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device the graph executes on.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Register a persistent image slot.
    ///
    /// # Panics
    ///
    /// Panics if the graph is no longer recording.
    pub fn use_persistent_image(&mut self, image: TaskImage) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "cannot declare slots on a sealed graph"
        );
        self.used_images.push(image);
    }

    /// Register a persistent buffer slot.
    ///
    /// # Panics
    ///
    /// Panics if the graph is no longer recording.
    pub fn use_persistent_buffer(&mut self, buffer: TaskBuffer) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "cannot declare slots on a sealed graph"
        );
        self.used_buffers.push(buffer);
    }

    /// Register a persistent acceleration-structure slot.
    ///
    /// # Panics
    ///
    /// Panics if the graph is no longer recording.
    pub fn use_persistent_tlas(&mut self, tlas: TaskTlas) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "cannot declare slots on a sealed graph"
        );
        self.used_tlas.push(tlas);
    }

    /// Add a task node.
    ///
    /// Tasks execute in the order they were added.
    ///
    /// # Panics
    ///
    /// Panics if the graph is no longer recording.
    pub fn add_task(&mut self, task: impl Task + 'static) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "cannot add tasks to a sealed graph"
        );
        log::trace!("TaskGraph `{}`: added task `{}`", self.name, task.name());
        self.tasks.push(Box::new(task));
    }

    /// Get the number of task nodes.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Mark the submit phase boundary: recorded work is issued here.
    ///
    /// # Panics
    ///
    /// Panics if called out of order.
    pub fn submit(&mut self) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "submit must follow recording"
        );
        self.phase = GraphPhase::Submitted;
    }

    /// Mark the present phase boundary: the result reaches the swapchain here.
    ///
    /// # Panics
    ///
    /// Panics if called before [`submit`](Self::submit).
    pub fn present(&mut self) {
        assert_eq!(
            self.phase,
            GraphPhase::Submitted,
            "present must follow submit"
        );
        if self.swapchain.is_none() {
            log::warn!(
                "TaskGraph `{}` presents without a swapchain; present is a no-op",
                self.name
            );
        }
        self.phase = GraphPhase::Presented;
    }

    /// Seal the graph. After this no slots or tasks can be added and the
    /// graph can be executed.
    ///
    /// # Panics
    ///
    /// Panics if called before [`present`](Self::present).
    pub fn complete(&mut self) {
        assert_eq!(
            self.phase,
            GraphPhase::Presented,
            "complete must follow present"
        );
        self.phase = GraphPhase::Complete;
        log::info!(
            "TaskGraph `{}` sealed: {} tasks, {} image / {} buffer / {} tlas slots",
            self.name,
            self.tasks.len(),
            self.used_images.len(),
            self.used_buffers.len(),
            self.used_tlas.len()
        );
    }

    /// Check whether the graph has been sealed.
    pub fn is_complete(&self) -> bool {
        self.phase == GraphPhase::Complete
    }

    /// Run the sealed graph against the currently bound resources.
    ///
    /// Records every task into one command list, inserting inferred
    /// barriers, and submits the list to the device. Returns once recording
    /// completes; GPU completion is not waited on.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is not sealed, a task fails to record,
    /// or the device rejects the submission.
    pub fn execute(&mut self) -> Result<(), RayTracingError> {
        if self.phase != GraphPhase::Complete {
            return Err(RayTracingError::InvalidParameter(format!(
                "task graph `{}` executed before complete()",
                self.name
            )));
        }

        let mut recorder = CommandRecorder::new(self.name.clone());
        let mut last_access: HashMap<String, TaskAccess> = HashMap::new();

        for task in &self.tasks {
            let attachments = task.attachments();
            for attachment in attachments {
                let access = attachment.access();
                if let Some(&previous) = last_access.get(attachment.name()) {
                    if previous.is_write() || access.is_write() {
                        recorder.barrier(BarrierInfo {
                            slot: attachment.name().to_string(),
                            src: previous,
                            dst: access,
                        });
                    }
                }
                last_access.insert(attachment.name().to_string(), access);
            }

            let mut ti = TaskInterface::new(&self.device, &mut recorder, attachments);
            task.record(&mut ti)?;
        }

        if self.record_debug_information {
            self.debug_information = format!(
                "graph `{}`: {} tasks, {} commands",
                self.name,
                self.tasks.len(),
                recorder.len()
            );
        }

        self.device.submit(recorder)
    }

    /// Get the summary of the last execution, if debug recording is enabled.
    pub fn debug_information(&self) -> &str {
        &self.debug_information
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .field("phase", &self.phase)
            .finish()
    }
}

// Ensure TaskGraph is Send + Sync so it can live in whatever owns the frame loop.
static_assertions::assert_impl_all!(TaskGraph: Send, Sync);
