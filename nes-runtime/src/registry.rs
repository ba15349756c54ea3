// PipelineRegistry: maps a deployed pipeline's id to the pipeline itself and
// the query plan that owns it, and implements `nes_execution::TaskSink` by
// pushing onto the shared queue (spec §4.10: "pipelines post tasks targeting
// their successors via the execution context").

use crate::task::{Task, TaskKind};
use nes_common::PipelineId;
use nes_execution::{ExecutablePipeline, ExecutableQueryPlan, ReconfigurationMessage, TaskSink};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

struct Entry {
    pipeline: Arc<ExecutablePipeline>,
    plan: Arc<ExecutableQueryPlan>,
}

pub struct PipelineRegistry {
    sender: crossbeam::channel::Sender<Task>,
    entries: RwLock<HashMap<PipelineId, Entry>>,
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry").field("pipelines", &self.entries.read().len()).finish()
    }
}

impl PipelineRegistry {
    pub fn new(sender: crossbeam::channel::Sender<Task>) -> Arc<Self> {
        Arc::new(PipelineRegistry { sender, entries: RwLock::new(HashMap::new()) })
    }

    pub fn register(&self, pipeline: Arc<ExecutablePipeline>, plan: Arc<ExecutableQueryPlan>) {
        self.entries.write().insert(pipeline.context().pipeline_id(), Entry { pipeline, plan });
    }

    pub fn unregister(&self, pipeline: PipelineId) {
        self.entries.write().remove(&pipeline);
    }

    pub fn get(&self, pipeline: PipelineId) -> Option<(Arc<ExecutablePipeline>, Arc<ExecutableQueryPlan>)> {
        self.entries.read().get(&pipeline).map(|e| (e.pipeline.clone(), e.plan.clone()))
    }

    /// Pushes a task for `pipeline` directly onto the shared queue, bypassing
    /// the `TaskSink` trait. Used by sources, which target a pipeline rather
    /// than one of their own successors.
    pub fn submit(&self, pipeline: PipelineId, kind: TaskKind) {
        if self.sender.send(Task { pipeline, kind }).is_err() {
            warn!(target: "nes", %pipeline, "task queue disconnected, dropping task");
        }
    }
}

impl TaskSink for PipelineRegistry {
    fn submit_data(&self, pipeline: PipelineId, buffer: nes_memory::TupleBuffer) {
        self.submit(pipeline, TaskKind::Data(buffer));
    }

    fn submit_control(&self, pipeline: PipelineId, message: ReconfigurationMessage) {
        self.submit(pipeline, TaskKind::Control(message));
    }
}
