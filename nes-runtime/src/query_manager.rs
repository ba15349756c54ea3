// QueryManager (spec §4.10): the engine's single entry point for deploying,
// starting and stopping queries. Owns the global `BufferManager`, the
// shared task queue and the worker pool that drains it, and the registry
// mapping a deployed pipeline back to its `ExecutablePipeline` and owning
// `ExecutableQueryPlan`.

use crate::config::QueryManagerConfig;
use crate::registry::PipelineRegistry;
use crate::task::{TaskKind, SHUTDOWN_PIPELINE};
use crate::worker_pool::WorkerPool;
use nes_base::Result;
use nes_execution::{ExecutablePipeline, ExecutableQueryPlan, ReconfigurationMessage, TaskSink};
use std::sync::Arc;
use tracing::info;

pub struct QueryManager {
    buffer_manager: Arc<nes_memory::BufferManager>,
    registry: Arc<PipelineRegistry>,
    num_workers: usize,
    worker_pool: Option<WorkerPool>,
}

impl QueryManager {
    pub fn new(config: QueryManagerConfig) -> Self {
        Self::with_buffer_manager(config, nes_memory::BufferManager::new(nes_memory::BufferManagerConfig::default()))
    }

    pub fn with_buffer_manager(config: QueryManagerConfig, buffer_manager: Arc<nes_memory::BufferManager>) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(config.task_queue_capacity);
        let registry = PipelineRegistry::new(sender);
        let worker_pool = WorkerPool::spawn(config.num_workers, receiver, registry.clone(), buffer_manager.clone(), config.local_pool_capacity);
        info!(target: "nes", num_workers = config.num_workers, "query manager started");
        QueryManager { buffer_manager, registry, num_workers: config.num_workers, worker_pool: Some(worker_pool) }
    }

    pub fn buffer_manager(&self) -> &Arc<nes_memory::BufferManager> {
        &self.buffer_manager
    }

    /// The seam a query's pipelines dispatch their own output through (spec
    /// §4.10); pass to each `PipelineExecutionContext` at plan-build time.
    pub fn task_sink(&self) -> Arc<dyn TaskSink> {
        self.registry.clone()
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Registers every pipeline of a freshly built plan, deploys it (runs
    /// each stage's `setup`), transitions it to `Running`, then injects
    /// `Start` at the graph's roots so the in-band reconfiguration reaches
    /// every successor (spec §4.10).
    pub fn deploy_and_start(&self, plan: Arc<ExecutableQueryPlan>, roots: &[Arc<ExecutablePipeline>]) -> Result<()> {
        for pipeline in plan.pipelines() {
            self.registry.register(pipeline.clone(), plan.clone());
        }
        plan.deploy()?;
        plan.start();
        for root in roots {
            self.registry.submit(root.context().pipeline_id(), TaskKind::Control(ReconfigurationMessage::Start));
        }
        Ok(())
    }

    /// Stops a running query (spec §4.10 `Stop`): flips the plan's own
    /// status and injects `HardEndOfStream` at every root so the in-band
    /// message unwinds the whole pipeline graph cooperatively.
    pub fn stop_query(&self, plan: &ExecutableQueryPlan, roots: &[Arc<ExecutablePipeline>]) -> Result<()> {
        for root in roots {
            self.registry.submit(root.context().pipeline_id(), TaskKind::Control(ReconfigurationMessage::HardEndOfStream));
        }
        plan.stop();
        Ok(())
    }

    /// Queues one poison pill per worker thread and waits for them all to
    /// exit. Does not depend on every `TaskSink` clone elsewhere (sources,
    /// the registry itself) having been dropped first, unlike relying on
    /// channel disconnection.
    pub fn shutdown(&mut self) {
        if let Some(pool) = self.worker_pool.take() {
            for _ in 0..self.num_workers {
                self.registry.submit(SHUTDOWN_PIPELINE, TaskKind::Control(ReconfigurationMessage::Destroy));
            }
            pool.join();
        }
    }
}

impl Drop for QueryManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
