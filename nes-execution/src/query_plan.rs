// ExecutableQueryPlan (spec §4.9): the DAG of pipelines for one deployed
// query, tracking overall status from the aggregate of source, pipeline and
// sink terminations. Sources and sinks are tracked by count here rather than
// as trait objects owned by this crate - the concrete `DataSource`/`DataSink`
// registries live in `nes-runtime`, which depends on this crate, not the
// other way around (spec §6: "nes-execution never depends on nes-runtime").

use crate::pipeline::ExecutablePipeline;
use nes_base::Result;
use nes_common::QueryId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryPlanStatus {
    Created,
    Deployed,
    Running,
    Stopped,
    Finished,
    ErrorState,
    Invalid,
}

impl QueryPlanStatus {
    /// Terminal states are absorbing (spec §4.9): once reached, no further
    /// transition is accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryPlanStatus::Finished | QueryPlanStatus::Stopped | QueryPlanStatus::ErrorState | QueryPlanStatus::Invalid)
    }
}

/// Callback surface for query status changes (spec §7:
/// `onQueryStatusChange(queryId, status, reason)`).
pub trait QueryStatusListener: Send + Sync {
    fn on_query_status_change(&self, query_id: QueryId, status: QueryPlanStatus, reason: Option<String>);
}

/// A listener that does nothing, for deployments that don't need one.
#[derive(Debug, Default)]
pub struct NullQueryStatusListener;

impl QueryStatusListener for NullQueryStatusListener {
    fn on_query_status_change(&self, _query_id: QueryId, _status: QueryPlanStatus, _reason: Option<String>) {}
}

pub struct ExecutableQueryPlan {
    query_id: QueryId,
    pipelines: Vec<Arc<ExecutablePipeline>>,
    source_count: u32,
    sink_count: u32,
    status: Mutex<QueryPlanStatus>,
    sinks_finished: AtomicU32,
    listener: Arc<dyn QueryStatusListener>,
}

impl ExecutableQueryPlan {
    pub fn new(
        query_id: QueryId,
        pipelines: Vec<Arc<ExecutablePipeline>>,
        source_count: u32,
        sink_count: u32,
        listener: Arc<dyn QueryStatusListener>,
    ) -> Self {
        ExecutableQueryPlan {
            query_id,
            pipelines,
            source_count,
            sink_count,
            status: Mutex::new(QueryPlanStatus::Created),
            sinks_finished: AtomicU32::new(0),
            listener,
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn pipelines(&self) -> &[Arc<ExecutablePipeline>] {
        &self.pipelines
    }

    pub fn status(&self) -> QueryPlanStatus {
        *self.status.lock()
    }

    fn transition(&self, next: QueryPlanStatus, reason: Option<String>) {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return;
        }
        *status = next;
        drop(status);
        match next {
            QueryPlanStatus::ErrorState => error!(target: "nes", query_id = %self.query_id, ?next, "query transitioned"),
            QueryPlanStatus::Invalid => warn!(target: "nes", query_id = %self.query_id, ?next, "query transitioned"),
            _ => debug!(target: "nes", query_id = %self.query_id, ?next, "query transitioned"),
        }
        self.listener.on_query_status_change(self.query_id, next, reason);
    }

    /// Runs every pipeline's `setup`, topologically-ordered by the caller
    /// (spec §4.9 "pipelines topologically ordered"). `Created -> Deployed`
    /// on success; `ConfigError` keeps the plan at `Created` (spec §7).
    pub fn deploy(&self) -> Result<()> {
        if self.status() != QueryPlanStatus::Created {
            return Ok(());
        }
        for pipeline in &self.pipelines {
            if let Err(err) = pipeline.setup() {
                if matches!(err, nes_base::Error::ConfigError(_)) {
                    return Err(err);
                }
                self.transition(QueryPlanStatus::ErrorState, Some(err.to_string()));
                return Err(err);
            }
        }
        self.transition(QueryPlanStatus::Deployed, None);
        Ok(())
    }

    pub fn start(&self) {
        self.transition(QueryPlanStatus::Running, None);
    }

    /// Called once per sink as it observes and processes its own final
    /// end-of-stream. `Finished` exactly when every sink has (spec §4.9).
    pub fn sink_finished(&self) {
        if self.sinks_finished.fetch_add(1, Ordering::SeqCst) + 1 >= self.sink_count {
            self.transition(QueryPlanStatus::Finished, None);
        }
    }

    /// A pipeline stage failed fatally (spec §7 `UserStageError`): the
    /// owning pipeline is already `Failed`; the plan moves to `ErrorState`.
    pub fn report_fatal_error(&self, reason: String) {
        self.transition(QueryPlanStatus::ErrorState, Some(reason));
    }

    /// `Stop` (spec §4.10): flips the plan's status directly; the caller is
    /// responsible for injecting `HardEndOfStream` at every source so
    /// workers observe it in-band and terminate the pipeline graph cleanly.
    pub fn stop(&self) {
        self.transition(QueryPlanStatus::Stopped, None);
    }

    pub fn source_count(&self) -> u32 {
        self.source_count
    }

    pub fn sink_count(&self) -> u32 {
        self.sink_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferProvider, PipelineExecutionContext};
    use crate::stage::{ExecutablePipelineStage, ExecutionResult};
    use crate::worker_context::WorkerContext;
    use nes_common::{OriginId, PipelineId};
    use nes_memory::{BufferManager, BufferManagerConfig};
    use parking_lot::Mutex as PMutex;
    use std::sync::Arc;

    struct NoopStage;
    impl ExecutablePipelineStage for NoopStage {
        fn execute(&mut self, _buffer: nes_memory::TupleBuffer, _ctx: &PipelineExecutionContext, _worker: &mut WorkerContext) -> Result<ExecutionResult> {
            Ok(ExecutionResult::Ok)
        }
    }

    #[derive(Default)]
    struct RecordingListener(PMutex<Vec<QueryPlanStatus>>);
    impl QueryStatusListener for RecordingListener {
        fn on_query_status_change(&self, _query_id: QueryId, status: QueryPlanStatus, _reason: Option<String>) {
            self.0.lock().push(status);
        }
    }

    fn plan(sink_count: u32) -> (Arc<ExecutableQueryPlan>, Arc<RecordingListener>) {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 2, buffer_size: 32, local_pool_capacity: 1 });
        let ctx = Arc::new(PipelineExecutionContext::for_test(
            QueryId::new(1),
            PipelineId::new(0),
            OriginId::new(0),
            mgr as Arc<dyn BufferProvider>,
            Vec::new(),
        ));
        let pipeline = Arc::new(ExecutablePipeline::new(ctx, Box::new(NoopStage), 1));
        let listener = Arc::new(RecordingListener::default());
        (Arc::new(ExecutableQueryPlan::new(QueryId::new(1), vec![pipeline], 1, sink_count, listener.clone())), listener)
    }

    #[test]
    fn deploy_then_start_reaches_running() {
        let (plan, listener) = plan(1);
        plan.deploy().unwrap();
        assert_eq!(plan.status(), QueryPlanStatus::Deployed);
        plan.start();
        assert_eq!(plan.status(), QueryPlanStatus::Running);
        assert_eq!(*listener.0.lock(), vec![QueryPlanStatus::Deployed, QueryPlanStatus::Running]);
    }

    #[test]
    fn finished_only_after_every_sink_reports() {
        let (plan, _listener) = plan(2);
        plan.deploy().unwrap();
        plan.start();
        plan.sink_finished();
        assert_eq!(plan.status(), QueryPlanStatus::Running);
        plan.sink_finished();
        assert_eq!(plan.status(), QueryPlanStatus::Finished);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let (plan, _listener) = plan(1);
        plan.deploy().unwrap();
        plan.start();
        plan.report_fatal_error("boom".into());
        assert_eq!(plan.status(), QueryPlanStatus::ErrorState);
        plan.start(); // ignored, already terminal
        assert_eq!(plan.status(), QueryPlanStatus::ErrorState);
    }
}
