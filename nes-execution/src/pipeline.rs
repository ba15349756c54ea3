// ExecutablePipeline (spec §3 "ExecutablePipeline state machine", §4.8): a
// stage plus its execution context plus the bookkeeping that turns a flat
// sequence of `execute`/reconfigure calls into the state machine spec §3
// names: `{Created, Running, Stopped, Failed}`, with its own end-of-stream
// emitted downstream exactly once, when the producer counter reaches zero.

use crate::context::PipelineExecutionContext;
use crate::handler::OperatorHandler;
use crate::reconfig::ReconfigurationMessage;
use crate::stage::{ExecutablePipelineStage, ExecutionResult};
use crate::worker_context::WorkerContext;
use nes_base::{Error, Result};
use nes_common::QueryTerminationType;
use parking_lot::Mutex;
use nes_memory::TupleBuffer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineStatus {
    Created,
    Running,
    Stopped,
    Failed,
}

pub struct ExecutablePipeline {
    context: Arc<PipelineExecutionContext>,
    stage: Mutex<Box<dyn ExecutablePipelineStage>>,
    active_producers: AtomicU32,
    status: Mutex<PipelineStatus>,
    last_termination: Mutex<Option<QueryTerminationType>>,
}

impl ExecutablePipeline {
    pub fn new(context: Arc<PipelineExecutionContext>, stage: Box<dyn ExecutablePipelineStage>, initial_producers: u32) -> Self {
        ExecutablePipeline {
            context,
            stage: Mutex::new(stage),
            active_producers: AtomicU32::new(initial_producers),
            status: Mutex::new(PipelineStatus::Created),
            last_termination: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<PipelineExecutionContext> {
        &self.context
    }

    pub fn status(&self) -> PipelineStatus {
        *self.status.lock()
    }

    /// Calls `stage.setup` and transitions `Created -> Running`. A failure
    /// transitions to `Failed` and returns the error (spec §4.8).
    pub fn setup(&self) -> Result<()> {
        let mut status = self.status.lock();
        if *status != PipelineStatus::Created {
            return Ok(());
        }
        match self.stage.lock().setup(&self.context) {
            Ok(()) => {
                *status = PipelineStatus::Running;
                debug!(target: "nes", pipeline_id = %self.context.pipeline_id(), "pipeline running");
                Ok(())
            }
            Err(err) => {
                *status = PipelineStatus::Failed;
                warn!(target: "nes", pipeline_id = %self.context.pipeline_id(), error = %err, "pipeline setup failed");
                Err(err)
            }
        }
    }

    /// Delegates one input buffer to the stage. The pipeline never calls
    /// this concurrently with `stop` for itself (spec §4.8 invariant); the
    /// caller (the worker loop in `nes-runtime`) is responsible for that by
    /// construction, since both travel through the same per-pipeline task
    /// queue.
    pub fn execute(&self, buffer: TupleBuffer, worker: &mut WorkerContext) -> Result<ExecutionResult> {
        if self.status() != PipelineStatus::Running {
            return Err(Error::invariant_violation(format!(
                "execute called on pipeline {} in status {:?}",
                self.context.pipeline_id(),
                self.status()
            )));
        }
        let mut stage = self.stage.lock();
        match stage.execute(buffer, &self.context, worker) {
            Ok(result) => Ok(result),
            Err(err) => {
                *self.status.lock() = PipelineStatus::Failed;
                warn!(target: "nes", pipeline_id = %self.context.pipeline_id(), error = %err, "pipeline stage failed");
                Err(Error::user_stage(UserStageFailure(err.to_string())))
            }
        }
    }

    /// Called by an upstream pipeline when it starts, once per upstream
    /// producer this pipeline has.
    pub fn increment_producer_count(&self) {
        self.active_producers.fetch_add(1, Ordering::SeqCst);
    }

    /// Called when an upstream producer reaches end-of-stream. Returns
    /// `true` exactly once, the time the counter reaches zero - the caller
    /// uses that to know it must stop the stage and propagate (spec §4.8).
    fn decrement_producer_count(&self) -> bool {
        self.active_producers.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Applies an in-band reconfiguration message (spec §4.10).
    pub fn reconfigure(&self, message: ReconfigurationMessage) -> Result<()> {
        match message {
            ReconfigurationMessage::Start => {
                self.setup()?;
                self.context.dispatch_control(ReconfigurationMessage::Start);
                Ok(())
            }
            ReconfigurationMessage::SoftEndOfStream | ReconfigurationMessage::HardEndOfStream => {
                let termination = if message == ReconfigurationMessage::HardEndOfStream {
                    QueryTerminationType::Hard
                } else {
                    QueryTerminationType::Graceful
                };
                *self.last_termination.lock() = Some(termination);
                if self.decrement_producer_count() {
                    self.stop()?;
                    self.context.dispatch_control(message);
                }
                Ok(())
            }
            ReconfigurationMessage::Destroy => {
                let termination = (*self.last_termination.lock()).unwrap_or(QueryTerminationType::Graceful);
                for handler in self.context.operator_handlers() {
                    handler.stop(termination, &self.context)?;
                }
                self.context.dispatch_control(ReconfigurationMessage::Destroy);
                Ok(())
            }
        }
    }

    /// Calls `stage.stop` and transitions to `Stopped`. Idempotent (spec
    /// §4.8).
    pub fn stop(&self) -> Result<()> {
        let mut status = self.status.lock();
        if *status == PipelineStatus::Stopped {
            return Ok(());
        }
        self.stage.lock().stop(&self.context)?;
        *status = PipelineStatus::Stopped;
        debug!(target: "nes", pipeline_id = %self.context.pipeline_id(), "pipeline stopped");
        Ok(())
    }
}

/// Wraps a stage's `Err` so `Error::user_stage` can box it as the
/// `UserStageError` source without requiring every stage author to produce
/// a `std::error::Error` themselves beyond `nes_base::Error`, which already
/// implements it.
#[derive(Debug)]
struct UserStageFailure(String);

impl std::fmt::Display for UserStageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UserStageFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferProvider, PipelineExecutionContext};
    use nes_common::{OriginId, PipelineId, QueryId};
    use nes_memory::{BufferManager, BufferManagerConfig, LocalBufferPool};

    struct CountingStage {
        setups: u32,
        executes: u32,
        stops: u32,
        fail_on_execute: bool,
    }

    impl ExecutablePipelineStage for CountingStage {
        fn setup(&mut self, _ctx: &PipelineExecutionContext) -> Result<()> {
            self.setups += 1;
            Ok(())
        }
        fn execute(&mut self, _buffer: TupleBuffer, _ctx: &PipelineExecutionContext, _worker: &mut WorkerContext) -> Result<ExecutionResult> {
            self.executes += 1;
            if self.fail_on_execute {
                return Err(Error::ConfigError("boom".into()));
            }
            Ok(ExecutionResult::Ok)
        }
        fn stop(&mut self, _ctx: &PipelineExecutionContext) -> Result<()> {
            self.stops += 1;
            Ok(())
        }
    }

    fn make_pipeline(fail: bool, producers: u32) -> (Arc<ExecutablePipeline>, Arc<BufferManager>) {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 32, local_pool_capacity: 2 });
        let ctx = Arc::new(PipelineExecutionContext::for_test(
            QueryId::new(0),
            PipelineId::new(0),
            OriginId::new(0),
            mgr.clone() as Arc<dyn BufferProvider>,
            Vec::new(),
        ));
        let stage = Box::new(CountingStage { setups: 0, executes: 0, stops: 0, fail_on_execute: fail });
        (Arc::new(ExecutablePipeline::new(ctx, stage, producers)), mgr)
    }

    fn worker_ctx(mgr: &Arc<BufferManager>) -> WorkerContext {
        WorkerContext::new(nes_common::WorkerId::new(0), LocalBufferPool::new(mgr.clone(), 2))
    }

    #[test]
    fn setup_transitions_created_to_running_once() {
        let (pipeline, _mgr) = make_pipeline(false, 1);
        assert_eq!(pipeline.status(), PipelineStatus::Created);
        pipeline.setup().unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Running);
        pipeline.setup().unwrap(); // idempotent, no panic
    }

    #[test]
    fn failing_execute_transitions_to_failed() {
        let (pipeline, mgr) = make_pipeline(true, 1);
        pipeline.setup().unwrap();
        let mut worker = worker_ctx(&mgr);
        let buf = mgr.get_buffer_blocking();
        assert!(pipeline.execute(buf, &mut worker).is_err());
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
    }

    #[test]
    fn soft_eos_stops_and_propagates_only_when_producers_reach_zero() {
        let (pipeline, _mgr) = make_pipeline(false, 2);
        pipeline.setup().unwrap();
        pipeline.reconfigure(ReconfigurationMessage::SoftEndOfStream).unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Running);
        pipeline.reconfigure(ReconfigurationMessage::SoftEndOfStream).unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Stopped);
    }

    #[test]
    fn execute_after_stop_is_an_invariant_violation() {
        let (pipeline, mgr) = make_pipeline(false, 1);
        pipeline.setup().unwrap();
        pipeline.reconfigure(ReconfigurationMessage::HardEndOfStream).unwrap();
        let mut worker = worker_ctx(&mgr);
        let buf = mgr.get_buffer_blocking();
        assert!(pipeline.execute(buf, &mut worker).is_err());
    }
}
