// ExecutablePipelineStage (spec §2, §6): the opaque unit of work a
// compiled pipeline exposes. How a stage was produced (interpreted
// operator chain, JIT-compiled code) is outside this crate's concern; the
// crate only needs the contract and one concrete implementation of it
// (`crate::operators::OperatorPipelineStage`) to exercise the rest of the
// engine end to end.

use crate::context::PipelineExecutionContext;
use crate::worker_context::WorkerContext;
use nes_base::Result;
use nes_memory::TupleBuffer;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionResult {
    /// Keep going; more input may arrive.
    Ok,
    /// This stage has produced its last output for the current input and
    /// will not be driven again until reconfigured.
    Finished,
}

pub trait ExecutablePipelineStage: Send {
    /// Called once, before the first `execute`. Default: no-op.
    fn setup(&mut self, ctx: &PipelineExecutionContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Consumes one input buffer, optionally emitting zero or more output
    /// buffers via `ctx.dispatch_buffer`. `Err` maps to
    /// `Error::UserStageError` at the pipeline level (spec §7).
    fn execute(&mut self, buffer: TupleBuffer, ctx: &PipelineExecutionContext, worker: &mut WorkerContext) -> Result<ExecutionResult>;

    /// Called once, after the pipeline has observed end-of-stream on every
    /// upstream producer. Default: no-op. Must be idempotent from the
    /// pipeline's point of view (the pipeline itself guards against calling
    /// it twice).
    fn stop(&mut self, ctx: &PipelineExecutionContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}
