// A Task is the unit a worker pulls off the shared queue (spec §4.10): data
// and in-band reconfiguration share one path so a worker observes control
// messages in the correct order relative to the buffers they bracket.

use nes_common::PipelineId;
use nes_execution::ReconfigurationMessage;
use nes_memory::TupleBuffer;

#[derive(Debug, Clone)]
pub enum TaskKind {
    Data(TupleBuffer),
    Control(ReconfigurationMessage),
}

/// A task always names the pipeline it targets; the worker pool's queue is
/// shared across every deployed query and pipeline (spec §4.10: "one or more
/// task queues, optionally one per worker" - here, one shared multi-producer
/// multi-consumer queue, which already gives every worker access to every
/// pipeline's work without a separate work-stealing step).
#[derive(Debug, Clone)]
pub struct Task {
    pub pipeline: PipelineId,
    pub kind: TaskKind,
}

/// Reserved pipeline id a worker interprets as "exit the loop" rather than a
/// lookup key. One is queued per worker thread on `QueryManager` shutdown;
/// since the shared queue is FIFO, a poison pill is only consumed once any
/// task ahead of it in send order has been processed.
pub const SHUTDOWN_PIPELINE: PipelineId = PipelineId::new(u64::MAX);
