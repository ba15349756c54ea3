// DataSource (spec §6): implemented by plug-ins the engine only knows
// through this trait (spec §1 Non-goal: "source/sink implementations are
// out of scope"). A source owns its own origin id and assigns contiguous
// per-origin sequence numbers as it emits buffers into its configured first
// pipeline's task queue.

use crate::registry::PipelineRegistry;
use crate::task::TaskKind;
use nes_base::Result;
use nes_common::{OriginId, PipelineId, QueryTerminationType};
use nes_memory::TupleBuffer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handed to a `DataSource` on `start`: where to get buffers to fill and
/// where to push them once tagged (spec §6: "emits TupleBuffers... into its
/// configured first pipeline's task queue").
pub struct SourceContext {
    origin_id: OriginId,
    target_pipeline: PipelineId,
    buffer_manager: Arc<nes_memory::BufferManager>,
    registry: Arc<PipelineRegistry>,
    next_sequence_number: AtomicU64,
}

impl SourceContext {
    pub fn new(origin_id: OriginId, target_pipeline: PipelineId, buffer_manager: Arc<nes_memory::BufferManager>, registry: Arc<PipelineRegistry>) -> Self {
        SourceContext { origin_id, target_pipeline, buffer_manager, registry, next_sequence_number: AtomicU64::new(0) }
    }

    pub fn origin_id(&self) -> OriginId {
        self.origin_id
    }

    pub fn allocate_buffer(&self) -> TupleBuffer {
        self.buffer_manager.get_buffer_blocking()
    }

    /// Stamps `buffer` with this source's origin id and the next contiguous
    /// sequence number (spec §6 invariant: "sequence numbers per origin are
    /// contiguous and begin at 0; the source assigns them") then pushes it
    /// onto the target pipeline's task queue.
    pub fn emit(&self, mut buffer: TupleBuffer) -> Result<()> {
        let seq = nes_common::SequenceNumber::new(self.next_sequence_number.fetch_add(1, Ordering::Relaxed));
        buffer.set_origin_id(self.origin_id)?;
        buffer.set_sequence_number(seq)?;
        self.registry.submit(self.target_pipeline, TaskKind::Data(buffer));
        Ok(())
    }

    pub fn emit_control(&self, message: nes_execution::ReconfigurationMessage) {
        self.registry.submit(self.target_pipeline, TaskKind::Control(message));
    }
}

pub trait DataSource: Send + Sync {
    fn start(&self, ctx: &SourceContext) -> Result<()>;
    fn stop(&self, termination_type: QueryTerminationType) -> Result<()>;
}
