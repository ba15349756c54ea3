// PipelineExecutionContext (spec §2, §6): per-pipeline shared state handed
// to a stage on every `execute` call - the operator-handler table, the
// means to reach downstream task queues, a buffer provider, and this
// pipeline's own identity as an output origin with its own contiguous
// sequence-number space (spec §6: "sequence numbers per origin are
// contiguous and begin at 0; the source assigns them" - here, each pipeline
// is the "source" of its own output stream).

use crate::handler::OperatorHandler;
use crate::reconfig::ReconfigurationMessage;
use nes_base::{Error, Result};
use nes_common::{ChunkNumber, OperatorId, OriginId, PipelineId, QueryId, SequenceNumber};
use nes_memory::TupleBuffer;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Where a pipeline or stage gets the output buffers it writes into.
/// Implemented for `nes_memory::BufferManager` and `LocalBufferPool`; a
/// stage only ever sees this trait, never the concrete pool type, so a
/// worker's local pool and the engine's global pool are interchangeable
/// from the stage's point of view.
pub trait BufferProvider: Send + Sync + fmt::Debug {
    fn get_buffer_blocking(&self) -> TupleBuffer;
    fn get_buffer_timeout(&self, timeout: Duration) -> Option<TupleBuffer>;
    fn get_unpooled_buffer(&self, size: usize) -> TupleBuffer;
}

impl BufferProvider for Arc<nes_memory::BufferManager> {
    fn get_buffer_blocking(&self) -> TupleBuffer {
        nes_memory::BufferManager::get_buffer_blocking(self)
    }
    fn get_buffer_timeout(&self, timeout: Duration) -> Option<TupleBuffer> {
        nes_memory::BufferManager::get_buffer_timeout(self, timeout)
    }
    fn get_unpooled_buffer(&self, size: usize) -> TupleBuffer {
        nes_memory::BufferManager::get_unpooled_buffer(self, size)
    }
}

impl BufferProvider for Arc<nes_memory::LocalBufferPool> {
    fn get_buffer_blocking(&self) -> TupleBuffer {
        nes_memory::LocalBufferPool::get_buffer_blocking(self)
    }
    fn get_buffer_timeout(&self, timeout: Duration) -> Option<TupleBuffer> {
        nes_memory::LocalBufferPool::get_buffer_timeout(self, timeout)
    }
    fn get_unpooled_buffer(&self, size: usize) -> TupleBuffer {
        nes_memory::LocalBufferPool::get_unpooled_buffer(self, size)
    }
}

/// Where a pipeline's output tasks and in-band reconfiguration messages go
/// (spec §4.10: "Pipelines post tasks targeting their successors via the
/// execution context"). Implemented by `nes-runtime`'s task-queue registry;
/// `nes-execution` never depends on `nes-runtime`, so this trait is the
/// seam between them.
pub trait TaskSink: Send + Sync + fmt::Debug {
    fn submit_data(&self, pipeline: PipelineId, buffer: TupleBuffer);
    fn submit_control(&self, pipeline: PipelineId, message: ReconfigurationMessage);
}

#[derive(Debug)]
struct NullTaskSink;

impl TaskSink for NullTaskSink {
    fn submit_data(&self, _pipeline: PipelineId, _buffer: TupleBuffer) {}
    fn submit_control(&self, _pipeline: PipelineId, _message: ReconfigurationMessage) {}
}

pub struct PipelineExecutionContext {
    query_id: QueryId,
    pipeline_id: PipelineId,
    origin_id: OriginId,
    buffer_provider: Arc<dyn BufferProvider>,
    operator_handlers: Vec<Arc<dyn OperatorHandler>>,
    successors: Vec<PipelineId>,
    task_sink: Arc<dyn TaskSink>,
    next_sequence_number: AtomicU64,
}

impl PipelineExecutionContext {
    pub fn new(
        query_id: QueryId,
        pipeline_id: PipelineId,
        origin_id: OriginId,
        buffer_provider: Arc<dyn BufferProvider>,
        operator_handlers: Vec<Arc<dyn OperatorHandler>>,
        successors: Vec<PipelineId>,
        task_sink: Arc<dyn TaskSink>,
    ) -> Self {
        PipelineExecutionContext {
            query_id,
            pipeline_id,
            origin_id,
            buffer_provider,
            operator_handlers,
            successors,
            task_sink,
            next_sequence_number: AtomicU64::new(0),
        }
    }

    /// A context with no successors and a no-op task sink, useful for unit
    /// tests of stages that only need to read the buffer provider and
    /// operator-handler table.
    pub fn for_test(
        query_id: QueryId,
        pipeline_id: PipelineId,
        origin_id: OriginId,
        buffer_provider: Arc<dyn BufferProvider>,
        operator_handlers: Vec<Arc<dyn OperatorHandler>>,
    ) -> Self {
        Self::new(query_id, pipeline_id, origin_id, buffer_provider, operator_handlers, Vec::new(), Arc::new(NullTaskSink))
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    pub fn origin_id(&self) -> OriginId {
        self.origin_id
    }

    pub fn successors(&self) -> &[PipelineId] {
        &self.successors
    }

    pub fn operator_handlers(&self) -> &[Arc<dyn OperatorHandler>] {
        &self.operator_handlers
    }

    pub fn get_operator_handler(&self, index: usize) -> Result<Arc<dyn OperatorHandler>> {
        self.operator_handlers
            .get(index)
            .cloned()
            .ok_or_else(|| Error::invariant_violation(format!("no operator handler at index {index} for pipeline {}", self.pipeline_id)))
    }

    pub fn allocate_buffer(&self) -> TupleBuffer {
        self.buffer_provider.get_buffer_blocking()
    }

    pub fn allocate_buffer_timeout(&self, timeout: Duration) -> Option<TupleBuffer> {
        self.buffer_provider.get_buffer_timeout(timeout)
    }

    pub fn allocate_unpooled_buffer(&self, size: usize) -> TupleBuffer {
        self.buffer_provider.get_unpooled_buffer(size)
    }

    /// Stamps `buffer` with this pipeline's origin id and the next
    /// contiguous sequence number, then submits it to every successor's
    /// task queue (spec §4.10). Single-chunk by default; use
    /// `dispatch_buffer_chunk` for a stage splitting one input into several
    /// outputs.
    pub fn dispatch_buffer(&self, buffer: TupleBuffer) -> Result<()> {
        self.dispatch_buffer_chunk(buffer, ChunkNumber::new(0), true)
    }

    pub fn dispatch_buffer_chunk(&self, mut buffer: TupleBuffer, chunk: ChunkNumber, last_chunk: bool) -> Result<()> {
        let seq = SequenceNumber::new(self.next_sequence_number.fetch_add(1, Ordering::Relaxed));
        buffer.set_origin_id(self.origin_id)?;
        buffer.set_sequence_number(seq)?;
        buffer.set_chunk_number(chunk, last_chunk)?;
        for successor in &self.successors {
            self.task_sink.submit_data(*successor, buffer.clone());
        }
        Ok(())
    }

    /// Posts an in-band reconfiguration message to every successor (spec
    /// §4.10), e.g. when this pipeline's producer count reaches zero and it
    /// must emit its own end-of-stream downstream.
    pub fn dispatch_control(&self, message: ReconfigurationMessage) {
        for successor in &self.successors {
            self.task_sink.submit_control(*successor, message);
        }
    }
}

impl fmt::Debug for PipelineExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutionContext")
            .field("query_id", &self.query_id)
            .field("pipeline_id", &self.pipeline_id)
            .field("origin_id", &self.origin_id)
            .field("successors", &self.successors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_memory::{BufferManager, BufferManagerConfig};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct RecordingSink {
        data: Mutex<Vec<(PipelineId, u64)>>,
        control: Mutex<Vec<(PipelineId, ReconfigurationMessage)>>,
    }

    impl TaskSink for RecordingSink {
        fn submit_data(&self, pipeline: PipelineId, buffer: TupleBuffer) {
            self.data.lock().push((pipeline, buffer.metadata().sequence_number.as_u64()));
        }
        fn submit_control(&self, pipeline: PipelineId, message: ReconfigurationMessage) {
            self.control.lock().push((pipeline, message));
        }
    }

    fn buffers() -> Arc<dyn BufferProvider> {
        Arc::new(BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 32, local_pool_capacity: 2 }))
    }

    #[test]
    fn dispatch_stamps_origin_and_contiguous_sequence_numbers() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = PipelineExecutionContext::new(
            QueryId::new(1),
            PipelineId::new(2),
            OriginId::new(9),
            buffers(),
            Vec::new(),
            vec![PipelineId::new(3), PipelineId::new(4)],
            sink.clone(),
        );
        ctx.dispatch_buffer(ctx.allocate_buffer()).unwrap();
        ctx.dispatch_buffer(ctx.allocate_buffer()).unwrap();
        let data = sink.data.lock();
        assert_eq!(data.len(), 4); // 2 successors * 2 dispatches
        let seqs: Vec<u64> = data.iter().filter(|(p, _)| *p == PipelineId::new(3)).map(|(_, s)| *s).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn dispatch_control_reaches_every_successor() {
        let sink = Arc::new(RecordingSink::default());
        let ctx = PipelineExecutionContext::new(
            QueryId::new(1),
            PipelineId::new(2),
            OriginId::new(0),
            buffers(),
            Vec::new(),
            vec![PipelineId::new(3), PipelineId::new(4)],
            sink.clone(),
        );
        ctx.dispatch_control(ReconfigurationMessage::SoftEndOfStream);
        assert_eq!(sink.control.lock().len(), 2);
    }

    #[test]
    fn missing_operator_handler_is_an_invariant_violation() {
        let ctx = PipelineExecutionContext::for_test(QueryId::new(0), PipelineId::new(0), OriginId::new(0), buffers(), Vec::new());
        assert!(ctx.get_operator_handler(0).is_err());
    }
}
