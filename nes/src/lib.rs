//! Illustrative top-level wiring of the engine (spec §1, §6): a minimal
//! `DataSource`/`DataSink` pair and a two-pipeline query (`Scan -> Map ->
//! Emit`, then a terminal sink stage) exercised end to end through
//! `nes_runtime::QueryManager`. Real source/sink implementations (files,
//! network, message brokers) are out of scope; this module exists to show
//! the pieces wired together the way a top-level binary crate wires a
//! server out of its component crates.

use nes_base::Result;
use nes_common::{DataType, Field, Layout, OriginId, PipelineId, QueryId, QueryTerminationType, Schema};
use nes_execution::{
    BufferProvider, EmitMemoryProvider, ExecutablePipeline, ExecutablePipelineStage, ExecutableQueryPlan, ExecutionResult, FieldValue,
    MapFn, NullQueryStatusListener, OperatorPipelineStage, PhysicalOperator, PipelineExecutionContext, QueryPlanStatus, Record,
    ScanMemoryProvider, WorkerContext,
};
use nes_memory::TupleBuffer;
use nes_runtime::{DataSink, DataSource, QueryManager, QueryManagerConfig, SourceContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn demo_schema() -> Schema {
    Schema::new(Layout::Row, vec![Field::new("v", DataType::I64)])
}

/// Emits `values.len()` single-tuple buffers, then a graceful end-of-stream,
/// the first time `start` is called.
pub struct VecSource {
    values: Vec<i64>,
}

impl VecSource {
    pub fn new(values: Vec<i64>) -> Self {
        VecSource { values }
    }
}

impl DataSource for VecSource {
    fn start(&self, ctx: &SourceContext) -> Result<()> {
        let schema = demo_schema();
        for v in &self.values {
            let mut buffer = ctx.allocate_buffer();
            let emit = EmitMemoryProvider::new(&schema, buffer.size());
            emit.append(&mut buffer, &[FieldValue::I64(*v)])?;
            ctx.emit(buffer)?;
        }
        ctx.emit_control(nes_execution::ReconfigurationMessage::SoftEndOfStream);
        Ok(())
    }

    fn stop(&self, _termination_type: QueryTerminationType) -> Result<()> {
        Ok(())
    }
}

/// Collects every `v` field it sees, for a caller to inspect once the query
/// finishes.
#[derive(Default)]
pub struct CollectingSink {
    values: Mutex<Vec<i64>>,
    finished: AtomicU64,
}

impl CollectingSink {
    pub fn values(&self) -> Vec<i64> {
        self.values.lock().clone()
    }
}

impl DataSink for CollectingSink {
    fn setup(&self) -> Result<()> {
        Ok(())
    }

    fn write_data(&self, buffer: TupleBuffer, _worker: &mut WorkerContext) -> Result<()> {
        let schema = demo_schema();
        let scan = ScanMemoryProvider::new(&schema, buffer.size());
        let mut values = self.values.lock();
        for i in 0..scan.num_tuples(&buffer) {
            if let FieldValue::I64(v) = scan.read_field(&buffer, i, 0)? {
                values.push(v);
            }
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn doubling_map() -> MapFn {
    Arc::new(|record: &Record| -> Record {
        record
            .iter()
            .map(|field| match field {
                FieldValue::I64(v) => FieldValue::I64(v * 2),
                other => *other,
            })
            .collect()
    })
}

/// Builds a `Scan -> Map(double) -> Emit` pipeline feeding a terminal sink
/// stage, deploys and starts it on `qm`, drives `source` to completion, then
/// returns the sink's collected values once the query reaches `Finished`.
pub fn run_demo_query(qm: &QueryManager, source: VecSource) -> Result<Vec<i64>> {
    let schema = demo_schema();
    let query_id = QueryId::new(1);
    let source_pipeline_id = PipelineId::new(0);
    let sink_pipeline_id = PipelineId::new(1);
    let sink = Arc::new(CollectingSink::default());

    let sink_ctx = Arc::new(PipelineExecutionContext::new(
        query_id,
        sink_pipeline_id,
        OriginId::new(1),
        qm.buffer_manager().clone() as Arc<dyn BufferProvider>,
        Vec::new(),
        Vec::new(),
        qm.task_sink(),
    ));

    let plan_handle: Arc<Mutex<Option<Arc<ExecutableQueryPlan>>>> = Arc::new(Mutex::new(None));
    let plan_handle_for_stage = plan_handle.clone();
    let sink_pipeline = Arc::new(ExecutablePipeline::new(
        sink_ctx,
        Box::new(LazySinkStage { sink: sink.clone(), plan: plan_handle_for_stage }),
        1,
    ));

    let source_ctx = Arc::new(PipelineExecutionContext::new(
        query_id,
        source_pipeline_id,
        OriginId::new(0),
        qm.buffer_manager().clone() as Arc<dyn BufferProvider>,
        Vec::new(),
        vec![sink_pipeline_id],
        qm.task_sink(),
    ));
    let source_stage = OperatorPipelineStage::new(vec![
        PhysicalOperator::Scan { schema: schema.clone() },
        PhysicalOperator::Map { project: doubling_map() },
        PhysicalOperator::Emit { schema: schema.clone() },
    ]);
    let source_pipeline = Arc::new(ExecutablePipeline::new(source_ctx, Box::new(source_stage), 1));

    let plan = Arc::new(ExecutableQueryPlan::new(
        query_id,
        vec![source_pipeline.clone(), sink_pipeline.clone()],
        1,
        1,
        Arc::new(NullQueryStatusListener),
    ));
    *plan_handle.lock() = Some(plan.clone());

    qm.deploy_and_start(plan.clone(), &[source_pipeline.clone()])?;

    let source_context = SourceContext::new(OriginId::new(0), source_pipeline_id, qm.buffer_manager().clone(), qm.registry().clone());
    source.start(&source_context)?;

    for _ in 0..200 {
        if plan.status() == QueryPlanStatus::Finished {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    info!(target: "nes", status = ?plan.status(), "demo query reached terminal poll");

    Ok(sink.values())
}

/// The terminal stage of the demo pipeline graph. It needs the plan it
/// belongs to (for `sink_finished`), but the plan can only be constructed
/// once every pipeline it contains already exists. This indirection breaks
/// that cycle: the stage reads the plan through a handle filled in
/// immediately after `ExecutableQueryPlan::new`, before the pipeline ever
/// runs.
struct LazySinkStage {
    sink: Arc<dyn DataSink>,
    plan: Arc<Mutex<Option<Arc<ExecutableQueryPlan>>>>,
}

impl ExecutablePipelineStage for LazySinkStage {
    fn setup(&mut self, _ctx: &PipelineExecutionContext) -> Result<()> {
        self.sink.setup()
    }

    fn execute(&mut self, buffer: TupleBuffer, _ctx: &PipelineExecutionContext, worker: &mut WorkerContext) -> Result<ExecutionResult> {
        self.sink.write_data(buffer, worker)?;
        Ok(ExecutionResult::Ok)
    }

    fn stop(&mut self, _ctx: &PipelineExecutionContext) -> Result<()> {
        self.sink.shutdown()?;
        if let Some(plan) = self.plan.lock().as_ref() {
            plan.sink_finished();
        }
        Ok(())
    }
}

pub fn default_query_manager() -> QueryManager {
    QueryManager::new(QueryManagerConfig::default())
}
