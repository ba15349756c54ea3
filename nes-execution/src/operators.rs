// PhysicalOperator (spec §9, "Deep virtual hierarchies for operators"): a
// fixed, closed vocabulary of operator behaviors replacing the original's
// logical/physical/pipeline-operator inheritance tree. `OperatorPipelineStage`
// composes an ordered list of these into one `ExecutablePipelineStage`,
// the engine's stand-in for a compiled pipeline, since code generation
// itself is out of scope (spec §1).
//
// Operators thread a small, per-call `ExecState` through the list: `Scan`
// populates it with decoded records, `Map`/`Selection` transform it in
// place, the windowing/join operators replace it with their output rows,
// and `Emit` writes whatever is in it to a fresh buffer and dispatches that
// buffer downstream.

use crate::context::PipelineExecutionContext;
use crate::join_handler::JoinOperatorHandlerAdapter;
use crate::memory_provider::{EmitMemoryProvider, FieldValue, ScanMemoryProvider};
use crate::stage::{ExecutablePipelineStage, ExecutionResult};
use crate::window_handler::{WindowOperatorHandler, WindowTriggerResult};
use crate::worker_context::WorkerContext;
use nes_base::{Error, Result};
use nes_common::{DataType, OperatorId, Schema, SequenceNumber};
use nes_join::{JoinBuildStore, JoinVariant, JoinedRow};
use nes_memory::TupleBuffer;
use nes_windowing::{AggregationFunction, KeyedPreAggregation, NonKeyedPreAggregation, SliceAssigner};
use std::sync::Arc;

pub type Record = Vec<FieldValue>;
pub type MapFn = Arc<dyn Fn(&Record) -> Record + Send + Sync>;
pub type SelectionFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinSide {
    Left,
    Right,
}

/// One physical operator in a fused pipeline. Field names mirror the
/// vocabulary in spec §9's design note.
pub enum PhysicalOperator {
    Scan { schema: Schema },
    Emit { schema: Schema },
    Map { project: MapFn },
    Selection { predicate: SelectionFn },
    WatermarkAssign { time_field: usize, allowed_lateness: u64 },
    PreAggNonKeyed { operator_id: OperatorId, assigner: SliceAssigner, agg: AggregationFunction, time_field: usize, value_field: usize },
    PreAggKeyed { operator_id: OperatorId, assigner: SliceAssigner, agg: AggregationFunction, time_field: usize, value_field: usize, key_fields: Vec<usize> },
    /// Stages the matching `PreAggNonKeyed`'s closed slices and, if the
    /// handler's global watermark advances, triggers window emission.
    /// Replaces `ExecState::records` with `(start, end, value)` rows.
    /// `assigner`/`agg` must match the paired `PreAggNonKeyed` exactly, they
    /// are only used if this worker never ran that operator (e.g. an empty
    /// input buffer skipped it), to avoid fabricating state with mismatched
    /// slicing from a bare `Default`.
    SliceMergeNonKeyed { source_operator_id: OperatorId, assigner: SliceAssigner, agg: AggregationFunction, handler_index: usize },
    /// Same, for `PreAggKeyed`; emits `(start, end, key fields..., value)`
    /// rows, decoding the key bytes back into typed fields against
    /// `key_types`, which must list the paired `PreAggKeyed`'s `key_fields`
    /// types in the same order.
    SliceMergeKeyed { source_operator_id: OperatorId, assigner: SliceAssigner, agg: AggregationFunction, handler_index: usize, key_types: Vec<DataType> },
    JoinBuild {
        operator_id: OperatorId,
        assigner: SliceAssigner,
        variant: JoinVariant,
        time_field: usize,
        key_fields: Vec<usize>,
        payload_fields: Vec<(usize, DataType)>,
    },
    /// Drains the matching `JoinBuild`'s closed slices, stages them into the
    /// shared handler as this side, and triggers. Replaces
    /// `ExecState::records` with `(start, end, left..., right...)` rows,
    /// decoded from each side's `payload_types` (both are needed even on the
    /// side that never builds the other, since it still decodes the other
    /// side's payload bytes out of a joined row).
    JoinProbe {
        side: JoinSide,
        source_operator_id: OperatorId,
        assigner: SliceAssigner,
        variant: JoinVariant,
        handler_index: usize,
        left_payload_types: Vec<DataType>,
        right_payload_types: Vec<DataType>,
    },
}

struct ExecState {
    records: Vec<Record>,
    watermark: u64,
    origin: nes_common::OriginId,
    seq: SequenceNumber,
}

fn encode_fields(fields: &[FieldValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        match field {
            FieldValue::Bool(v) => out.push(*v as u8),
            FieldValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::VarSized(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    out
}

fn decode_fields(bytes: &[u8], types: &[DataType]) -> Result<Vec<FieldValue>> {
    let mut offset = 0usize;
    let mut out = Vec::with_capacity(types.len());
    for data_type in types {
        let size = data_type.size();
        let slice = bytes
            .get(offset..offset + size)
            .ok_or_else(|| Error::invariant_violation("join payload decode out of bounds"))?;
        let value = match data_type {
            DataType::Bool => FieldValue::Bool(slice[0] != 0),
            DataType::I32 => FieldValue::I32(i32::from_le_bytes(slice.try_into().unwrap())),
            DataType::U32 => FieldValue::U32(u32::from_le_bytes(slice.try_into().unwrap())),
            DataType::I64 => FieldValue::I64(i64::from_le_bytes(slice.try_into().unwrap())),
            DataType::U64 => FieldValue::U64(u64::from_le_bytes(slice.try_into().unwrap())),
            DataType::F64 => FieldValue::F64(f64::from_le_bytes(slice.try_into().unwrap())),
            DataType::VarSized => FieldValue::VarSized(nes_memory::VariableSizedAccess::from_le_bytes(slice.try_into().unwrap())),
        };
        out.push(value);
        offset += size;
    }
    Ok(out)
}

fn field_as_u64(value: &FieldValue, what: &str) -> Result<u64> {
    match value {
        FieldValue::U64(v) => Ok(*v),
        FieldValue::I64(v) => Ok(*v as u64),
        FieldValue::U32(v) => Ok(*v as u64),
        FieldValue::I32(v) => Ok(*v as u64),
        _ => Err(Error::invariant_violation(format!("{what} field is not an integer type"))),
    }
}

fn field_as_f64(value: &FieldValue, what: &str) -> Result<f64> {
    match value {
        FieldValue::F64(v) => Ok(*v),
        FieldValue::I64(v) => Ok(*v as f64),
        FieldValue::U64(v) => Ok(*v as f64),
        FieldValue::I32(v) => Ok(*v as f64),
        FieldValue::U32(v) => Ok(*v as f64),
        _ => Err(Error::invariant_violation(format!("{what} field is not numeric"))),
    }
}

impl PhysicalOperator {
    fn apply(&self, state: &mut ExecState, ctx: &PipelineExecutionContext, worker: &mut WorkerContext) -> Result<()> {
        match self {
            PhysicalOperator::Scan { schema } => {
                // Scan reads from the buffer that reached this pipeline;
                // executed first and is handled specially in `execute`
                // since it needs the raw input buffer, not `state`.
                let _ = schema;
                Ok(())
            }
            PhysicalOperator::Emit { schema } => {
                if state.records.is_empty() {
                    return Ok(());
                }
                let mut buffer = ctx.allocate_buffer();
                let provider = EmitMemoryProvider::new(schema, buffer.size());
                for record in &state.records {
                    if provider.capacity() > 0 && buffer.metadata().num_tuples as usize >= provider.capacity() {
                        ctx.dispatch_buffer(buffer)?;
                        buffer = ctx.allocate_buffer();
                    }
                    provider.append(&mut buffer, record)?;
                }
                buffer.set_watermark(state.watermark)?;
                ctx.dispatch_buffer(buffer)?;
                Ok(())
            }
            PhysicalOperator::Map { project } => {
                state.records = state.records.iter().map(|r| project(r)).collect();
                Ok(())
            }
            PhysicalOperator::Selection { predicate } => {
                state.records.retain(predicate.as_ref());
                Ok(())
            }
            PhysicalOperator::WatermarkAssign { time_field, allowed_lateness } => {
                if let Some(max_ts) = state
                    .records
                    .iter()
                    .map(|r| field_as_u64(&r[*time_field], "watermark time"))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .max()
                {
                    state.watermark = state.watermark.max(max_ts.saturating_sub(*allowed_lateness));
                }
                Ok(())
            }
            PhysicalOperator::PreAggNonKeyed { operator_id, assigner, agg, time_field, value_field } => {
                let store = worker.operator_state_with(*operator_id, || NonKeyedPreAggregation::new(*assigner, *agg));
                for record in &state.records {
                    let ts = field_as_u64(&record[*time_field], "pre-aggregation timestamp")?;
                    let value = field_as_f64(&record[*value_field], "pre-aggregation value")?;
                    match store.process_record(ts, value) {
                        Ok(()) => {}
                        Err(Error::LateRecord { .. }) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            PhysicalOperator::PreAggKeyed { operator_id, assigner, agg, time_field, value_field, key_fields } => {
                let store = worker.operator_state_with(*operator_id, || KeyedPreAggregation::new(*assigner, *agg));
                for record in &state.records {
                    let ts = field_as_u64(&record[*time_field], "pre-aggregation timestamp")?;
                    let value = field_as_f64(&record[*value_field], "pre-aggregation value")?;
                    let key_fields: Vec<FieldValue> = key_fields.iter().map(|&i| record[i]).collect();
                    let key_bytes = encode_fields(&key_fields);
                    match store.process_record(ts, &key_bytes, value) {
                        Ok(()) => {}
                        Err(Error::LateRecord { .. }) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            PhysicalOperator::SliceMergeNonKeyed { source_operator_id, assigner, agg, handler_index } => {
                let handler_any = ctx.get_operator_handler(*handler_index)?;
                let handler = handler_any
                    .as_any()
                    .downcast_ref::<WindowOperatorHandler>()
                    .ok_or_else(|| Error::invariant_violation("operator handler is not a WindowOperatorHandler"))?;
                let pre_agg = worker.operator_state_with(*source_operator_id, || NonKeyedPreAggregation::new(*assigner, *agg));
                pre_agg.store_mut().set_last_watermark(state.watermark);
                handler.stage_non_keyed(pre_agg.store_mut(), state.watermark);
                let result = handler.update_and_trigger(state.origin, state.seq, state.watermark)?;
                state.records = match result {
                    WindowTriggerResult::NonKeyed(rows) => rows
                        .into_iter()
                        .map(|r| vec![FieldValue::U64(r.start), FieldValue::U64(r.end), FieldValue::F64(r.value)])
                        .collect(),
                    WindowTriggerResult::Keyed(_) => {
                        return Err(Error::invariant_violation("SliceMergeNonKeyed bound to a keyed window handler"))
                    }
                };
                Ok(())
            }
            PhysicalOperator::SliceMergeKeyed { source_operator_id, assigner, agg, handler_index, key_types } => {
                let handler_any = ctx.get_operator_handler(*handler_index)?;
                let handler = handler_any
                    .as_any()
                    .downcast_ref::<WindowOperatorHandler>()
                    .ok_or_else(|| Error::invariant_violation("operator handler is not a WindowOperatorHandler"))?;
                let pre_agg = worker.operator_state_with(*source_operator_id, || KeyedPreAggregation::new(*assigner, *agg));
                pre_agg.store_mut().set_last_watermark(state.watermark);
                handler.stage_keyed(pre_agg.store_mut(), state.watermark);
                let result = handler.update_and_trigger(state.origin, state.seq, state.watermark)?;
                state.records = match result {
                    WindowTriggerResult::Keyed(rows) => rows
                        .into_iter()
                        .flat_map(|w| {
                            w.rows.into_iter().map(move |row| {
                                let key_fields = decode_fields(&row.key, key_types)?;
                                let mut out = vec![FieldValue::U64(w.start), FieldValue::U64(w.end)];
                                out.extend(key_fields);
                                out.push(FieldValue::F64(row.value));
                                Ok(out)
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                    WindowTriggerResult::NonKeyed(_) => {
                        return Err(Error::invariant_violation("SliceMergeKeyed bound to a non-keyed window handler"))
                    }
                };
                Ok(())
            }
            PhysicalOperator::JoinBuild { operator_id, assigner, variant, time_field, key_fields, payload_fields } => {
                let store = worker.operator_state_with(*operator_id, || JoinBuildStore::new(*assigner, *variant));
                for record in &state.records {
                    let ts = field_as_u64(&record[*time_field], "join build timestamp")?;
                    let key_bytes = encode_fields(&key_fields.iter().map(|&i| record[i]).collect::<Vec<_>>());
                    let payload: Vec<FieldValue> = payload_fields.iter().map(|&(i, _)| record[i]).collect();
                    let payload_bytes = encode_fields(&payload);
                    match store.process_record(ts, &key_bytes, payload_bytes) {
                        Ok(()) => {}
                        Err(Error::LateRecord { .. }) => continue,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            PhysicalOperator::JoinProbe { side, source_operator_id, assigner, variant, handler_index, left_payload_types, right_payload_types } => {
                let store = worker.operator_state_with(*source_operator_id, || JoinBuildStore::new(*assigner, *variant));
                let closed = store.drain_closed(state.watermark);
                let handler_any = ctx.get_operator_handler(*handler_index)?;
                let adapter = handler_any
                    .as_any()
                    .downcast_ref::<JoinOperatorHandlerAdapter>()
                    .ok_or_else(|| Error::invariant_violation("operator handler is not a JoinOperatorHandlerAdapter"))?;
                let mut handler = adapter.inner().lock();
                match side {
                    JoinSide::Left => handler.stage_left(closed),
                    JoinSide::Right => handler.stage_right(closed),
                }
                handler.update_watermark(state.origin, state.seq, state.watermark)?;
                let windows = handler.trigger();
                state.records = windows
                    .into_iter()
                    .flat_map(|w| {
                        let (start, end) = (w.start, w.end);
                        w.rows.into_iter().filter_map(move |row: JoinedRow| {
                            let mut left = decode_fields(&row.left_payload, left_payload_types).ok()?;
                            let right = decode_fields(&row.right_payload, right_payload_types).ok()?;
                            let mut out = vec![FieldValue::U64(start), FieldValue::U64(end)];
                            out.append(&mut left);
                            out.extend(right);
                            Some(out)
                        })
                    })
                    .collect();
                Ok(())
            }
        }
    }
}

/// An `ExecutablePipelineStage` built by fusing a fixed operator list (spec
/// §9). Each call to `execute` runs every operator once, in order, against
/// a fresh `ExecState` seeded from the input buffer's metadata.
pub struct OperatorPipelineStage {
    operators: Vec<PhysicalOperator>,
    input_schema: Option<Schema>,
}

impl OperatorPipelineStage {
    pub fn new(operators: Vec<PhysicalOperator>) -> Self {
        let input_schema = operators.iter().find_map(|op| match op {
            PhysicalOperator::Scan { schema } => Some(schema.clone()),
            _ => None,
        });
        OperatorPipelineStage { operators, input_schema }
    }
}

impl ExecutablePipelineStage for OperatorPipelineStage {
    fn execute(&mut self, buffer: TupleBuffer, ctx: &PipelineExecutionContext, worker: &mut WorkerContext) -> Result<ExecutionResult> {
        let meta = buffer.metadata();
        let mut state = ExecState { records: Vec::new(), watermark: meta.watermark, origin: meta.origin_id, seq: meta.sequence_number };

        if let Some(schema) = &self.input_schema {
            let scan = ScanMemoryProvider::new(schema, buffer.size());
            for i in 0..scan.num_tuples(&buffer) {
                state.records.push(scan.read_tuple(&buffer, i)?);
            }
        }

        for operator in &self.operators {
            operator.apply(&mut state, ctx, worker)?;
        }
        Ok(ExecutionResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferProvider, TaskSink};
    use crate::reconfig::ReconfigurationMessage;
    use crate::window_handler::WindowOperatorHandler;
    use nes_common::{DataType, Field, Layout, OperatorId, OriginId, PipelineId, QueryId, SequenceNumber, WorkerId};
    use nes_memory::{BufferManager, BufferManagerConfig, LocalBufferPool};
    use nes_windowing::{AggregationFunction, NonKeyedWindowMerger, SliceAssigner};
    use parking_lot::Mutex as PlMutex;

    fn input_schema() -> Schema {
        Schema::new(Layout::Row, vec![Field::new("ts", DataType::U64), Field::new("v", DataType::F64)])
    }

    fn window_output_schema() -> Schema {
        Schema::new(Layout::Row, vec![Field::new("start", DataType::U64), Field::new("end", DataType::U64), Field::new("value", DataType::F64)])
    }

    fn worker(mgr: &Arc<BufferManager>) -> WorkerContext {
        let local = LocalBufferPool::new(mgr.clone(), 4);
        WorkerContext::new(WorkerId::new(0), local)
    }

    fn stamped_buffer(mgr: &Arc<BufferManager>, schema: &Schema, rows: &[(u64, f64)], origin: OriginId, seq: SequenceNumber) -> TupleBuffer {
        let mut buffer = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(schema, buffer.size());
        for (ts, v) in rows {
            emit.append(&mut buffer, &[FieldValue::U64(*ts), FieldValue::F64(*v)]).unwrap();
        }
        buffer.set_origin_id(origin).unwrap();
        buffer.set_sequence_number(seq).unwrap();
        buffer
    }

    #[derive(Debug, Default)]
    struct CapturingSink {
        data: PlMutex<Vec<TupleBuffer>>,
    }

    impl TaskSink for CapturingSink {
        fn submit_data(&self, _pipeline: PipelineId, buffer: TupleBuffer) {
            self.data.lock().push(buffer);
        }
        fn submit_control(&self, _pipeline: PipelineId, _message: ReconfigurationMessage) {}
    }

    #[test]
    fn scan_map_selection_emit_doubles_positive_values_only() {
        let schema = input_schema();
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 4096, local_pool_capacity: 2 });
        let sink = Arc::new(CapturingSink::default());
        let ctx = PipelineExecutionContext::new(
            QueryId::new(0),
            PipelineId::new(0),
            OriginId::new(0),
            mgr.clone() as Arc<dyn BufferProvider>,
            Vec::new(),
            vec![PipelineId::new(1)],
            sink.clone(),
        );
        let mut worker = worker(&mgr);

        let input = stamped_buffer(&mgr, &schema, &[(1, 1.0), (2, -1.0), (3, 2.0)], OriginId::new(0), SequenceNumber::ZERO);

        let double: MapFn = Arc::new(|r: &Record| {
            let v = match r[1] {
                FieldValue::F64(v) => v * 2.0,
                _ => unreachable!(),
            };
            vec![r[0], FieldValue::F64(v)]
        });
        let positive: SelectionFn = Arc::new(|r: &Record| matches!(r[1], FieldValue::F64(v) if v > 0.0));

        let mut stage = OperatorPipelineStage::new(vec![
            PhysicalOperator::Scan { schema: schema.clone() },
            PhysicalOperator::Map { project: double },
            PhysicalOperator::Selection { predicate: positive },
            PhysicalOperator::Emit { schema: schema.clone() },
        ]);

        stage.execute(input, &ctx, &mut worker).unwrap();

        let out = sink.data.lock().remove(0);
        let scan = ScanMemoryProvider::new(&schema, out.size());
        assert_eq!(scan.num_tuples(&out), 2);
        assert_eq!(scan.read_tuple(&out, 0).unwrap(), vec![FieldValue::U64(1), FieldValue::F64(2.0)]);
        assert_eq!(scan.read_tuple(&out, 1).unwrap(), vec![FieldValue::U64(3), FieldValue::F64(4.0)]);
    }

    /// Drives a fused Scan -> WatermarkAssign -> PreAggNonKeyed ->
    /// SliceMergeNonKeyed -> Emit pipeline across two buffers on the same
    /// worker, mirroring a tumbling sum window (matching the single-pipeline
    /// shape a deployed query actually runs, as opposed to exercising the
    /// merger directly against a `NonKeyedSliceStore`).
    #[test]
    fn fused_pipeline_emits_tumbling_sum_once_watermark_closes_the_slice() {
        let in_schema = input_schema();
        let out_schema = window_output_schema();
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 8, buffer_size: 4096, local_pool_capacity: 4 });
        let sink = Arc::new(CapturingSink::default());

        let assigner = SliceAssigner::new(10, 10);
        let operator_id = OperatorId::new(1);
        let handler = Arc::new(WindowOperatorHandler::new_non_keyed(
            NonKeyedWindowMerger::new(assigner, AggregationFunction::Sum),
            vec![OriginId::new(0)],
        ));

        let ctx = PipelineExecutionContext::new(
            QueryId::new(0),
            PipelineId::new(0),
            OriginId::new(0),
            mgr.clone() as Arc<dyn BufferProvider>,
            vec![handler as Arc<dyn crate::handler::OperatorHandler>],
            vec![PipelineId::new(1)],
            sink.clone(),
        );
        let mut worker = worker(&mgr);

        let mut stage = OperatorPipelineStage::new(vec![
            PhysicalOperator::Scan { schema: in_schema.clone() },
            PhysicalOperator::WatermarkAssign { time_field: 0, allowed_lateness: 0 },
            PhysicalOperator::PreAggNonKeyed { operator_id, assigner, agg: AggregationFunction::Sum, time_field: 0, value_field: 1 },
            PhysicalOperator::SliceMergeNonKeyed { source_operator_id: operator_id, assigner, agg: AggregationFunction::Sum, handler_index: 0 },
            PhysicalOperator::Emit { schema: out_schema.clone() },
        ]);

        let first = stamped_buffer(&mgr, &in_schema, &[(1, 1.0), (2, 2.0)], OriginId::new(0), SequenceNumber::new(0));
        stage.execute(first, &ctx, &mut worker).unwrap();
        assert!(sink.data.lock().is_empty(), "window is still open after the first buffer");

        let second = stamped_buffer(&mgr, &in_schema, &[(11, 5.0)], OriginId::new(0), SequenceNumber::new(1));
        stage.execute(second, &ctx, &mut worker).unwrap();

        let out = sink.data.lock().remove(0);
        let scan = ScanMemoryProvider::new(&out_schema, out.size());
        assert_eq!(scan.num_tuples(&out), 1);
        assert_eq!(scan.read_tuple(&out, 0).unwrap(), vec![FieldValue::U64(0), FieldValue::U64(10), FieldValue::F64(3.0)]);
    }

    /// Same shape as the non-keyed fused pipeline test above, but grouped by
    /// an `I32` field rather than the 8-byte key every other test in this
    /// tree happens to use, so a key narrower than 8 bytes exercises
    /// `SliceMergeKeyed`'s key decoding instead of assuming every key is an
    /// `i64`.
    #[test]
    fn fused_pipeline_emits_keyed_sum_with_a_narrow_key_type() {
        let in_schema = Schema::new(
            Layout::Row,
            vec![Field::new("ts", DataType::U64), Field::new("k", DataType::I32), Field::new("v", DataType::F64)],
        );
        let out_schema = Schema::new(
            Layout::Row,
            vec![
                Field::new("start", DataType::U64),
                Field::new("end", DataType::U64),
                Field::new("k", DataType::I32),
                Field::new("value", DataType::F64),
            ],
        );
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 8, buffer_size: 4096, local_pool_capacity: 4 });
        let sink = Arc::new(CapturingSink::default());

        let assigner = SliceAssigner::new(10, 10);
        let operator_id = OperatorId::new(1);
        let handler = Arc::new(WindowOperatorHandler::new_keyed(
            nes_windowing::KeyedWindowMerger::new(assigner, AggregationFunction::Sum),
            vec![OriginId::new(0)],
        ));

        let ctx = PipelineExecutionContext::new(
            QueryId::new(0),
            PipelineId::new(0),
            OriginId::new(0),
            mgr.clone() as Arc<dyn BufferProvider>,
            vec![handler as Arc<dyn crate::handler::OperatorHandler>],
            vec![PipelineId::new(1)],
            sink.clone(),
        );
        let mut worker = worker(&mgr);

        let mut stage = OperatorPipelineStage::new(vec![
            PhysicalOperator::Scan { schema: in_schema.clone() },
            PhysicalOperator::WatermarkAssign { time_field: 0, allowed_lateness: 0 },
            PhysicalOperator::PreAggKeyed {
                operator_id,
                assigner,
                agg: AggregationFunction::Sum,
                time_field: 0,
                value_field: 2,
                key_fields: vec![1],
            },
            PhysicalOperator::SliceMergeKeyed {
                source_operator_id: operator_id,
                assigner,
                agg: AggregationFunction::Sum,
                handler_index: 0,
                key_types: vec![DataType::I32],
            },
            PhysicalOperator::Emit { schema: out_schema.clone() },
        ]);

        let mut first = mgr.get_buffer_blocking();
        let emit = EmitMemoryProvider::new(&in_schema, first.size());
        for (ts, k, v) in [(1u64, 7i32, 1.0), (2, 7, 2.0), (3, -4, 5.0)] {
            emit.append(&mut first, &[FieldValue::U64(ts), FieldValue::I32(k), FieldValue::F64(v)]).unwrap();
        }
        first.set_origin_id(OriginId::new(0)).unwrap();
        first.set_sequence_number(SequenceNumber::new(0)).unwrap();
        stage.execute(first, &ctx, &mut worker).unwrap();
        assert!(sink.data.lock().is_empty(), "window is still open after the first buffer");

        let mut second = stamped_buffer(&mgr, &in_schema, &[], OriginId::new(0), SequenceNumber::new(1));
        second.set_watermark(11).unwrap();
        stage.execute(second, &ctx, &mut worker).unwrap();

        let out = sink.data.lock().remove(0);
        let scan = ScanMemoryProvider::new(&out_schema, out.size());
        let mut rows: Vec<(i32, f64)> = (0..scan.num_tuples(&out))
            .map(|i| {
                let row = scan.read_tuple(&out, i).unwrap();
                let k = match row[2] {
                    FieldValue::I32(k) => k,
                    _ => panic!("expected an I32 key field"),
                };
                let v = match row[3] {
                    FieldValue::F64(v) => v,
                    _ => panic!("expected an F64 value field"),
                };
                (k, v)
            })
            .collect();
        rows.sort_by_key(|(k, _)| *k);
        assert_eq!(rows, vec![(-4, 5.0), (7, 3.0)]);
    }
}
