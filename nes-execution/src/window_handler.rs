// WindowOperatorHandler: the `OperatorHandler` a pre-aggregation + slice-
// merge pair of physical operators share (spec §6 "OperatorHandler"; §4.6
// slice merging). Wraps one of `nes-windowing`'s two mergers plus a
// `MultiOriginWatermarkProcessor` gating trigger on every participating
// origin, the same gate `nes-join`'s `StreamJoinOperatorHandler` uses (spec
// §4.2/§4.6).

use crate::handler::OperatorHandler;
use crate::context::PipelineExecutionContext;
use nes_base::Result;
use nes_common::{OriginId, QueryTerminationType, SequenceNumber};
use nes_windowing::{
    KeyedWindowMerger, KeyedWindowResult, MultiOriginWatermarkProcessor, NonKeyedWindowMerger, NonKeyedWindowResult,
};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;

enum Merger {
    NonKeyed(NonKeyedWindowMerger),
    Keyed(KeyedWindowMerger),
}

pub enum WindowTriggerResult {
    NonKeyed(Vec<NonKeyedWindowResult>),
    Keyed(Vec<KeyedWindowResult>),
}

pub struct WindowOperatorHandler {
    merger: Mutex<Merger>,
    watermarks: MultiOriginWatermarkProcessor,
}

impl fmt::Debug for WindowOperatorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowOperatorHandler").finish()
    }
}

impl WindowOperatorHandler {
    pub fn new_non_keyed(merger: NonKeyedWindowMerger, participating_origins: Vec<OriginId>) -> Self {
        WindowOperatorHandler { merger: Mutex::new(Merger::NonKeyed(merger)), watermarks: MultiOriginWatermarkProcessor::new(participating_origins) }
    }

    pub fn new_keyed(merger: KeyedWindowMerger, participating_origins: Vec<OriginId>) -> Self {
        WindowOperatorHandler { merger: Mutex::new(Merger::Keyed(merger)), watermarks: MultiOriginWatermarkProcessor::new(participating_origins) }
    }

    /// Applies one origin's watermark update and, if the global watermark
    /// (minimum across participating origins) advanced, triggers every
    /// window that is now complete.
    pub fn update_and_trigger(&self, origin: OriginId, seq: SequenceNumber, watermark: u64) -> Result<WindowTriggerResult> {
        let global = self.watermarks.update_watermark(origin, seq, watermark)?;
        let mut merger = self.merger.lock();
        Ok(match &mut *merger {
            Merger::NonKeyed(m) => WindowTriggerResult::NonKeyed(m.trigger(global)),
            Merger::Keyed(m) => WindowTriggerResult::Keyed(m.trigger(global)),
        })
    }

    pub fn stage_non_keyed(&self, store: &mut nes_windowing::NonKeyedSliceStore, watermark: u64) {
        let merger = self.merger.lock();
        match &*merger {
            Merger::NonKeyed(m) => m.stage_closed(store, watermark),
            Merger::Keyed(_) => unreachable!("non-keyed stage called on a keyed window handler"),
        }
    }

    pub fn stage_keyed(&self, store: &mut nes_windowing::KeyedSliceStore, watermark: u64) {
        let merger = self.merger.lock();
        match &*merger {
            Merger::Keyed(m) => m.stage_closed(store, watermark),
            Merger::NonKeyed(_) => unreachable!("keyed stage called on a non-keyed window handler"),
        }
    }
}

impl OperatorHandler for WindowOperatorHandler {
    fn start(&self, _ctx: &PipelineExecutionContext) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _termination: QueryTerminationType, _ctx: &PipelineExecutionContext) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_windowing::{AggregationFunction, SliceAssigner};

    #[test]
    fn single_origin_triggers_once_watermark_crosses_window_end() {
        let assigner = SliceAssigner::new(10, 10);
        let merger = NonKeyedWindowMerger::new(assigner, AggregationFunction::Sum);
        let origin = OriginId::new(0);
        let handler = WindowOperatorHandler::new_non_keyed(merger, vec![origin]);

        let mut pre_agg = nes_windowing::NonKeyedPreAggregation::new(assigner, AggregationFunction::Sum);
        for (ts, v) in [(1u64, 1.0), (2, 2.0)] {
            pre_agg.process_record(ts, v).unwrap();
        }
        handler.stage_non_keyed(pre_agg.store_mut(), 10);
        let result = handler.update_and_trigger(origin, SequenceNumber::ZERO, 10).unwrap();
        match result {
            WindowTriggerResult::NonKeyed(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].value, 3.0);
            }
            WindowTriggerResult::Keyed(_) => panic!("expected non-keyed result"),
        }
    }
}
