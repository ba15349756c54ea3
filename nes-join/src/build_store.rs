// Per-worker, per-side build store (spec §4.7 "Build side inserts records
// into its slice's state keyed by the join key"): same sorted-vector,
// binary-search shape as `nes_windowing::NonKeyedSliceStore`/`KeyedSliceStore`,
// specialized to hold one `BuildRows` variant per slice instead of an
// aggregation state.

use crate::build_rows::BuildRows;
use crate::slice::JoinSlice;
use nes_base::{Error, Result};
use nes_windowing::SliceAssigner;
use tracing::trace;

#[derive(Clone, Copy, Debug)]
pub enum JoinVariant {
    NestedLoop,
    Hash,
}

impl JoinVariant {
    fn new_rows(self) -> BuildRows {
        match self {
            JoinVariant::NestedLoop => BuildRows::new_nested_loop(),
            JoinVariant::Hash => BuildRows::new_hash(),
        }
    }
}

fn insertion_point(slices: &[JoinSlice], start: u64) -> usize {
    slices.partition_point(|s| s.start < start)
}

fn locate(slices: &[JoinSlice], ts: u64) -> Option<usize> {
    let idx = slices.partition_point(|s| s.start <= ts);
    if idx == 0 {
        return None;
    }
    let candidate = &slices[idx - 1];
    candidate.contains(ts).then_some(idx - 1)
}

pub struct JoinBuildStore {
    assigner: SliceAssigner,
    variant: JoinVariant,
    slices: Vec<JoinSlice>,
    last_watermark: u64,
}

impl JoinBuildStore {
    pub fn new(assigner: SliceAssigner, variant: JoinVariant) -> Self {
        JoinBuildStore { assigner, variant, slices: Vec::new(), last_watermark: 0 }
    }

    pub fn last_watermark(&self) -> u64 {
        self.last_watermark
    }

    pub fn set_last_watermark(&mut self, watermark: u64) {
        self.last_watermark = self.last_watermark.max(watermark);
    }

    fn find_or_create_slice_by_ts(&mut self, ts: u64) -> Result<&mut JoinSlice> {
        if let Some(idx) = locate(&self.slices, ts) {
            return Ok(&mut self.slices[idx]);
        }
        if ts < self.last_watermark {
            return Err(Error::LateRecord { ts, watermark: self.last_watermark });
        }
        let (start, end) = self.assigner.slice_for_ts(ts);
        let idx = insertion_point(&self.slices, start);
        trace!(target: "nes", start, end, "creating join build slice");
        self.slices.insert(idx, JoinSlice::new(start, end, self.variant.new_rows()));
        Ok(&mut self.slices[idx])
    }

    /// Inserts one build-side record (spec §4.7).
    pub fn process_record(&mut self, ts: u64, key: &[u8], payload: Vec<u8>) -> Result<()> {
        let slice = self.find_or_create_slice_by_ts(ts)?;
        slice.rows.push(key, payload);
        Ok(())
    }

    pub fn slices(&self) -> &[JoinSlice] {
        &self.slices
    }

    /// Removes every slice whose event-time range has closed, ready to stage
    /// (mirrors `nes_windowing`'s `drain_closed`).
    pub fn drain_closed(&mut self, watermark: u64) -> Vec<JoinSlice> {
        let (keep, closed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.slices).into_iter().partition(|s| watermark < s.end);
        self.slices = keep;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_slice_on_first_record_then_reuses_it() {
        let mut store = JoinBuildStore::new(SliceAssigner::new(10, 10), JoinVariant::NestedLoop);
        store.process_record(1, b"k", vec![1]).unwrap();
        store.process_record(3, b"k", vec![2]).unwrap();
        assert_eq!(store.slices().len(), 1);
        assert_eq!(store.slices()[0].rows.len(), 2);
    }

    #[test]
    fn record_before_watermark_is_late() {
        let mut store = JoinBuildStore::new(SliceAssigner::new(10, 10), JoinVariant::NestedLoop);
        store.process_record(15, b"k", vec![1]).unwrap();
        store.set_last_watermark(20);
        assert!(store.process_record(4, b"k", vec![2]).is_err());
    }

    #[test]
    fn drain_closed_removes_only_past_slices() {
        let mut store = JoinBuildStore::new(SliceAssigner::new(10, 10), JoinVariant::NestedLoop);
        store.process_record(1, b"k", vec![1]).unwrap();
        assert_eq!(store.drain_closed(9).len(), 0);
        assert_eq!(store.drain_closed(10).len(), 1);
        assert_eq!(store.slices().len(), 0);
    }
}
