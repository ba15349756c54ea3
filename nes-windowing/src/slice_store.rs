// Per-worker ordered slice stores (spec §3 "SliceStore", §4.4, §4.5). Each
// worker thread owns one of these per window operator; there is no
// cross-worker locking on the pre-aggregation path (spec §5). Slices are
// kept sorted by `start` in a `Vec`, located by binary search - the slice
// count per worker is small (bounded by `size / slide` plus in-flight
// lateness) so a sorted vector beats a tree in practice and keeps
// `findOrCreateSliceByTs` a single allocation-free search on the hot path.

use crate::aggregation::AggregationFunction;
use crate::slice::Slice;
use crate::slice_assigner::SliceAssigner;
use nes_base::{Error, Result};
use tracing::trace;

fn insertion_point(slices: &[Slice], start: u64) -> usize {
    slices.partition_point(|s| s.start < start)
}

fn locate(slices: &[Slice], ts: u64) -> Option<usize> {
    // `partition_point` on `start <= ts` finds the first slice whose start is
    // > ts; the slice just before it is the only candidate that could
    // contain ts (slices are non-overlapping, spec §3).
    let idx = slices.partition_point(|s| s.start <= ts);
    if idx == 0 {
        return None;
    }
    let candidate = &slices[idx - 1];
    candidate.contains(ts).then_some(idx - 1)
}

pub struct NonKeyedSliceStore {
    assigner: SliceAssigner,
    agg: AggregationFunction,
    slices: Vec<Slice>,
    last_watermark: u64,
}

impl NonKeyedSliceStore {
    pub fn new(assigner: SliceAssigner, agg: AggregationFunction) -> Self {
        NonKeyedSliceStore { assigner, agg, slices: Vec::new(), last_watermark: 0 }
    }

    pub fn last_watermark(&self) -> u64 {
        self.last_watermark
    }

    pub fn set_last_watermark(&mut self, watermark: u64) {
        self.last_watermark = self.last_watermark.max(watermark);
    }

    /// Spec §4.4/§4.5 `findOrCreateSliceByTs`: locates the slice owning
    /// `ts`, creating it if absent and `ts >= lastWatermark`. A miss below
    /// the watermark is a late record (§7), dropped by the caller.
    pub fn find_or_create_slice_by_ts(&mut self, ts: u64) -> Result<&mut Slice> {
        if let Some(idx) = locate(&self.slices, ts) {
            return Ok(&mut self.slices[idx]);
        }
        if ts < self.last_watermark {
            return Err(Error::LateRecord { ts, watermark: self.last_watermark });
        }
        let (start, end) = self.assigner.slice_for_ts(ts);
        let idx = insertion_point(&self.slices, start);
        trace!(target: "nes", start, end, "creating non-keyed slice");
        self.slices.insert(idx, Slice::new_non_keyed(start, end, self.agg.identity()));
        Ok(&mut self.slices[idx])
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Removes and returns every slice that can no longer receive new
    /// records (`slice.end <= watermark`), ready to hand off to the merger
    /// via the staging area (spec §4.6, "on end-of-stream or periodic
    /// trigger"). Whether a closed slice is still needed by some open
    /// window is the staging area's concern, not this store's.
    pub fn drain_closed(&mut self, watermark: u64) -> Vec<Slice> {
        let (keep, closed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.slices).into_iter().partition(|s| watermark < s.end);
        self.slices = keep;
        if !closed.is_empty() {
            trace!(target: "nes", count = closed.len(), "staging closed non-keyed slices");
        }
        closed
    }
}

pub struct KeyedSliceStore {
    assigner: SliceAssigner,
    value_size: usize,
    slices: Vec<Slice>,
    last_watermark: u64,
}

impl KeyedSliceStore {
    pub fn new(assigner: SliceAssigner, value_size: usize) -> Self {
        KeyedSliceStore { assigner, value_size, slices: Vec::new(), last_watermark: 0 }
    }

    pub fn last_watermark(&self) -> u64 {
        self.last_watermark
    }

    pub fn set_last_watermark(&mut self, watermark: u64) {
        self.last_watermark = self.last_watermark.max(watermark);
    }

    pub fn find_or_create_slice_by_ts(&mut self, ts: u64) -> Result<&mut Slice> {
        if let Some(idx) = locate(&self.slices, ts) {
            return Ok(&mut self.slices[idx]);
        }
        if ts < self.last_watermark {
            return Err(Error::LateRecord { ts, watermark: self.last_watermark });
        }
        let (start, end) = self.assigner.slice_for_ts(ts);
        let idx = insertion_point(&self.slices, start);
        trace!(target: "nes", start, end, "creating keyed slice");
        self.slices.insert(idx, Slice::new_keyed(start, end, self.value_size));
        Ok(&mut self.slices[idx])
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn drain_closed(&mut self, watermark: u64) -> Vec<Slice> {
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
        let mut store = NonKeyedSliceStore::new(SliceAssigner::new(10, 10), AggregationFunction::Sum);
        let slice = store.find_or_create_slice_by_ts(3).unwrap();
        assert_eq!((slice.start, slice.end), (0, 10));
        let slice = store.find_or_create_slice_by_ts(7).unwrap();
        assert_eq!((slice.start, slice.end), (0, 10));
        assert_eq!(store.slices().len(), 1);
    }

    #[test]
    fn record_before_watermark_is_late() {
        let mut store = NonKeyedSliceStore::new(SliceAssigner::new(10, 10), AggregationFunction::Sum);
        store.find_or_create_slice_by_ts(15).unwrap();
        store.set_last_watermark(20);
        let err = store.find_or_create_slice_by_ts(4).unwrap_err();
        assert!(matches!(err, Error::LateRecord { .. }));
    }

    #[test]
    fn drains_only_slices_whose_end_has_passed() {
        let mut store = NonKeyedSliceStore::new(SliceAssigner::new(10, 5), AggregationFunction::Count);
        store.find_or_create_slice_by_ts(2).unwrap(); // slice [0,5)
        store.find_or_create_slice_by_ts(7).unwrap(); // slice [5,10)
        assert_eq!(store.drain_closed(4).len(), 0);
        assert_eq!(store.drain_closed(5).len(), 1);
        assert_eq!(store.slices().len(), 1);
    }

    #[test]
    fn keyed_store_creates_independent_hash_maps_per_slice() {
        let mut store = KeyedSliceStore::new(SliceAssigner::new(10, 10), 8);
        let slice = store.find_or_create_slice_by_ts(1).unwrap();
        let hash = rapidhash::rapidhash(&1i64.to_le_bytes());
        slice
            .keyed_state_mut()
            .combine(&1i64.to_le_bytes(), hash, |_| {}, |v| v.copy_from_slice(&1u64.to_le_bytes()));
        assert_eq!(store.find_or_create_slice_by_ts(1).unwrap().keyed_state().len(), 1);
    }
}
