// Slice merging and window triggering (spec §4.6): combines slices staged
// by every worker of one window operator into per-window output once the
// watermark shows the window is complete. Emission order is non-decreasing
// by window end (spec §4.6); within one window, key order is the
// `ChainedHashMap`'s bucket-chain order, stable across reruns of the same
// input (spec §4.6 "must be stable across reruns with identical input").

use crate::aggregation::AggregationFunction;
use crate::slice_assigner::SliceAssigner;
use crate::slice_store::{KeyedSliceStore, NonKeyedSliceStore};
use crate::staging::SliceStagingArea;
use nes_common::SequenceNumber;
use std::collections::{BTreeSet, HashMap};

pub struct NonKeyedWindowResult {
    pub start: u64,
    pub end: u64,
    pub sequence_number: SequenceNumber,
    pub value: f64,
}

pub struct KeyedWindowRow {
    pub key: Vec<u8>,
    pub value: f64,
}

pub struct KeyedWindowResult {
    pub start: u64,
    pub end: u64,
    pub sequence_number: SequenceNumber,
    pub rows: Vec<KeyedWindowRow>,
}

/// Shared, per-operator state: every worker's `NonKeyedPreAggregation`
/// stages its closed slices here, and `trigger` runs on the thread that
/// observes a watermark advance (spec §4.6).
pub struct NonKeyedWindowMerger {
    assigner: SliceAssigner,
    agg: AggregationFunction,
    staging: SliceStagingArea,
    next_seq: SequenceNumber,
    emitted: BTreeSet<(u64, u64)>,
}

impl NonKeyedWindowMerger {
    pub fn new(assigner: SliceAssigner, agg: AggregationFunction) -> Self {
        NonKeyedWindowMerger {
            assigner,
            agg,
            staging: SliceStagingArea::new(),
            next_seq: SequenceNumber::ZERO,
            emitted: BTreeSet::new(),
        }
    }

    pub fn staging(&self) -> &SliceStagingArea {
        &self.staging
    }

    /// Moves a worker's slices whose event-time range has closed into the
    /// shared staging area.
    pub fn stage_closed(&self, store: &mut NonKeyedSliceStore, watermark: u64) {
        self.staging.stage(store.drain_closed(watermark));
    }

    /// Emits every window that is now complete, in non-decreasing `end`
    /// order, and evicts staged slices no window can still use.
    pub fn trigger(&mut self, watermark: u64) -> Vec<NonKeyedWindowResult> {
        let mut candidates: BTreeSet<(u64, u64)> = BTreeSet::new();
        for start in self.staging.all_slice_starts() {
            candidates.extend(self.assigner.windows_for_slice(start));
        }
        let mut ready: Vec<(u64, u64)> = candidates
            .into_iter()
            .filter(|&(ws, we)| we <= watermark && !self.emitted.contains(&(ws, we)))
            .collect();
        ready.sort_by_key(|&(_, we)| we);

        let mut results = Vec::new();
        for (ws, we) in ready {
            if !self.emitted.insert((ws, we)) {
                continue;
            }
            let slices = self.staging.slices_in_window(ws, we);
            if slices.is_empty() {
                continue;
            }
            let mut merged = self.agg.identity();
            for slice in &slices {
                self.agg.merge(&mut merged, slice.non_keyed_state());
            }
            let sequence_number = self.next_seq;
            self.next_seq = self.next_seq.next();
            results.push(NonKeyedWindowResult { start: ws, end: we, sequence_number, value: self.agg.lower(&merged) });
        }
        self.staging.evict(watermark, |start| self.assigner.last_needed_by(start));
        results
    }
}

pub struct KeyedWindowMerger {
    assigner: SliceAssigner,
    agg: AggregationFunction,
    staging: SliceStagingArea,
    next_seq: SequenceNumber,
    emitted: BTreeSet<(u64, u64)>,
}

impl KeyedWindowMerger {
    pub fn new(assigner: SliceAssigner, agg: AggregationFunction) -> Self {
        KeyedWindowMerger { assigner, agg, staging: SliceStagingArea::new(), next_seq: SequenceNumber::ZERO, emitted: BTreeSet::new() }
    }

    pub fn staging(&self) -> &SliceStagingArea {
        &self.staging
    }

    pub fn stage_closed(&self, store: &mut KeyedSliceStore, watermark: u64) {
        self.staging.stage(store.drain_closed(watermark));
    }

    pub fn trigger(&mut self, watermark: u64) -> Vec<KeyedWindowResult> {
        let mut candidates: BTreeSet<(u64, u64)> = BTreeSet::new();
        for start in self.staging.all_slice_starts() {
            candidates.extend(self.assigner.windows_for_slice(start));
        }
        let mut ready: Vec<(u64, u64)> = candidates
            .into_iter()
            .filter(|&(ws, we)| we <= watermark && !self.emitted.contains(&(ws, we)))
            .collect();
        ready.sort_by_key(|&(_, we)| we);

        let mut results = Vec::new();
        for (ws, we) in ready {
            if !self.emitted.insert((ws, we)) {
                continue;
            }
            let slices = self.staging.slices_in_window(ws, we);
            if slices.is_empty() {
                continue;
            }
            // key bytes -> merged state, preserving first-seen insertion
            // order for determinism across reruns with identical input.
            let mut order: Vec<Vec<u8>> = Vec::new();
            let mut merged: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            for slice in &slices {
                let map = slice.keyed_state();
                for handle in map.iter() {
                    let key = map.key(handle).to_vec();
                    let value = map.value(handle);
                    match merged.get_mut(&key) {
                        Some(state) => self.agg.merge(state, value),
                        None => {
                            order.push(key.clone());
                            merged.insert(key, value.to_vec());
                        }
                    }
                }
            }
            let rows = order
                .into_iter()
                .map(|key| {
                    let value = self.agg.lower(&merged[&key]);
                    KeyedWindowRow { key, value }
                })
                .collect();
            let sequence_number = self.next_seq;
            self.next_seq = self.next_seq.next();
            results.push(KeyedWindowResult { start: ws, end: we, sequence_number, rows });
        }
        self.staging.evict(watermark, |start| self.assigner.last_needed_by(start));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre_aggregation::{KeyedPreAggregation, NonKeyedPreAggregation};

    // Spec §8 scenario 1: tumbling sum, single source, ordered input.
    #[test]
    fn tumbling_sum_emits_after_watermark_crosses_window_end() {
        let assigner = SliceAssigner::new(10, 10);
        let mut pre_agg = NonKeyedPreAggregation::new(assigner, AggregationFunction::Sum);
        let mut merger = NonKeyedWindowMerger::new(assigner, AggregationFunction::Sum);

        for (ts, v) in [(1u64, 1.0), (2, 2.0), (11, 4.0)] {
            pre_agg.process_record(ts, v).unwrap();
        }
        merger.stage_closed(pre_agg.store_mut(), 11);
        let results = merger.trigger(11);
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].start, results[0].end), (0, 10));
        assert_eq!(results[0].value, 3.0);

        merger.stage_closed(pre_agg.store_mut(), 21);
        let results = merger.trigger(21);
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].start, results[0].end), (10, 20));
        assert_eq!(results[0].value, 4.0);
    }

    // Spec §8 scenario 1, keyed variant: sum(v) group by k.
    #[test]
    fn tumbling_keyed_sum_groups_by_key() {
        let assigner = SliceAssigner::new(10, 10);
        let mut pre_agg = KeyedPreAggregation::new(assigner, AggregationFunction::Sum);
        let mut merger = KeyedWindowMerger::new(assigner, AggregationFunction::Sum);

        for (ts, k, v) in [(1u64, 0i64, 1.0), (2, 0, 2.0), (3, 1, 5.0), (11, 0, 4.0)] {
            pre_agg.process_record(ts, &k.to_le_bytes(), v).unwrap();
        }
        merger.stage_closed(pre_agg.store_mut(), 11);
        let mut results = merger.trigger(11);
        assert_eq!(results.len(), 1);
        let window = results.remove(0);
        let mut rows: Vec<(i64, f64)> =
            window.rows.iter().map(|r| (i64::from_le_bytes(r.key.clone().try_into().unwrap()), r.value)).collect();
        rows.sort_by_key(|(k, _)| *k);
        assert_eq!(rows, vec![(0, 3.0), (1, 5.0)]);
    }

    // Spec §8 scenario 2: sliding count, out-of-order with allowed lateness 0.
    #[test]
    fn sliding_count_emits_two_overlapping_windows() {
        let assigner = SliceAssigner::new(10, 5);
        let mut pre_agg = NonKeyedPreAggregation::new(assigner, AggregationFunction::Count);
        let mut merger = NonKeyedWindowMerger::new(assigner, AggregationFunction::Count);

        for ts in [3u64, 7] {
            pre_agg.process_record(ts, 0.0).unwrap();
        }
        // Both slices close once the watermark reaches 10; staging them
        // removes them from the worker's own store.
        merger.stage_closed(pre_agg.store_mut(), 10);
        pre_agg.store_mut().set_last_watermark(10);
        assert!(pre_agg.process_record(4, 0.0).is_err()); // late: its slice is gone and ts < watermark
        pre_agg.process_record(12, 0.0).unwrap();

        merger.stage_closed(pre_agg.store_mut(), 15);
        let mut results = merger.trigger(15);
        results.sort_by_key(|r| r.end);
        assert_eq!(results.len(), 2);
        assert_eq!((results[0].start, results[0].end, results[0].value), (0, 10, 2.0));
        assert_eq!((results[1].start, results[1].end, results[1].value), (5, 15, 2.0));
    }
}
