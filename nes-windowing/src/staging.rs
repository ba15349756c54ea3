// SliceStagingArea (spec §4.6): collects finalized slices from every worker
// thread of one window operator. Shared, but protected by a mutex guarding
// only the pure in-memory move of staging/taking slices (spec §5), workers
// never block on anything else while holding it.

use crate::slice::Slice;
use parking_lot::Mutex;

#[derive(Default)]
pub struct SliceStagingArea {
    slices: Mutex<Vec<Slice>>,
}

impl SliceStagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a worker's finalized slices into the shared staging area
    /// (ownership transfer, no cloning, spec §9 "pointer graphs in slice
    /// stores").
    pub fn stage(&self, mut slices: Vec<Slice>) {
        if slices.is_empty() {
            return;
        }
        self.slices.lock().append(&mut slices);
    }

    /// All staged slices whose `[start, end)` lies within `[window_start,
    /// window_end)` (spec §4.3's slice-to-window containment). Slices
    /// remain in the staging area, since a sliding-window slice can feed
    /// more than one window. Callers evict separately once no window can
    /// still need a slice.
    pub fn slices_in_window(&self, window_start: u64, window_end: u64) -> Vec<Slice> {
        self.slices
            .lock()
            .iter()
            .filter(|s| window_start <= s.start && s.end <= window_end)
            .cloned()
            .collect()
    }

    pub fn all_slice_starts(&self) -> Vec<u64> {
        self.slices.lock().iter().map(|s| s.start).collect()
    }

    /// Drops every staged slice whose widest possible window has already
    /// closed as of `watermark`, given the function to compute that bound.
    pub fn evict(&self, watermark: u64, last_needed_by: impl Fn(u64) -> u64) {
        self.slices.lock().retain(|s| watermark < last_needed_by(s.start));
    }

    pub fn len(&self) -> usize {
        self.slices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationFunction;

    #[test]
    fn stage_then_select_slices_within_window() {
        let staging = SliceStagingArea::new();
        let agg = AggregationFunction::Count;
        staging.stage(vec![
            Slice::new_non_keyed(0, 5, agg.identity()),
            Slice::new_non_keyed(5, 10, agg.identity()),
            Slice::new_non_keyed(10, 15, agg.identity()),
        ]);
        let window = staging.slices_in_window(0, 10);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn evict_drops_only_slices_past_their_bound() {
        let staging = SliceStagingArea::new();
        let agg = AggregationFunction::Count;
        staging.stage(vec![Slice::new_non_keyed(0, 5, agg.identity()), Slice::new_non_keyed(5, 10, agg.identity())]);
        staging.evict(7, |start| start + 10);
        assert_eq!(staging.len(), 2);
        staging.evict(10, |start| start + 10);
        assert_eq!(staging.len(), 1);
    }
}
