// Pure timestamp -> slice-boundary function (spec §4.3). The tumbling case
// (`size == slide`) is the sliding case with `slide == size`: both use the
// slide as the slice granularity, so one formula covers both.
//
// Ties: `ts == end` belongs to the next slice, which falls out of using
// strict `<` in `slice_for_ts`'s caller (the slice store's binary search)
// rather than anything special here - `start = ts - (ts mod slide)` always
// produces a slice whose `end` is strictly greater than `ts`.

#[derive(Clone, Copy, Debug)]
pub struct SliceAssigner {
    size: u64,
    slide: u64,
}

impl SliceAssigner {
    /// `size >= slide` and `slide > 0`; tumbling windows pass `size ==
    /// slide`.
    pub fn new(size: u64, slide: u64) -> Self {
        assert!(slide > 0, "slide must be positive");
        assert!(size >= slide, "size must be >= slide");
        SliceAssigner { size, slide }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn slide(&self) -> u64 {
        self.slide
    }

    /// The half-open slice `[start, end)` that `ts` falls into.
    pub fn slice_for_ts(&self, ts: u64) -> (u64, u64) {
        let start = ts - (ts % self.slide);
        (start, start + self.slide)
    }

    /// Every window `[ws, we)` such that `ws <= slice_start` and `slice_end
    /// <= we`, i.e. every window this slice contributes to (spec §4.3).
    /// Assumes `size` is a multiple of `slide`, as every sliding-window
    /// configuration in this engine requires.
    pub fn windows_for_slice(&self, slice_start: u64) -> Vec<(u64, u64)> {
        let count = self.size / self.slide;
        (0..count)
            .filter_map(|k| {
                let offset = k * self.slide;
                slice_start.checked_sub(offset).map(|ws| (ws, ws + self.size))
            })
            .collect()
    }

    /// The furthest-reaching window boundary that can still need this
    /// slice: the window starting exactly at the slice (`k = 0` above). Once
    /// the watermark passes this, the slice can be safely evicted (spec §3,
    /// "slices are only deleted when no window containing them can still
    /// receive data").
    pub fn last_needed_by(&self, slice_start: u64) -> u64 {
        slice_start + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_slice_equals_window() {
        let assigner = SliceAssigner::new(10, 10);
        assert_eq!(assigner.slice_for_ts(3), (0, 10));
        assert_eq!(assigner.slice_for_ts(11), (10, 20));
        assert_eq!(assigner.windows_for_slice(0), vec![(0, 10)]);
    }

    #[test]
    fn boundary_timestamp_belongs_to_next_slice() {
        let assigner = SliceAssigner::new(10, 10);
        assert_eq!(assigner.slice_for_ts(10), (10, 20));
    }

    #[test]
    fn sliding_slice_feeds_multiple_windows() {
        let assigner = SliceAssigner::new(10, 5);
        assert_eq!(assigner.slice_for_ts(7), (5, 10));
        let windows = assigner.windows_for_slice(5);
        assert_eq!(windows, vec![(5, 15), (0, 10)]);
    }

    #[test]
    fn last_needed_by_matches_widest_window() {
        let assigner = SliceAssigner::new(10, 5);
        assert_eq!(assigner.last_needed_by(5), 15);
    }
}
