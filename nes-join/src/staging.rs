// One side's shared staging area (mirrors `nes_windowing::SliceStagingArea`,
// duplicated here rather than reused because its element type is
// `nes_windowing::Slice`, which carries aggregation state this crate has no
// use for).

use crate::slice::JoinSlice;
use parking_lot::Mutex;

#[derive(Default)]
pub struct JoinStagingArea {
    slices: Mutex<Vec<JoinSlice>>,
}

impl JoinStagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, mut slices: Vec<JoinSlice>) {
        if slices.is_empty() {
            return;
        }
        self.slices.lock().append(&mut slices);
    }

    pub fn slices_in_window(&self, window_start: u64, window_end: u64) -> Vec<JoinSlice> {
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
