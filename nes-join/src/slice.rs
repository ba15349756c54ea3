// A join slice (spec §4.7): the build-side counterpart of
// `nes_windowing::Slice`, restricted to one side (left or right) of the join.
// Lives in a per-worker `JoinBuildStore` until staged, at which point several
// workers' fragments for the same `[start, end)` are merged by the handler.

use crate::build_rows::BuildRows;

#[derive(Clone)]
pub struct JoinSlice {
    pub start: u64,
    pub end: u64,
    pub rows: BuildRows,
}

impl JoinSlice {
    pub fn new(start: u64, end: u64, rows: BuildRows) -> Self {
        JoinSlice { start, end, rows }
    }

    pub fn contains(&self, ts: u64) -> bool {
        self.start <= ts && ts < self.end
    }
}
