// A slice (spec §3): a half-open event-time interval carrying either a
// single aggregation state (non-keyed) or a per-key chained hash map
// (keyed). Slices live in a per-worker `SliceStore` until staged for
// merging (§4.6), at which point the whole arena, in the keyed case the
// `ChainedHashMap`'s pages, moves into the staging area without copying
// any entry.

use nes_memory::ChainedHashMap;

#[derive(Clone)]
pub enum SliceState {
    NonKeyed(Vec<u8>),
    Keyed(ChainedHashMap),
}

#[derive(Clone)]
pub struct Slice {
    pub start: u64,
    pub end: u64,
    pub state: SliceState,
}

impl Slice {
    pub fn new_non_keyed(start: u64, end: u64, identity: Vec<u8>) -> Self {
        Slice { start, end, state: SliceState::NonKeyed(identity) }
    }

    pub fn new_keyed(start: u64, end: u64, value_size: usize) -> Self {
        Slice { start, end, state: SliceState::Keyed(ChainedHashMap::new(value_size)) }
    }

    pub fn non_keyed_state_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.state {
            SliceState::NonKeyed(bytes) => bytes,
            SliceState::Keyed(_) => panic!("slice is keyed"),
        }
    }

    pub fn non_keyed_state(&self) -> &[u8] {
        match &self.state {
            SliceState::NonKeyed(bytes) => bytes,
            SliceState::Keyed(_) => panic!("slice is keyed"),
        }
    }

    pub fn keyed_state_mut(&mut self) -> &mut ChainedHashMap {
        match &mut self.state {
            SliceState::Keyed(map) => map,
            SliceState::NonKeyed(_) => panic!("slice is non-keyed"),
        }
    }

    pub fn keyed_state(&self) -> &ChainedHashMap {
        match &self.state {
            SliceState::Keyed(map) => map,
            SliceState::NonKeyed(_) => panic!("slice is non-keyed"),
        }
    }

    pub fn contains(&self, ts: u64) -> bool {
        self.start <= ts && ts < self.end
    }
}
