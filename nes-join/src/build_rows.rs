// Per-slice build-side state for a stream join (spec §4.7): one side (left
// or right) of one slice, in one of the two shapes the join supports. The
// probe functions in `nested_loop.rs`/`hash_join.rs` each only know how to
// read their own variant; `merge` combines two worker-local fragments of the
// same slice into one, the way `AggregationFunction::merge` does for
// windowing state.

use rapidhash::rapidhash;
use std::collections::HashMap;

#[derive(Clone)]
pub enum BuildRows {
    /// Append-only `(key, payload)` pairs, probed by a full cross product
    /// (spec §4.7 "nested-loop join").
    NestedLoop(Vec<(Vec<u8>, Vec<u8>)>),
    /// Key bytes -> every payload seen for that key, probed by iterating the
    /// smaller side and looking up the larger (spec §4.7 "hash join").
    Hash(HashMap<Vec<u8>, Vec<Vec<u8>>>),
}

impl BuildRows {
    pub fn new_nested_loop() -> Self {
        BuildRows::NestedLoop(Vec::new())
    }

    pub fn new_hash() -> Self {
        BuildRows::Hash(HashMap::new())
    }

    pub fn push(&mut self, key: &[u8], payload: Vec<u8>) {
        match self {
            BuildRows::NestedLoop(rows) => rows.push((key.to_vec(), payload)),
            BuildRows::Hash(map) => map.entry(key.to_vec()).or_default().push(payload),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BuildRows::NestedLoop(rows) => rows.len(),
            BuildRows::Hash(map) => map.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds `other`'s rows into `self`, e.g. merging one worker's slice
    /// fragment into another's when staging combines them (spec §4.6's
    /// slice-merge pattern, reused here for joins).
    pub fn merge(&mut self, other: &BuildRows) {
        match (self, other) {
            (BuildRows::NestedLoop(a), BuildRows::NestedLoop(b)) => a.extend(b.iter().cloned()),
            (BuildRows::Hash(a), BuildRows::Hash(b)) => {
                for (key, payloads) in b {
                    a.entry(key.clone()).or_default().extend(payloads.iter().cloned());
                }
            }
            _ => unreachable!("build rows of one join must share one variant"),
        }
    }
}

pub fn hash_key(key: &[u8]) -> u64 {
    rapidhash(key)
}
