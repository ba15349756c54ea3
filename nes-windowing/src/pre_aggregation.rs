// Per-worker pre-aggregation operators (spec §4.4/§4.5): fold one input
// record into the slice it belongs to. Grouping-key bytes and the
// timestamp are extracted upstream by the `TimeFunction`/schema-aware code
// in `nes-execution`; this crate stays schema-agnostic and only sees
// `(ts, key_bytes, value)`.

use crate::aggregation::AggregationFunction;
use crate::slice_assigner::SliceAssigner;
use crate::slice_store::{KeyedSliceStore, NonKeyedSliceStore};
use nes_base::Result;

pub struct NonKeyedPreAggregation {
    store: NonKeyedSliceStore,
    agg: AggregationFunction,
}

impl NonKeyedPreAggregation {
    pub fn new(assigner: SliceAssigner, agg: AggregationFunction) -> Self {
        NonKeyedPreAggregation { store: NonKeyedSliceStore::new(assigner, agg), agg }
    }

    pub fn process_record(&mut self, ts: u64, value: f64) -> Result<()> {
        let slice = self.store.find_or_create_slice_by_ts(ts)?;
        self.agg.lift(slice.non_keyed_state_mut(), value);
        Ok(())
    }

    pub fn store_mut(&mut self) -> &mut NonKeyedSliceStore {
        &mut self.store
    }

    pub fn store(&self) -> &NonKeyedSliceStore {
        &self.store
    }
}

pub struct KeyedPreAggregation {
    store: KeyedSliceStore,
    agg: AggregationFunction,
}

impl KeyedPreAggregation {
    pub fn new(assigner: SliceAssigner, agg: AggregationFunction) -> Self {
        KeyedPreAggregation { store: KeyedSliceStore::new(assigner, agg.state_size()), agg }
    }

    pub fn process_record(&mut self, ts: u64, key: &[u8], value: f64) -> Result<()> {
        let hash = rapidhash::rapidhash(key);
        let agg = self.agg;
        let slice = self.store.find_or_create_slice_by_ts(ts)?;
        slice.keyed_state_mut().combine(
            key,
            hash,
            |state| state.copy_from_slice(&agg.identity()),
            |state| agg.lift(state, value),
        );
        Ok(())
    }

    pub fn store_mut(&mut self) -> &mut KeyedSliceStore {
        &mut self.store
    }

    pub fn store(&self) -> &KeyedSliceStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_keyed_sum_accumulates_within_one_slice() {
        let mut op = NonKeyedPreAggregation::new(SliceAssigner::new(10, 10), AggregationFunction::Sum);
        for (ts, v) in [(1u64, 1.0), (2, 2.0), (3, 5.0)] {
            op.process_record(ts, v).unwrap();
        }
        let slice = &op.store().slices()[0];
        assert_eq!(AggregationFunction::Sum.lower(slice.non_keyed_state()), 8.0);
    }

    #[test]
    fn keyed_sum_groups_by_key() {
        let mut op = KeyedPreAggregation::new(SliceAssigner::new(10, 10), AggregationFunction::Sum);
        for (ts, k, v) in [(1u64, 0i64, 1.0), (2, 0, 2.0), (3, 1, 5.0)] {
            op.process_record(ts, &k.to_le_bytes(), v).unwrap();
        }
        let slice = &op.store().slices()[0];
        assert_eq!(slice.keyed_state().len(), 2);
    }
}
