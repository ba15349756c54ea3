// The closed aggregation-function enum from spec §9's design note
// ("Dynamic dispatch on aggregation functions"): the original dispatches on
// a type-erased aggregation object; here a fixed `{Sum, Count, Min, Max,
// Avg}` set carries per-variant lift/combine/lower logic operating on a
// fixed-size byte state, so slice stores never need a vtable.
//
// Per spec §9's open question, several `original_source` files admit their
// `WindowHandler::aggregateWindows` only special-cases `Sum`; this
// implementation supports the full closed set. `from_discriminant` is the
// one place an aggregation kind outside that set can appear (e.g. decoding
// a serialized operator definition produced by a future engine version) and
// returns `Error::NotImplemented` rather than guessing a behavior.

use nes_base::{Error, Result};
use ordered_float::OrderedFloat;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AggregationFunction {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl AggregationFunction {
    pub fn from_discriminant(d: u8) -> Result<Self> {
        match d {
            0 => Ok(AggregationFunction::Sum),
            1 => Ok(AggregationFunction::Count),
            2 => Ok(AggregationFunction::Min),
            3 => Ok(AggregationFunction::Max),
            4 => Ok(AggregationFunction::Avg),
            other => Err(Error::not_implemented(format!("aggregation discriminant {other}"))),
        }
    }

    /// Width in bytes of this aggregation's in-slice state.
    pub const fn state_size(self) -> usize {
        match self {
            AggregationFunction::Sum | AggregationFunction::Count | AggregationFunction::Min | AggregationFunction::Max => 8,
            AggregationFunction::Avg => 16,
        }
    }

    /// The identity state a fresh slice/entry is initialized to, before any
    /// record has been folded in.
    pub fn identity(self) -> Vec<u8> {
        match self {
            AggregationFunction::Sum | AggregationFunction::Count => vec![0u8; 8],
            AggregationFunction::Min => f64::INFINITY.to_le_bytes().to_vec(),
            AggregationFunction::Max => f64::NEG_INFINITY.to_le_bytes().to_vec(),
            AggregationFunction::Avg => {
                let mut buf = vec![0u8; 16];
                buf[0..8].copy_from_slice(&0f64.to_le_bytes());
                buf
            }
        }
    }

    /// Folds one input value into `state` in place.
    pub fn lift(self, state: &mut [u8], value: f64) {
        match self {
            AggregationFunction::Sum => {
                let cur = f64::from_le_bytes(state.try_into().unwrap());
                state.copy_from_slice(&(cur + value).to_le_bytes());
            }
            AggregationFunction::Count => {
                let cur = u64::from_le_bytes(state.try_into().unwrap());
                state.copy_from_slice(&(cur + 1).to_le_bytes());
            }
            AggregationFunction::Min => {
                let cur = f64::from_le_bytes(state.try_into().unwrap());
                state.copy_from_slice(&cur.min(value).to_le_bytes());
            }
            AggregationFunction::Max => {
                let cur = f64::from_le_bytes(state.try_into().unwrap());
                state.copy_from_slice(&cur.max(value).to_le_bytes());
            }
            AggregationFunction::Avg => {
                let sum = f64::from_le_bytes(state[0..8].try_into().unwrap());
                let count = u64::from_le_bytes(state[8..16].try_into().unwrap());
                state[0..8].copy_from_slice(&(sum + value).to_le_bytes());
                state[8..16].copy_from_slice(&(count + 1).to_le_bytes());
            }
        }
    }

    /// Combines two partial states of the same aggregation kind, e.g. one
    /// per worker's slice and another from a different worker's slice
    /// covering the same window (spec §4.6 slice merging).
    pub fn merge(self, state: &mut [u8], other: &[u8]) {
        match self {
            AggregationFunction::Sum => {
                let a = f64::from_le_bytes(state.try_into().unwrap());
                let b = f64::from_le_bytes(other.try_into().unwrap());
                state.copy_from_slice(&(a + b).to_le_bytes());
            }
            AggregationFunction::Count => {
                let a = u64::from_le_bytes(state.try_into().unwrap());
                let b = u64::from_le_bytes(other.try_into().unwrap());
                state.copy_from_slice(&(a + b).to_le_bytes());
            }
            AggregationFunction::Min => {
                let a = OrderedFloat(f64::from_le_bytes(state.try_into().unwrap()));
                let b = OrderedFloat(f64::from_le_bytes(other.try_into().unwrap()));
                state.copy_from_slice(&a.min(b).0.to_le_bytes());
            }
            AggregationFunction::Max => {
                let a = OrderedFloat(f64::from_le_bytes(state.try_into().unwrap()));
                let b = OrderedFloat(f64::from_le_bytes(other.try_into().unwrap()));
                state.copy_from_slice(&a.max(b).0.to_le_bytes());
            }
            AggregationFunction::Avg => {
                let sum_a = f64::from_le_bytes(state[0..8].try_into().unwrap());
                let count_a = u64::from_le_bytes(state[8..16].try_into().unwrap());
                let sum_b = f64::from_le_bytes(other[0..8].try_into().unwrap());
                let count_b = u64::from_le_bytes(other[8..16].try_into().unwrap());
                state[0..8].copy_from_slice(&(sum_a + sum_b).to_le_bytes());
                state[8..16].copy_from_slice(&(count_a + count_b).to_le_bytes());
            }
        }
    }

    /// Produces the final, user-visible output value from a (possibly
    /// merged) state.
    pub fn lower(self, state: &[u8]) -> f64 {
        match self {
            AggregationFunction::Sum | AggregationFunction::Min | AggregationFunction::Max => {
                f64::from_le_bytes(state.try_into().unwrap())
            }
            AggregationFunction::Count => u64::from_le_bytes(state.try_into().unwrap()) as f64,
            AggregationFunction::Avg => {
                let sum = f64::from_le_bytes(state[0..8].try_into().unwrap());
                let count = u64::from_le_bytes(state[8..16].try_into().unwrap());
                if count == 0 { 0.0 } else { sum / count as f64 }
            }
        }
    }
}
