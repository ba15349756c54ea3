//! Event-time window processing: slice assignment, per-worker
//! pre-aggregation, watermark tracking, and slice-merge/trigger into final
//! window output (spec §3, §4.2-§4.6).

mod aggregation;
mod pre_aggregation;
mod slice;
mod slice_assigner;
mod slice_store;
mod staging;
mod watermark;
mod window_operator;

pub use aggregation::AggregationFunction;
pub use pre_aggregation::{KeyedPreAggregation, NonKeyedPreAggregation};
pub use slice::{Slice, SliceState};
pub use slice_assigner::SliceAssigner;
pub use slice_store::{KeyedSliceStore, NonKeyedSliceStore};
pub use staging::SliceStagingArea;
pub use watermark::{MultiOriginWatermarkProcessor, WatermarkProcessor};
pub use window_operator::{KeyedWindowMerger, KeyedWindowResult, KeyedWindowRow, NonKeyedWindowMerger, NonKeyedWindowResult};
