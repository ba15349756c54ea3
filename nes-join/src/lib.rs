//! Windowed stream join (spec §4.7): nested-loop and hash variants sharing
//! the slice/staging/watermark infrastructure from `nes-windowing`.

mod build_rows;
mod build_store;
mod handler;
mod hash_join;
mod nested_loop;
mod slice;
mod staging;

pub use build_rows::BuildRows;
pub use build_store::{JoinBuildStore, JoinVariant};
pub use handler::{JoinWindowId, JoinWindowResult, JoinedRow, StreamJoinOperatorHandler};
pub use slice::JoinSlice;
pub use staging::JoinStagingArea;
