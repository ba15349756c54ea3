mod context;
mod ids;
mod schema;
mod termination;

pub use context::EngineContext;
pub use ids::{ChunkNumber, OperatorId, OriginId, PipelineId, QueryId, SequenceNumber, WorkerId};
pub use schema::{DataType, Field, Layout, Schema};
pub use termination::QueryTerminationType;

pub use nes_base::{BoxError, Error, Result};
