//! The worker pool, task queue and query lifecycle management around
//! `nes-execution`'s pipelines (spec §4.10, §5, §6): this is the crate that
//! turns a graph of `ExecutablePipeline`s into a running query, and the one
//! that implements `nes_execution::TaskSink` so pipelines can reach their
//! successors without depending on this crate directly.

mod config;
mod query_manager;
mod registry;
mod sink;
mod source;
mod task;
mod worker_pool;

pub use config::QueryManagerConfig;
pub use query_manager::QueryManager;
pub use registry::PipelineRegistry;
pub use sink::DataSink;
pub use source::{DataSource, SourceContext};
pub use task::{Task, TaskKind};
pub use worker_pool::WorkerPool;
