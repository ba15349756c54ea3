//! Task-based query execution (spec §2, §6): pipelines of fused physical
//! operators driven one buffer at a time by a worker thread, with
//! reconfiguration messages travelling in-band through the same queues as
//! data. `nes-runtime` supplies the worker pool and task queues this crate's
//! traits (`BufferProvider`, `TaskSink`) abstract over.

mod context;
mod handler;
mod join_handler;
mod memory_provider;
mod operators;
mod pipeline;
mod query_plan;
mod reconfig;
mod stage;
mod window_handler;
mod worker_context;

pub use context::{BufferProvider, PipelineExecutionContext, TaskSink};
pub use handler::OperatorHandler;
pub use join_handler::JoinOperatorHandlerAdapter;
pub use memory_provider::{EmitMemoryProvider, FieldValue, ScanMemoryProvider};
pub use operators::{JoinSide, MapFn, OperatorPipelineStage, PhysicalOperator, Record, SelectionFn};
pub use pipeline::{ExecutablePipeline, PipelineStatus};
pub use query_plan::{ExecutableQueryPlan, NullQueryStatusListener, QueryPlanStatus, QueryStatusListener};
pub use reconfig::ReconfigurationMessage;
pub use stage::{ExecutablePipelineStage, ExecutionResult};
pub use window_handler::{WindowOperatorHandler, WindowTriggerResult};
pub use worker_context::{WorkerContext, WorkerRng};
