// OperatorHandler (spec §6): shared state injected into a compiled stage,
// addressed by an integer index the stage carries rather than a name, and
// given start/stop lifecycle callbacks driven by the owning pipeline's
// reconfiguration.

use crate::context::PipelineExecutionContext;
use nes_base::Result;
use nes_common::QueryTerminationType;
use std::any::Any;
use std::fmt;

pub trait OperatorHandler: Send + Sync + fmt::Debug {
    fn start(&self, ctx: &PipelineExecutionContext) -> Result<()>;

    fn stop(&self, termination: QueryTerminationType, ctx: &PipelineExecutionContext) -> Result<()>;

    /// Lets a stage downcast to the concrete handler type it was compiled
    /// against (e.g. `WindowOperatorHandler`, `JoinOperatorHandlerAdapter`).
    fn as_any(&self) -> &dyn Any;
}
