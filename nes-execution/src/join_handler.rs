// Adapts `nes_join::StreamJoinOperatorHandler` to the `OperatorHandler`
// contract so it can be registered in a pipeline's operator-handler table
// and shared between the left build, right build, and probe operators
// (spec §4.7, supplemented by the requirement that build and probe share
// one handler instance registered once per operator pair).

use crate::context::PipelineExecutionContext;
use crate::handler::OperatorHandler;
use nes_base::Result;
use nes_common::QueryTerminationType;
use nes_join::StreamJoinOperatorHandler;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;

pub struct JoinOperatorHandlerAdapter {
    inner: Mutex<StreamJoinOperatorHandler>,
}

impl fmt::Debug for JoinOperatorHandlerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinOperatorHandlerAdapter").finish()
    }
}

impl JoinOperatorHandlerAdapter {
    pub fn new(inner: StreamJoinOperatorHandler) -> Self {
        JoinOperatorHandlerAdapter { inner: Mutex::new(inner) }
    }

    pub fn inner(&self) -> &Mutex<StreamJoinOperatorHandler> {
        &self.inner
    }
}

impl OperatorHandler for JoinOperatorHandlerAdapter {
    fn start(&self, _ctx: &PipelineExecutionContext) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _termination: QueryTerminationType, _ctx: &PipelineExecutionContext) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
