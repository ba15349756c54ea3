// Explicit, passed-in engine context replacing the process-wide logger and
// singleton catalog the original NebulaStream used (spec §9, "Global mutable
// state"). Every constructor that needs to log or mint an identifier takes
// one of these rather than reaching for a global.

use crate::ids::{OperatorId, PipelineId, QueryId};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Span;

#[derive(Debug)]
pub struct EngineContext {
    span: Span,
    next_query_id: AtomicU64,
    next_pipeline_id: AtomicU64,
    next_operator_id: AtomicU64,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new("nes-engine")
    }
}

impl EngineContext {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        EngineContext {
            span: tracing::info_span!("engine", name = %name),
            next_query_id: AtomicU64::new(0),
            next_pipeline_id: AtomicU64::new(0),
            next_operator_id: AtomicU64::new(0),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn next_query_id(&self) -> QueryId {
        QueryId::new(self.next_query_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_pipeline_id(&self) -> PipelineId {
        PipelineId::new(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_operator_id(&self) -> OperatorId {
        OperatorId::new(self.next_operator_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generators_are_monotone_and_distinct() {
        let ctx = EngineContext::new("test");
        let a = ctx.next_query_id();
        let b = ctx.next_query_id();
        assert_ne!(a, b);
        assert_eq!(a.as_u64() + 1, b.as_u64());
    }
}
