use serde::{Deserialize, Serialize};

/// How a query, source, or operator handler was asked to stop (spec §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum QueryTerminationType {
    /// Drain in-flight data first.
    Graceful,
    /// Discard remaining buffered work.
    Hard,
}
