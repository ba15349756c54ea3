// Error taxonomy for the engine. Every component returns `nes_base::Result`;
// recoverable cases (late records, timed-out buffer acquisition) are handled
// at the call site, everything else bubbles up to the owning query's status
// (see ExecutableQueryPlan in nes-execution).

use backtrace_error::DynBacktraceError;
use thiserror::Error as ThisError;
use tracing::error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// The buffer pool had no free page and the caller did not use a timeout.
    #[error("buffer pool exhausted")]
    BufferPoolExhausted,

    /// A record arrived with `ts` strictly before the slice store's watermark.
    /// Not fatal; the record is dropped (spec §7).
    #[error("late record: ts {ts} is before watermark {watermark}")]
    LateRecord { ts: u64, watermark: u64 },

    /// Double-release, non-monotonic watermark, impossible slice assignment.
    /// Fatal: the owning query transitions to ErrorState.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A pipeline stage returned `ExecutionResult::Error`.
    #[error("pipeline stage error")]
    UserStageError(#[source] BoxError),

    /// Detected at setup only; the plan never transitions past Created.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// From a source or sink; same propagation as UserStageError.
    #[error("io error")]
    IoError(#[source] BoxError),

    /// `BufferManager::attachChild` would push a parent past 2^32 children.
    #[error("buffer child limit exceeded")]
    ChildLimitExceeded,

    /// `BufferManager::loadChild` addressed a child that doesn't exist.
    #[error("child index {0} out of range")]
    ChildIndexOutOfRange(u32),

    /// An aggregation kind outside the closed {Sum, Count, Min, Max, Avg} set
    /// reached `lift`/`combine`/`lower`. Unreachable through the public enum
    /// today; kept as an explicit contract rather than a silent guess
    /// (spec §9, the `WindowHandler::aggregateWindows` open question).
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    pub fn invariant_violation(msg: impl Into<String>) -> Error {
        let msg = msg.into();
        error!(target: "nes", invariant = %msg, "invariant violation");
        Error::InvariantViolation(msg)
    }

    pub fn config(msg: impl Into<String>) -> Error {
        Error::ConfigError(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Error {
        Error::NotImplemented(msg.into())
    }

    pub fn user_stage<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        error!(target: "nes", "pipeline stage error: {:?}", err);
        Error::UserStageError(Box::new(DynBacktraceError::from(err)))
    }

    pub fn io<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        error!(target: "nes", "io error: {:?}", err);
        Error::IoError(Box::new(DynBacktraceError::from(err)))
    }
}
