use vigil_common::types::RunState;

/// Errors reported to callers of the engine's public operations.
///
/// Faults inside the dispatch or evaluation loops are not surfaced here;
/// they are contained per the failure policy and reported through alarms
/// and engine messages instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `enqueue` (or a reload) was called while the engine is not Running.
    #[error("Engine: not running; operation rejected")]
    NotRunning,

    /// `start` was called while the engine is not Stopped.
    #[error("Engine: cannot start while {0}")]
    NotStopped(RunState),

    /// A rule was offered to an analyzer owned by a different program.
    /// The analyzer's rule set is left untouched.
    #[error("Engine: rule belongs to program '{got}' but analyzer owns '{expected}'")]
    ProgramMismatch { expected: String, got: String },

    /// The ingest queue is capped and the batch does not fit.
    #[error("Engine: ingest queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Rule storage failed while reading definitions.
    #[error("Engine: rule storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
