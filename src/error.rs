//! Engine error taxonomy.
//!
//! Every operation returns `Result<T, EngineError>`; the variants are the
//! outcome vocabulary shared by all components.  None of them is used for
//! normal control flow — "task not visible" is `NotFound` by design (the
//! caller must not learn whether the row exists), while `Permission` means
//! the entity is known to the caller but the action is not allowed.

/// Failure outcomes surfaced to collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input — surfaced verbatim, never retried.
    #[error("{0}")]
    Validation(String),

    /// Entity absent, or present but not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Entity exists and is visible, but the caller lacks rights.
    #[error("{0}")]
    Permission(String),

    /// Invariant violation: the caller already has an open time entry.
    /// Carries the conflicting task so the caller can resolve it.
    #[error("you already have an active time entry for task #{task_id}")]
    ActiveEntryConflict { task_id: i64 },

    /// Operation not valid for the entity's current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    /// The update carried no recognized field.
    #[error("no valid fields to update")]
    NoOp,

    /// Store-level failure — logged by the caller, surfaced as generic.
    #[error("storage error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True when the underlying store rejected an insert on a unique
    /// constraint.  `TimeEntryEngine::start` uses this to turn the partial
    /// unique index on open entries into an `ActiveEntryConflict`.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Persistence(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
