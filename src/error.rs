use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("store unreachable: {0}")]
    TransientIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Which gate rejected the operation. Conflicts and precondition failures are
/// recovered locally by re-fetching the record, never by blind retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("driver is not available for new deliveries")]
    DriverUnavailable,

    #[error("job is not assigned to the calling driver")]
    NotAssignedToCaller,

    #[error("job is not in a state that permits this transition")]
    WrongState,

    #[error("proposed fee is outside the allowed range")]
    FeeOutOfRange,
}

impl DispatchError {
    pub fn precondition(&self) -> Option<Precondition> {
        match self {
            DispatchError::PreconditionFailed(gate) => Some(*gate),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Conflict(_))
    }
}
