use thiserror::Error;

use super::record::{ProcessRecord, ProcessStatus};

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ProcessStatus, ProcessStatus),
}

/// Legal lifecycle transitions.
///
/// `Starting -> Stopped` covers a user stop issued during a restart backoff,
/// and `Error -> Stopped` a stop on a crashed record.
pub fn can_transition(from: ProcessStatus, to: ProcessStatus) -> bool {
    use ProcessStatus::*;
    matches!(
        (from, to),
        (Starting, Running)
            | (Starting, Error)
            | (Starting, Stopped)
            | (Running, Stopped)
            | (Running, Error)
            | (Running, Starting)
            | (Stopped, Starting)
            | (Error, Starting)
            | (Error, Stopped)
    )
}

/// Apply a transition to the record, rejecting illegal ones.
pub fn transition(record: &mut ProcessRecord, to: ProcessStatus) -> Result<(), TransitionError> {
    if can_transition(record.status, to) {
        tracing::debug!(id = %record.id, "state transition: {:?} -> {:?}", record.status, to);
        record.status = to;
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition(record.status, to))
    }
}
