use starter_common::ErrorKind;
use thiserror::Error;

use crate::events::FailureReport;

/// Conditions that prevent an attempt from starting.
///
/// These leave the workflow state untouched. Failures inside an attempt are
/// reported as [`crate::AttemptOutcome::Failed`] instead.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("A proof attempt is already in flight")]
    SessionBusy,

    #[error("No proving session; initialize the workflow first")]
    SessionUnavailable,

    #[error("Session destroyed")]
    SessionDestroyed,

    #[error("Session initialization failed: {0}")]
    Init(FailureReport),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::SessionBusy => ErrorKind::SessionBusy,
            WorkflowError::SessionUnavailable => ErrorKind::SessionUnavailable,
            WorkflowError::SessionDestroyed => ErrorKind::SessionDestroyed,
            WorkflowError::Init(report) => report.kind,
            WorkflowError::Task(_) => ErrorKind::Internal,
        }
    }
}
