use serde_json::Value;

use super::domain::{ApplicationId, ApplicationStatus, JobId};

/// Failure surfaced by every synchronization operation.
///
/// Cloneable so a single in-flight result can be handed to every caller that joined it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Transport failed before any response arrived.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    /// 401/403 from the server; the stored token must be refreshed.
    #[error("session expired: {0}")]
    AuthExpired(String),
    #[error("{message}")]
    ValidationFailed { message: String, details: Vec<Value> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("{0}")]
    RemoteRejected(String),
    #[error("already applied to job {0}")]
    DuplicateApplication(JobId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("a status change for application {0} is already in flight")]
    TransitionInFlight(ApplicationId),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no authenticated session: {0}")]
    Unauthenticated(String),
}

impl SyncError {
    /// Errors raised by local precondition checks never reached the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidTransition { .. }
                | SyncError::DuplicateApplication(_)
                | SyncError::Forbidden(_)
                | SyncError::TransitionInFlight(_)
                | SyncError::Unauthenticated(_)
        )
    }

    /// Network-origin failures worth retrying with the same request key.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable(_) | SyncError::Timeout(_)
        )
    }

    /// Failure of a write the client already applied optimistically. Any answer from
    /// the server becomes [`SyncError::RemoteRejected`] carrying its message verbatim;
    /// transport failures pass through unchanged.
    pub fn into_rejection(self) -> SyncError {
        match self {
            SyncError::AuthExpired(message)
            | SyncError::ValidationFailed { message, .. }
            | SyncError::NotFound(message)
            | SyncError::MalformedResponse(message) => SyncError::RemoteRejected(message),
            other => other,
        }
    }
}
