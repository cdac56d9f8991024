//! Network boundary consumed by the synchronization core.

pub mod http;
pub mod memory;
pub mod session;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::sync::domain::{
    ApplicationDraft, ApplicationId, ApplicationStatus, Job, JobDraft, JobFilter, JobId,
    Notification, NotificationId, RemoteStats, UserId,
};
use crate::sync::error::SyncError;
use crate::sync::ingest::ApplicationRecord;

pub use http::HttpJobBoardApi;
pub use memory::MemoryJobBoard;
pub use session::{AuthContext, KeyValueStore, MemoryKeyValueStore, SessionUser};

/// One variant per backend endpoint the core calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListJobs,
    CreateJob,
    UpdateJob,
    DeleteJob,
    Apply,
    MyApplications,
    RecruiterApplications,
    UpdateApplicationStatus,
    SavedJobs,
    SaveJob,
    UnsaveJob,
    Notifications,
    MarkNotificationRead,
    RecruiterStats,
}

/// Request/response primitive for the job board backend.
#[async_trait]
pub trait JobBoardApi: Send + Sync {
    /// `GET /jobs`
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SyncError>;
    /// `POST /jobs`
    async fn create_job(&self, draft: &JobDraft) -> Result<Job, SyncError>;
    /// `PUT /jobs/:id`
    async fn update_job(&self, id: &JobId, draft: &JobDraft) -> Result<Job, SyncError>;
    /// `DELETE /jobs/:id`
    async fn delete_job(&self, id: &JobId) -> Result<(), SyncError>;
    /// `POST /applications`
    async fn apply(
        &self,
        job_id: &JobId,
        draft: &ApplicationDraft,
    ) -> Result<ApplicationRecord, SyncError>;
    /// `GET /applications/my-applications`
    async fn my_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError>;
    /// `GET /applications/recruiter/all`
    async fn recruiter_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError>;
    /// `PATCH /applications/:id/status`
    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, SyncError>;
    /// `GET /jobs/saved`
    async fn saved_jobs(&self) -> Result<Vec<Job>, SyncError>;
    /// `POST /jobs/:id/save`
    async fn save_job(&self, id: &JobId) -> Result<(), SyncError>;
    /// `DELETE /jobs/:id/save`
    async fn unsave_job(&self, id: &JobId) -> Result<(), SyncError>;
    /// `GET /notifications`
    async fn notifications(&self) -> Result<Vec<Notification>, SyncError>;
    /// `PATCH /notifications/:id/read`
    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), SyncError>;
    /// `GET /stats/recruiter?recruiterId=`
    async fn recruiter_stats(&self, recruiter: &UserId) -> Result<RemoteStats, SyncError>;
}

/// `{ success, data?, error?, details? }` as sent by the backend.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Vec<Value>>,
}

/// Map a status code and raw body to the envelope's `data` or a [`SyncError`].
///
/// The server's `error` string is surfaced verbatim; the generic message is used only
/// when the body carries none.
pub fn interpret_response(status: u16, body: &str) -> Result<Value, SyncError> {
    let envelope = serde_json::from_str::<Envelope>(body).ok();
    let succeeded = (200..300).contains(&status)
        && envelope
            .as_ref()
            .map_or(true, |env| env.success != Some(false));

    if succeeded {
        return match envelope {
            Some(env) => Ok(env.data.unwrap_or(Value::Null)),
            None if body.trim().is_empty() => Ok(Value::Null),
            None => Err(SyncError::MalformedResponse(format!(
                "response is not a JSON envelope: {}",
                body.chars().take(200).collect::<String>()
            ))),
        };
    }

    let (message, details) = match envelope {
        Some(env) => (
            env.error
                .or(env.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("request failed with status {status}")),
            env.details.unwrap_or_default(),
        ),
        None => (format!("request failed with status {status}"), Vec::new()),
    };

    Err(match status {
        401 | 403 => SyncError::AuthExpired(message),
        404 => SyncError::NotFound(message),
        400..=499 if !details.is_empty() => SyncError::ValidationFailed { message, details },
        _ => SyncError::RemoteRejected(message),
    })
}

/// Decode the envelope `data` into a typed value.
pub fn decode_data<T: DeserializeOwned>(data: Value) -> Result<T, SyncError> {
    serde_json::from_value(data).map_err(|err| SyncError::MalformedResponse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_yields_data() {
        let data = interpret_response(200, r#"{"success":true,"data":[1,2]}"#).expect("ok");
        assert_eq!(data, json!([1, 2]));
    }

    #[test]
    fn success_false_is_rejected_with_server_message() {
        let err = interpret_response(200, r#"{"success":false,"error":"Job is closed"}"#)
            .unwrap_err();
        assert_eq!(err, SyncError::RemoteRejected("Job is closed".to_string()));
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert!(matches!(
            interpret_response(401, r#"{"success":false,"error":"Token expired"}"#),
            Err(SyncError::AuthExpired(message)) if message == "Token expired"
        ));
        assert!(matches!(
            interpret_response(404, r#"{"success":false,"error":"Job not found"}"#),
            Err(SyncError::NotFound(_))
        ));
        assert!(matches!(
            interpret_response(
                400,
                r#"{"success":false,"error":"Validation failed","details":[{"field":"title"}]}"#
            ),
            Err(SyncError::ValidationFailed { details, .. }) if details.len() == 1
        ));
        assert!(matches!(
            interpret_response(500, "<html>oops</html>"),
            Err(SyncError::RemoteRejected(message)) if message.contains("500")
        ));
    }

    #[test]
    fn empty_success_body_is_null_data() {
        assert_eq!(interpret_response(204, "").expect("ok"), Value::Null);
        let unit: () = decode_data(Value::Null).expect("unit decodes from null");
        assert_eq!(unit, ());
    }
}
