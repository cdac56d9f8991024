//! reqwest-backed [`JobBoardApi`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::session::{KeyValueStore, TOKEN_KEY};
use super::{decode_data, interpret_response, JobBoardApi};
use crate::sync::domain::{
    ApplicationDraft, ApplicationId, ApplicationStatus, Job, JobDraft, JobFilter, JobId,
    Notification, NotificationId, RemoteStats, UserId,
};
use crate::sync::error::SyncError;
use crate::sync::ingest::{
    application_from_value, job_from_value, list_items, notification_from_value,
    ApplicationRecord,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct HttpJobBoardApi {
    client: reqwest::Client,
    base_url: String,
    storage: Arc<dyn KeyValueStore>,
}

impl HttpJobBoardApi {
    /// `base_url` is the API root, e.g. `https://jobs.example.com/api`. The bearer token
    /// is read from `storage` on every request so sign-in/out takes effect immediately.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                SyncError::NetworkUnavailable(format!("failed to initialize HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
        })
    }

    fn headers(&self) -> Result<HeaderMap, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = self.storage.get(TOKEN_KEY) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| SyncError::AuthExpired(format!("stored token unusable: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api request");
        Ok(self.client.request(method, url).headers(self.headers()?))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, SyncError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        interpret_response(status, &body)
    }

    async fn call(&self, method: Method, path: &str) -> Result<Value, SyncError> {
        self.send(self.request(method, path)?).await
    }

    async fn call_with<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Value, SyncError> {
        self.send(self.request(method, path)?.json(body)).await
    }

    fn jobs(data: &Value) -> Result<Vec<Job>, SyncError> {
        list_items(data, "jobs")?
            .iter()
            .map(job_from_value)
            .collect()
    }

    fn applications(data: &Value) -> Result<Vec<ApplicationRecord>, SyncError> {
        list_items(data, "applications")?
            .iter()
            .map(application_from_value)
            .collect()
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout(err.to_string())
    } else {
        SyncError::NetworkUnavailable(err.to_string())
    }
}

#[async_trait]
impl JobBoardApi for HttpJobBoardApi {
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SyncError> {
        let builder = self
            .request(Method::GET, "/jobs")?
            .query(&filter.query_pairs());
        let data = self.send(builder).await?;
        Self::jobs(&data)
    }

    async fn create_job(&self, draft: &JobDraft) -> Result<Job, SyncError> {
        let data = self.call_with(Method::POST, "/jobs", draft).await?;
        job_from_value(&data)
    }

    async fn update_job(&self, id: &JobId, draft: &JobDraft) -> Result<Job, SyncError> {
        let data = self
            .call_with(Method::PUT, &format!("/jobs/{id}"), draft)
            .await?;
        job_from_value(&data)
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.call(Method::DELETE, &format!("/jobs/{id}")).await?;
        Ok(())
    }

    async fn apply(
        &self,
        job_id: &JobId,
        draft: &ApplicationDraft,
    ) -> Result<ApplicationRecord, SyncError> {
        let body = json!({
            "jobId": job_id,
            "coverLetter": draft.cover_letter,
            "expectedSalary": draft.expected_salary,
            "experience": draft.experience,
        });
        let data = self.call_with(Method::POST, "/applications", &body).await?;
        application_from_value(&data)
    }

    async fn my_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError> {
        let data = self
            .call(Method::GET, "/applications/my-applications")
            .await?;
        Self::applications(&data)
    }

    async fn recruiter_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError> {
        let data = self.call(Method::GET, "/applications/recruiter/all").await?;
        Self::applications(&data)
    }

    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, SyncError> {
        let body = json!({ "status": status });
        let data = self
            .call_with(Method::PATCH, &format!("/applications/{id}/status"), &body)
            .await?;
        application_from_value(&data)
    }

    async fn saved_jobs(&self) -> Result<Vec<Job>, SyncError> {
        let data = self.call(Method::GET, "/jobs/saved").await?;
        Self::jobs(&data)
    }

    async fn save_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.call(Method::POST, &format!("/jobs/{id}/save")).await?;
        Ok(())
    }

    async fn unsave_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.call(Method::DELETE, &format!("/jobs/{id}/save")).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, SyncError> {
        let data = self.call(Method::GET, "/notifications").await?;
        list_items(&data, "notifications")?
            .iter()
            .map(notification_from_value)
            .collect()
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        self.call(Method::PATCH, &format!("/notifications/{id}/read"))
            .await?;
        Ok(())
    }

    async fn recruiter_stats(&self, recruiter: &UserId) -> Result<RemoteStats, SyncError> {
        let builder = self
            .request(Method::GET, "/stats/recruiter")?
            .query(&[("recruiterId", recruiter.as_str())]);
        let data = self.send(builder).await?;
        decode_data(data)
    }
}
