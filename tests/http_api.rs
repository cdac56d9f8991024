//! Exercises the reqwest adapter against a local axum server speaking the job board's
//! JSON envelope.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::{json, Value};

use jobboard_sync::api::session::TOKEN_KEY;
use jobboard_sync::api::{
    HttpJobBoardApi, JobBoardApi, KeyValueStore, MemoryKeyValueStore, SessionUser,
};
use jobboard_sync::sync::{
    AppState, ApplicationId, ApplicationStatus, JobFilter, JobType, NoopDispatcher, Role,
    Salary, SyncError, SyncOptions, UserId,
};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl Seen {
    fn record(&self, uri: &Uri, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests
            .lock()
            .expect("seen mutex poisoned")
            .push((uri.to_string(), auth));
    }

    fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().expect("seen mutex poisoned").clone()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some("Bearer tok-1")
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "Not authorized, token failed" })),
    )
}

async fn jobs(
    State(seen): State<Seen>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    seen.record(&uri, &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "jobs": [{
                    "_id": "j-1",
                    "title": "Rust Developer",
                    "company": "Acme",
                    "location": "Remote",
                    "type": "Full Time",
                    "remote": true,
                    "salary": { "min": "90,000", "max": 120000, "currency": "USD" },
                    "skills": "rust, tokio",
                    "postedBy": { "_id": "rec-1", "name": "Rita" },
                    "createdAt": "2024-03-01T10:00:00Z"
                }]
            }
        })),
    )
}

async fn recruiter_applications(
    State(seen): State<Seen>,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Json<Value>) {
    seen.record(&uri, &headers);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": [{
                "_id": "a-1",
                "job": { "_id": "j-1", "title": "Rust Developer", "postedBy": "rec-1" },
                "applicant": { "_id": "seek-1", "name": "Sam" },
                "status": "reviewing",
                "appliedDate": "2024-03-02"
            }]
        })),
    )
}

async fn update_status(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.record(&uri, &headers);
    match id.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Application not found" })),
        ),
        "invalid" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Validation failed",
                "details": [{ "field": "status", "message": "Invalid status" }]
            })),
        ),
        "locked" => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "Application is locked" })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "_id": id,
                    "job": "j-1",
                    "applicant": "seek-1",
                    "status": body["status"],
                }
            })),
        ),
    }
}

async fn notifications() -> (StatusCode, &'static str) {
    (StatusCode::OK, "<html>maintenance</html>")
}

async fn slow_stats() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "success": true, "data": {} }))
}

async fn spawn_server(seen: Seen) -> String {
    let router = Router::new()
        .route("/api/jobs", get(jobs))
        .route("/api/applications/recruiter/all", get(recruiter_applications))
        .route("/api/applications/:id/status", patch(update_status))
        .route("/api/notifications", get(notifications))
        .route("/api/stats/recruiter", get(slow_stats))
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server runs");
    });
    format!("http://{addr}/api")
}

fn client(base_url: &str, timeout: Duration) -> (HttpJobBoardApi, Arc<MemoryKeyValueStore>) {
    let storage = Arc::new(MemoryKeyValueStore::new());
    storage.set(TOKEN_KEY, "tok-1".to_string());
    let api = HttpJobBoardApi::new(base_url, timeout, storage.clone()).expect("client builds");
    (api, storage)
}

#[tokio::test]
async fn lists_jobs_with_bearer_token_and_normalized_payload() {
    let seen = Seen::default();
    let base_url = spawn_server(seen.clone()).await;
    let (api, _storage) = client(&base_url, Duration::from_secs(5));

    let filter = JobFilter {
        search: Some("rust".to_string()),
        job_type: Some(JobType::FullTime),
        ..JobFilter::default()
    };
    let jobs = api.list_jobs(&filter).await.expect("jobs listed");

    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.owner, UserId::new("rec-1"));
    assert_eq!(job.job_type, JobType::FullTime);
    assert_eq!(job.skills, vec!["rust".to_string(), "tokio".to_string()]);
    assert_eq!(
        job.salary,
        Salary::Range {
            min: Some(90_000),
            max: Some(120_000),
            currency: Some("USD".to_string()),
        }
    );
    assert!(job.posted_at.is_some());

    let requests = seen.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "/api/jobs?search=rust&type=full-time");
    assert_eq!(requests[0].1.as_deref(), Some("Bearer tok-1"));
}

#[tokio::test]
async fn token_is_read_from_storage_on_every_request() {
    let seen = Seen::default();
    let base_url = spawn_server(seen.clone()).await;
    let (api, storage) = client(&base_url, Duration::from_secs(5));

    storage.remove(TOKEN_KEY);
    match api.list_jobs(&JobFilter::default()).await {
        Err(SyncError::AuthExpired(message)) => {
            assert_eq!(message, "Not authorized, token failed");
        }
        other => panic!("expected auth expiry, got {other:?}"),
    }

    storage.set(TOKEN_KEY, "tok-1".to_string());
    assert!(api.list_jobs(&JobFilter::default()).await.is_ok());
    let auth: Vec<Option<String>> = seen.requests().into_iter().map(|(_, auth)| auth).collect();
    assert_eq!(auth, vec![None, Some("Bearer tok-1".to_string())]);
}

#[tokio::test]
async fn envelope_failures_map_to_error_taxonomy() {
    let base_url = spawn_server(Seen::default()).await;
    let (api, _storage) = client(&base_url, Duration::from_secs(5));

    let confirmed = api
        .update_application_status(&ApplicationId::new("a-7"), ApplicationStatus::Shortlisted)
        .await
        .expect("status updated");
    assert_eq!(confirmed.application.status, ApplicationStatus::Shortlisted);

    assert!(matches!(
        api.update_application_status(&ApplicationId::new("missing"), ApplicationStatus::Reviewing)
            .await,
        Err(SyncError::NotFound(message)) if message == "Application not found"
    ));
    match api
        .update_application_status(&ApplicationId::new("invalid"), ApplicationStatus::Reviewing)
        .await
    {
        Err(SyncError::ValidationFailed { message, details }) => {
            assert_eq!(message, "Validation failed");
            assert_eq!(details.len(), 1);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(
        api.update_application_status(&ApplicationId::new("locked"), ApplicationStatus::Reviewing)
            .await
            .map(|record| record.application.status),
        Err(SyncError::RemoteRejected("Application is locked".to_string()))
    );
    assert!(matches!(
        api.notifications().await,
        Err(SyncError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn transport_failures_are_classified() {
    let base_url = spawn_server(Seen::default()).await;
    let (api, _storage) = client(&base_url, Duration::from_millis(200));
    assert!(matches!(
        api.recruiter_stats(&UserId::new("rec-1")).await,
        Err(SyncError::Timeout(_))
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let (offline, _storage) = client(&format!("http://{addr}/api"), Duration::from_secs(2));
    match offline.list_jobs(&JobFilter::default()).await {
        Err(err) => assert!(err.is_transient(), "expected transport error, got {err:?}"),
        Ok(jobs) => panic!("expected failure, got {jobs:?}"),
    }
}

#[tokio::test]
async fn app_state_syncs_over_http() {
    let base_url = spawn_server(Seen::default()).await;
    let (api, _storage) = client(&base_url, Duration::from_secs(5));
    let state = AppState::new(
        Arc::new(api),
        Arc::new(NoopDispatcher),
        SessionUser::new("rec-1", "Rita", Role::Recruiter),
        SyncOptions::default(),
    );

    let report = state.refresh_all().await;
    assert!(report.jobs.is_ok());
    assert!(report.applications.is_ok());
    assert!(matches!(
        report.notifications,
        Err(SyncError::MalformedResponse(_))
    ));

    let stats = state.stats();
    assert_eq!(stats.active_jobs, 1);
    assert_eq!(stats.candidates, 1);
    assert_eq!(
        state
            .application(&ApplicationId::new("a-1"))
            .map(|app| app.status),
        Some(ApplicationStatus::Reviewing)
    );
}
