use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use crate::api::{JobBoardApi, MemoryJobBoard, SessionUser};
use crate::sync::dispatch::{DispatchError, NotificationDispatcher, SyncEvent};
use crate::sync::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Job, JobDraft, JobId,
    JobStatus, JobType, Role, Salary, UserId,
};
use crate::sync::state::{AppState, SyncOptions};
use crate::sync::synchronizer::TransitionMode;

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingDispatcher {
    pub(super) fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().expect("dispatcher mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn notify(&self, event: SyncEvent) -> Result<(), DispatchError> {
        self.events
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct FailingDispatcher {
    attempts: Mutex<usize>,
}

impl FailingDispatcher {
    pub(super) fn attempts(&self) -> usize {
        *self.attempts.lock().expect("dispatcher mutex poisoned")
    }
}

impl NotificationDispatcher for FailingDispatcher {
    fn notify(&self, _event: SyncEvent) -> Result<(), DispatchError> {
        *self.attempts.lock().expect("dispatcher mutex poisoned") += 1;
        Err(DispatchError::Transport("push gateway down".to_string()))
    }
}

pub(super) fn recruiter() -> SessionUser {
    SessionUser::new("rec-1", "Rita Recruiter", Role::Recruiter)
}

pub(super) fn other_recruiter() -> SessionUser {
    SessionUser::new("rec-2", "Omar Recruiter", Role::Recruiter)
}

pub(super) fn seeker() -> SessionUser {
    SessionUser::new("seek-1", "Sam Seeker", Role::JobSeeker)
}

pub(super) fn state_for<D>(
    board: &MemoryJobBoard,
    user: SessionUser,
    dispatcher: Arc<D>,
    mode: TransitionMode,
) -> AppState<MemoryJobBoard, D>
where
    D: NotificationDispatcher + 'static,
{
    let api = Arc::new(board.session(&user.id));
    let options = SyncOptions {
        transition_mode: mode,
        ..SyncOptions::default()
    };
    AppState::new(api, dispatcher, user, options)
}

pub(super) fn job(id: &str, owner: &str) -> Job {
    Job {
        id: JobId::new(id),
        title: format!("Job {id}"),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        job_type: JobType::FullTime,
        remote: true,
        salary: Salary::Unspecified,
        posted_at: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).single(),
        owner: UserId::new(owner),
        description: String::new(),
        requirements: Vec::new(),
        skills: Vec::new(),
        status: JobStatus::Active,
    }
}

pub(super) fn application(id: &str, job_id: &str, status: ApplicationStatus) -> Application {
    Application {
        id: ApplicationId::new(id),
        job_id: JobId::new(job_id),
        applicant_id: seeker().id,
        job_owner: None,
        status,
        applied_at: Utc.with_ymd_and_hms(2024, 2, 2, 8, 30, 0).single(),
        cover_letter: "Keen to join".to_string(),
        expected_salary: Salary::Unspecified,
        experience: None,
    }
}

/// Recruiter posts a job and the seeker applies, both directly against the board.
pub(super) async fn posted_application(board: &MemoryJobBoard) -> (JobId, ApplicationId) {
    let job = board
        .session(&recruiter().id)
        .create_job(&JobDraft::new("Backend Engineer", "Acme"))
        .await
        .expect("job created");
    let record = board
        .session(&seeker().id)
        .apply(&job.id, &ApplicationDraft::default())
        .await
        .expect("application created");
    (job.id, record.application.id)
}

/// A recruiter state that has already loaded one pending application.
pub(super) async fn loaded_recruiter<D>(
    board: &MemoryJobBoard,
    dispatcher: Arc<D>,
    mode: TransitionMode,
) -> (AppState<MemoryJobBoard, D>, ApplicationId)
where
    D: NotificationDispatcher + 'static,
{
    let (_, application_id) = posted_application(board).await;
    let state = state_for(board, recruiter(), dispatcher, mode);
    let report = state.refresh_all().await;
    assert!(report.is_complete(), "refresh failed: {report:?}");
    (state, application_id)
}
