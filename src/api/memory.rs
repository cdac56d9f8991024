//! In-process [`JobBoardApi`] used by the demo command and tests.
//!
//! One [`MemoryJobBoard`] holds the shared backend data; [`MemoryJobBoard::session`]
//! hands out handles acting as a particular user. Failures can be queued per endpoint
//! to exercise rollback and partial-failure paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Endpoint, JobBoardApi};
use crate::sync::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Job, JobDraft, JobFilter,
    JobId, JobStatus, Notification, NotificationId, NotificationKind, RemoteStats, SubjectRef,
    UserId,
};
use crate::sync::error::SyncError;
use crate::sync::ingest::ApplicationRecord;

#[derive(Default)]
struct BoardData {
    jobs: Vec<Job>,
    applications: Vec<Application>,
    saved: Vec<(UserId, JobId)>,
    notifications: HashMap<UserId, Vec<Notification>>,
    failures: HashMap<Endpoint, VecDeque<SyncError>>,
    calls: HashMap<Endpoint, usize>,
}

impl BoardData {
    fn record(&mut self, endpoint: Endpoint) -> Result<(), SyncError> {
        *self.calls.entry(endpoint).or_default() += 1;
        match self.failures.get_mut(&endpoint).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn job(&self, id: &JobId) -> Result<&Job, SyncError> {
        self.jobs
            .iter()
            .find(|job| &job.id == id)
            .ok_or_else(|| SyncError::NotFound("Job not found".to_string()))
    }

    fn record_for(&self, application: &Application) -> ApplicationRecord {
        let job = self.job(&application.job_id).ok().cloned();
        ApplicationRecord {
            application: Application {
                job_owner: job.as_ref().map(|job| job.owner.clone()),
                ..application.clone()
            },
            job,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryJobBoard {
    data: Arc<Mutex<BoardData>>,
    acting_as: Option<UserId>,
}

impl MemoryJobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this board's data, acting as `user`.
    pub fn session(&self, user: &UserId) -> Self {
        Self {
            data: Arc::clone(&self.data),
            acting_as: Some(user.clone()),
        }
    }

    /// Make the next call to `endpoint` fail with `error`. Failures queue in order.
    pub fn fail_next(&self, endpoint: Endpoint, error: SyncError) {
        self.lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Insert a job directly, bypassing any session.
    pub fn insert_job(&self, job: Job) {
        self.lock().jobs.push(job);
    }

    /// Queue a server-side notification for `user`, bypassing any session.
    pub fn deliver(&self, user: &UserId, notification: Notification) {
        self.lock()
            .notifications
            .entry(user.clone())
            .or_default()
            .push(notification);
    }

    pub fn application_status(&self, id: &ApplicationId) -> Option<ApplicationStatus> {
        self.lock()
            .applications
            .iter()
            .find(|app| &app.id == id)
            .map(|app| app.status)
    }

    fn lock(&self) -> MutexGuard<'_, BoardData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn actor(&self) -> Result<&UserId, SyncError> {
        self.acting_as
            .as_ref()
            .ok_or_else(|| SyncError::AuthExpired("Not authorized, no token".to_string()))
    }

    fn owned_job_index(data: &BoardData, id: &JobId, actor: &UserId) -> Result<usize, SyncError> {
        let index = data
            .jobs
            .iter()
            .position(|job| &job.id == id)
            .ok_or_else(|| SyncError::NotFound("Job not found".to_string()))?;
        if &data.jobs[index].owner != actor {
            return Err(SyncError::AuthExpired(
                "Not authorized to modify this job".to_string(),
            ));
        }
        Ok(index)
    }
}

fn job_from_draft(id: JobId, owner: UserId, draft: &JobDraft) -> Job {
    Job {
        id,
        title: draft.title.clone(),
        company: draft.company.clone(),
        location: draft.location.clone(),
        job_type: draft.job_type,
        remote: draft.remote,
        salary: draft.salary.clone(),
        posted_at: Some(Utc::now()),
        owner,
        description: draft.description.clone(),
        requirements: draft.requirements.clone(),
        skills: draft.skills.clone(),
        status: JobStatus::Active,
    }
}

#[async_trait]
impl JobBoardApi for MemoryJobBoard {
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SyncError> {
        let mut data = self.lock();
        data.record(Endpoint::ListJobs)?;
        Ok(data
            .jobs
            .iter()
            .filter(|job| job.status == JobStatus::Active && filter.matches(job))
            .cloned()
            .collect())
    }

    async fn create_job(&self, draft: &JobDraft) -> Result<Job, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::CreateJob)?;
        if draft.title.trim().is_empty() {
            return Err(SyncError::ValidationFailed {
                message: "Validation failed".to_string(),
                details: vec![serde_json::json!({ "field": "title", "message": "required" })],
            });
        }
        let job = job_from_draft(JobId(format!("job-{}", Uuid::new_v4())), actor, draft);
        data.jobs.push(job.clone());
        Ok(job)
    }

    async fn update_job(&self, id: &JobId, draft: &JobDraft) -> Result<Job, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::UpdateJob)?;
        let index = Self::owned_job_index(&data, id, &actor)?;
        let existing = &data.jobs[index];
        let updated = Job {
            posted_at: existing.posted_at,
            status: existing.status,
            ..job_from_draft(id.clone(), actor, draft)
        };
        data.jobs[index] = updated.clone();
        Ok(updated)
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::DeleteJob)?;
        let index = Self::owned_job_index(&data, id, &actor)?;
        data.jobs.remove(index);
        data.saved.retain(|(_, job_id)| job_id != id);
        Ok(())
    }

    async fn apply(
        &self,
        job_id: &JobId,
        draft: &ApplicationDraft,
    ) -> Result<ApplicationRecord, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::Apply)?;
        data.job(job_id)?;
        if data
            .applications
            .iter()
            .any(|app| &app.job_id == job_id && app.applicant_id == actor)
        {
            return Err(SyncError::RemoteRejected(
                "You have already applied for this job".to_string(),
            ));
        }
        let application = Application {
            id: ApplicationId(format!("app-{}", Uuid::new_v4())),
            job_id: job_id.clone(),
            applicant_id: actor,
            job_owner: None,
            status: ApplicationStatus::Pending,
            applied_at: Some(Utc::now()),
            cover_letter: draft.cover_letter.clone(),
            expected_salary: draft.expected_salary.clone(),
            experience: draft.experience.clone(),
        };
        data.applications.push(application.clone());
        Ok(data.record_for(&application))
    }

    async fn my_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::MyApplications)?;
        Ok(data
            .applications
            .iter()
            .filter(|app| app.applicant_id == actor)
            .map(|app| data.record_for(app))
            .collect())
    }

    async fn recruiter_applications(&self) -> Result<Vec<ApplicationRecord>, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::RecruiterApplications)?;
        Ok(data
            .applications
            .iter()
            .map(|app| data.record_for(app))
            .filter(|record| record.application.job_owner.as_ref() == Some(&actor))
            .collect())
    }

    async fn update_application_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::UpdateApplicationStatus)?;
        let index = data
            .applications
            .iter()
            .position(|app| &app.id == id)
            .ok_or_else(|| SyncError::NotFound("Application not found".to_string()))?;
        let job_id = data.applications[index].job_id.clone();
        if data.job(&job_id).map(|job| &job.owner) != Ok(&actor) {
            return Err(SyncError::AuthExpired(
                "Not authorized to update this application".to_string(),
            ));
        }
        let current = data.applications[index].status;
        if !current.can_transition_to(status) {
            return Err(SyncError::RemoteRejected(format!(
                "Cannot change status from {current} to {status}"
            )));
        }
        data.applications[index].status = status;

        let applicant = data.applications[index].applicant_id.clone();
        let notice = Notification {
            id: NotificationId(format!("ntf-{}", Uuid::new_v4())),
            kind: NotificationKind::Application,
            subject: Some(SubjectRef::Application(id.clone())),
            title: "Application update".to_string(),
            message: format!("Your application is now {status}"),
            read: false,
            created_at: Utc::now(),
        };
        data.notifications.entry(applicant).or_default().push(notice);

        let application = data.applications[index].clone();
        Ok(data.record_for(&application))
    }

    async fn saved_jobs(&self) -> Result<Vec<Job>, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::SavedJobs)?;
        Ok(data
            .saved
            .iter()
            .filter(|(user, _)| user == &actor)
            .filter_map(|(_, job_id)| data.job(job_id).ok().cloned())
            .collect())
    }

    async fn save_job(&self, id: &JobId) -> Result<(), SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::SaveJob)?;
        data.job(id)?;
        let entry = (actor, id.clone());
        if !data.saved.contains(&entry) {
            data.saved.push(entry);
        }
        Ok(())
    }

    async fn unsave_job(&self, id: &JobId) -> Result<(), SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::UnsaveJob)?;
        data.saved
            .retain(|(user, job_id)| !(user == &actor && job_id == id));
        Ok(())
    }

    async fn notifications(&self) -> Result<Vec<Notification>, SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::Notifications)?;
        Ok(data.notifications.get(&actor).cloned().unwrap_or_default())
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        let actor = self.actor()?.clone();
        let mut data = self.lock();
        data.record(Endpoint::MarkNotificationRead)?;
        let notice = data
            .notifications
            .get_mut(&actor)
            .and_then(|list| list.iter_mut().find(|n| &n.id == id))
            .ok_or_else(|| SyncError::NotFound("Notification not found".to_string()))?;
        notice.read = true;
        Ok(())
    }

    async fn recruiter_stats(&self, recruiter: &UserId) -> Result<RemoteStats, SyncError> {
        let mut data = self.lock();
        data.record(Endpoint::RecruiterStats)?;
        let owned: Vec<&JobId> = data
            .jobs
            .iter()
            .filter(|job| &job.owner == recruiter)
            .map(|job| &job.id)
            .collect();
        let candidates: Vec<&Application> = data
            .applications
            .iter()
            .filter(|app| owned.contains(&&app.job_id))
            .collect();
        let accepted = candidates
            .iter()
            .filter(|app| app.status == ApplicationStatus::Accepted)
            .count();
        let success_rate = if candidates.is_empty() {
            0.0
        } else {
            accepted as f64 / candidates.len() as f64 * 100.0
        };
        Ok(RemoteStats {
            active_jobs: owned.len() as u64,
            candidates: candidates.len() as u64,
            success_rate,
        })
    }
}
