use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::dispatch::{NotificationDispatcher, SyncEvent};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, Job, JobId, Notification, NotificationId,
    NotificationKind, SavedJob, SubjectRef, UserId,
};
use super::error::SyncError;
use super::ingest::ApplicationRecord;
use super::state::StoreSet;
use super::store::UpsertSummary;
use crate::api::SessionUser;

/// When a status change becomes visible in the application store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    /// Write the new status before the server confirms; roll back on failure.
    #[default]
    Optimistic,
    /// Write the new status only once the server confirms.
    Confirmed,
}

impl TransitionMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Some(Self::Optimistic),
            "confirmed" | "pessimistic" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// A validated, not yet committed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub application_id: ApplicationId,
    pub job_id: JobId,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Applies logical events across every store they touch.
///
/// Each method takes the whole [`StoreSet`] by `&mut`, and callers hold the state lock
/// for the duration, so a reader sees either none or all of an event's effects.
pub struct CrossResourceSynchronizer<D> {
    dispatcher: Arc<D>,
    mode: TransitionMode,
}

impl<D> Clone for CrossResourceSynchronizer<D> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            mode: self.mode,
        }
    }
}

impl<D: NotificationDispatcher> CrossResourceSynchronizer<D> {
    pub fn new(dispatcher: Arc<D>, mode: TransitionMode) -> Self {
        Self { dispatcher, mode }
    }

    pub fn mode(&self) -> TransitionMode {
        self.mode
    }

    /// Validate `target` against the DAG and the actor's ownership. On success the
    /// application is marked in flight and, in optimistic mode, already carries the
    /// new status. On failure nothing is mutated.
    pub(crate) fn prepare(
        &self,
        stores: &mut StoreSet,
        actor: &SessionUser,
        id: &ApplicationId,
        target: ApplicationStatus,
    ) -> Result<StatusChange, SyncError> {
        if stores.transitions_in_flight.contains(id) {
            return Err(SyncError::TransitionInFlight(id.clone()));
        }
        let application = stores
            .applications
            .get_by_id(id)
            .ok_or_else(|| SyncError::NotFound(format!("application {id}")))?;

        if !application.status.can_transition_to(target) {
            return Err(SyncError::InvalidTransition {
                from: application.status,
                to: target,
            });
        }

        let owner = stores
            .jobs
            .get_by_id(&application.job_id)
            .map(|job| &job.owner)
            .or(application.job_owner.as_ref());
        if !actor.is_recruiter() || owner != Some(&actor.id) {
            return Err(SyncError::Forbidden(format!(
                "only the recruiter owning job {} may change this application",
                application.job_id
            )));
        }

        let change = StatusChange {
            application_id: id.clone(),
            job_id: application.job_id.clone(),
            from: application.status,
            to: target,
        };

        stores.transitions_in_flight.insert(id.clone());
        if self.mode == TransitionMode::Optimistic {
            Self::write_status(stores, id, target);
        }
        Ok(change)
    }

    /// Server confirmed: status, generated notification, and event land together.
    pub(crate) fn commit(
        &self,
        stores: &mut StoreSet,
        change: &StatusChange,
        confirmed: &ApplicationRecord,
    ) -> Notification {
        stores.transitions_in_flight.remove(&change.application_id);
        if let Some(job) = &confirmed.job {
            stores.jobs.upsert(job.clone());
        }
        Self::write_status(stores, &change.application_id, change.to);

        let job_title = stores
            .jobs
            .get_by_id(&change.job_id)
            .map(|job| job.title.clone())
            .unwrap_or_else(|| change.job_id.to_string());
        let notification = Notification {
            id: NotificationId::local(Uuid::new_v4()),
            kind: NotificationKind::Application,
            subject: Some(SubjectRef::Application(change.application_id.clone())),
            title: "Application status updated".to_string(),
            message: format!(
                "Application for {job_title} moved from {} to {}",
                change.from, change.to
            ),
            read: false,
            created_at: Utc::now(),
        };
        stores.notifications.upsert(notification.clone());

        let event = SyncEvent::ApplicationStatusChanged {
            application_id: change.application_id.clone(),
            job_id: change.job_id.clone(),
            from: change.from,
            to: change.to,
            notification_id: notification.id.clone(),
            at: notification.created_at,
        };
        if let Err(err) = self.dispatcher.notify(event) {
            warn!(application_id = %change.application_id, error = %err, "notification dispatch failed");
        }

        info!(
            application_id = %change.application_id,
            from = %change.from,
            to = %change.to,
            "application status committed"
        );
        notification
    }

    /// Server refused or was unreachable: restore the prior status exactly.
    pub(crate) fn rollback(&self, stores: &mut StoreSet, change: &StatusChange, cause: &SyncError) {
        stores.transitions_in_flight.remove(&change.application_id);
        if self.mode == TransitionMode::Optimistic {
            Self::write_status(stores, &change.application_id, change.from);
        }
        warn!(
            application_id = %change.application_id,
            from = %change.from,
            to = %change.to,
            error = %cause,
            "application status rolled back"
        );
    }

    fn write_status(stores: &mut StoreSet, id: &ApplicationId, status: ApplicationStatus) {
        if let Some(application) = stores.applications.get_by_id(id) {
            let updated = Application {
                status,
                ..application.clone()
            };
            stores.applications.replace_one(updated);
        }
    }

    /// Merge fetched or created applications, plus any populated jobs they carry.
    pub(crate) fn merge_applications(
        stores: &mut StoreSet,
        records: impl IntoIterator<Item = ApplicationRecord>,
    ) -> UpsertSummary {
        let mut applications = Vec::new();
        for record in records {
            let mut application = record.application;
            if let Some(job) = record.job {
                application.job_owner = Some(job.owner.clone());
                stores.jobs.upsert(job);
            } else if application.job_owner.is_none() {
                application.job_owner = stores
                    .jobs
                    .get_by_id(&application.job_id)
                    .map(|job| job.owner.clone());
            }
            applications.push(application);
        }
        stores.applications.upsert_many(applications)
    }

    /// Drop a job and every saved reference to it. Applications stay as history.
    pub(crate) fn remove_job(stores: &mut StoreSet, id: &JobId) -> Option<Job> {
        let removed = stores.jobs.remove(id)?;
        let dropped = stores.saved_jobs.retain(|saved| &saved.job_id != id);
        info!(job_id = %id, saved_references = dropped, "job removed");
        Some(removed)
    }

    /// Replace `user`'s saved set with the server's list.
    pub(crate) fn merge_saved_jobs(stores: &mut StoreSet, user: &UserId, jobs: Vec<Job>) {
        let listed: Vec<JobId> = jobs.iter().map(|job| job.id.clone()).collect();
        stores.jobs.upsert_many(jobs);
        stores
            .saved_jobs
            .retain(|saved| &saved.applicant_id != user || listed.contains(&saved.job_id));
        stores
            .saved_jobs
            .upsert_many(listed.into_iter().map(|job_id| SavedJob {
                applicant_id: user.clone(),
                job_id,
            }));
    }
}
