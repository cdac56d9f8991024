use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use super::dispatch::NotificationDispatcher;
use super::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, Job, JobDraft, JobFilter,
    JobId, JobStatus, Notification, NotificationId, RemoteStats, Role, SavedJob, UserId,
};
use super::error::SyncError;
use super::ingest::ApplicationRecord;
use super::lifecycle::{CommitHook, InFlight, Outcome, RequestKey, RequestLifecycle, Supersession};
use super::seed::{SeedError, SeedProvider, SeedSummary};
use super::stats::{DerivedStats, StatsAggregator};
use super::store::ResourceStore;
use super::synchronizer::{CrossResourceSynchronizer, TransitionMode};
use crate::api::{JobBoardApi, SessionUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Jobs,
    Applications,
    Notifications,
    SavedJobs,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Jobs,
        Collection::Applications,
        Collection::Notifications,
        Collection::SavedJobs,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Collection::Jobs => "jobs",
            Collection::Applications => "applications",
            Collection::Notifications => "notifications",
            Collection::SavedJobs => "saved_jobs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Loading/error/success state of one collection. A failed refresh keeps the store
/// contents and `last_synced` of the previous success.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionStatus {
    pub phase: LoadPhase,
    pub error: Option<SyncError>,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Every store plus the bookkeeping that must change in the same critical section.
#[derive(Default)]
pub(crate) struct StoreSet {
    pub(crate) jobs: ResourceStore<Job>,
    pub(crate) applications: ResourceStore<Application>,
    pub(crate) notifications: ResourceStore<Notification>,
    pub(crate) saved_jobs: ResourceStore<SavedJob>,
    pub(crate) collections: BTreeMap<Collection, CollectionStatus>,
    pub(crate) transitions_in_flight: HashSet<ApplicationId>,
    pub(crate) applies_in_flight: HashSet<JobId>,
}

impl StoreSet {
    fn mark_loading(&mut self, collection: Collection) {
        self.collections.entry(collection).or_default().phase = LoadPhase::Loading;
    }

    fn settle<T>(&mut self, collection: Collection, result: &Result<T, SyncError>) {
        let status = self.collections.entry(collection).or_default();
        match result {
            Ok(_) => {
                status.phase = LoadPhase::Ready;
                status.error = None;
                status.last_synced = Some(Utc::now());
            }
            Err(err) => {
                status.phase = LoadPhase::Failed;
                status.error = Some(err.clone());
            }
        }
    }
}

fn lock_stores(stores: &Mutex<StoreSet>) -> MutexGuard<'_, StoreSet> {
    stores.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time copy of every store, taken under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub jobs: Vec<Job>,
    pub applications: Vec<Application>,
    pub notifications: Vec<Notification>,
    pub saved_jobs: Vec<SavedJob>,
}

/// Per-collection result of [`AppState::refresh_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub jobs: Result<usize, SyncError>,
    pub applications: Result<usize, SyncError>,
    pub notifications: Result<usize, SyncError>,
    /// `None` for recruiters, who have no saved jobs.
    pub saved_jobs: Option<Result<usize, SyncError>>,
}

impl SyncReport {
    pub fn failures(&self) -> Vec<(Collection, &SyncError)> {
        let mut failures = Vec::new();
        let entries = [
            (Collection::Jobs, Some(&self.jobs)),
            (Collection::Applications, Some(&self.applications)),
            (Collection::Notifications, Some(&self.notifications)),
            (Collection::SavedJobs, self.saved_jobs.as_ref()),
        ];
        for (collection, result) in entries {
            if let Some(Err(err)) = result {
                failures.push((collection, err));
            }
        }
        failures
    }

    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub transition_mode: TransitionMode,
    pub supersession: Supersession,
}

/// The client-side state aggregate. All mutation goes through its operations.
///
/// Network work is issued through [`RequestLifecycle`]s, so it runs to completion and
/// lands in the stores even if the calling future is dropped.
pub struct AppState<A, D> {
    api: Arc<A>,
    user: SessionUser,
    stores: Arc<Mutex<StoreSet>>,
    synchronizer: CrossResourceSynchronizer<D>,
    job_reads: RequestLifecycle<Vec<Job>>,
    application_reads: RequestLifecycle<Vec<ApplicationRecord>>,
    notification_reads: RequestLifecycle<Vec<Notification>>,
    job_writes: RequestLifecycle<Job>,
    application_writes: RequestLifecycle<ApplicationRecord>,
    acks: RequestLifecycle<()>,
}

impl<A, D> AppState<A, D>
where
    A: JobBoardApi + 'static,
    D: NotificationDispatcher + 'static,
{
    pub fn new(api: Arc<A>, dispatcher: Arc<D>, user: SessionUser, options: SyncOptions) -> Self {
        Self {
            api,
            user,
            stores: Arc::new(Mutex::new(StoreSet::default())),
            synchronizer: CrossResourceSynchronizer::new(dispatcher, options.transition_mode),
            job_reads: RequestLifecycle::new(options.supersession),
            application_reads: RequestLifecycle::new(options.supersession),
            notification_reads: RequestLifecycle::new(options.supersession),
            job_writes: RequestLifecycle::default(),
            application_writes: RequestLifecycle::default(),
            acks: RequestLifecycle::default(),
        }
    }

    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    fn lock(&self) -> MutexGuard<'_, StoreSet> {
        lock_stores(&self.stores)
    }

    /// Commit hook that runs `apply` under the store lock.
    fn hook<T, F>(&self, apply: F) -> CommitHook<T>
    where
        T: 'static,
        F: FnOnce(&mut StoreSet, &Result<T, SyncError>) + Send + 'static,
    {
        let stores = Arc::clone(&self.stores);
        Box::new(move |result: &Result<T, SyncError>| {
            apply(&mut lock_stores(&stores), result)
        })
    }

    fn require_role(&self, role: Role) -> Result<(), SyncError> {
        if self.user.role == role {
            Ok(())
        } else {
            Err(SyncError::Forbidden(format!(
                "{} accounts cannot perform this action",
                self.user.role.label()
            )))
        }
    }

    fn require_owner(&self, id: &JobId) -> Result<(), SyncError> {
        self.require_role(Role::Recruiter)?;
        let stores = self.lock();
        let job = stores
            .jobs
            .get_by_id(id)
            .ok_or_else(|| SyncError::NotFound(format!("job {id}")))?;
        if job.owner != self.user.id {
            return Err(SyncError::Forbidden(format!("job {id} belongs to another recruiter")));
        }
        Ok(())
    }

    // ----- reads -------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        let stores = self.lock();
        Snapshot {
            jobs: stores.jobs.get_all(),
            applications: stores.applications.get_all(),
            notifications: stores.notifications.get_all(),
            saved_jobs: stores.saved_jobs.get_all(),
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.get_all()
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.lock().jobs.get_by_id(id).cloned()
    }

    pub fn applications(&self) -> Vec<Application> {
        self.lock().applications.get_all()
    }

    pub fn application(&self, id: &ApplicationId) -> Option<Application> {
        self.lock().applications.get_by_id(id).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.get_all()
    }

    /// Jobs the current user has saved, in saved order.
    pub fn saved_jobs(&self) -> Vec<Job> {
        let stores = self.lock();
        stores
            .saved_jobs
            .iter()
            .filter(|saved| saved.applicant_id == self.user.id)
            .filter_map(|saved| stores.jobs.get_by_id(&saved.job_id).cloned())
            .collect()
    }

    pub fn is_saved(&self, id: &JobId) -> bool {
        self.lock()
            .saved_jobs
            .contains(&(self.user.id.clone(), id.clone()))
    }

    pub fn collection_status(&self, collection: Collection) -> CollectionStatus {
        self.lock()
            .collections
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn job_query_outcome(&self, filter: &JobFilter) -> Outcome<Vec<Job>> {
        self.job_reads.outcome(&jobs_key(filter))
    }

    /// Stats for the signed-in recruiter, recomputed from the current stores.
    pub fn stats(&self) -> DerivedStats {
        self.stats_for(&self.user.id)
    }

    pub fn stats_for(&self, recruiter: &UserId) -> DerivedStats {
        let stores = self.lock();
        StatsAggregator::compute(
            recruiter,
            &stores.jobs,
            &stores.applications,
            &stores.notifications,
        )
    }

    /// Insert seed data. Only demo and test wiring calls this.
    pub fn apply_seed(&self, seed: &dyn SeedProvider) -> Result<SeedSummary, SeedError> {
        let jobs = seed.jobs()?;
        let notifications = seed.notifications()?;
        let mut stores = self.lock();
        let summary = SeedSummary {
            jobs: stores.jobs.upsert_many(jobs).inserted,
            notifications: stores.notifications.upsert_many(notifications).inserted,
        };
        info!(jobs = summary.jobs, notifications = summary.notifications, "seed data applied");
        Ok(summary)
    }

    // ----- collection fetches ------------------------------------------------

    /// `known` holds the active jobs the store had when an unfiltered listing was issued.
    /// Any of them missing from the listing was deleted or closed elsewhere.
    fn jobs_commit(&self, known: Option<HashSet<JobId>>) -> CommitHook<Vec<Job>> {
        self.hook(move |stores, result: &Result<Vec<Job>, SyncError>| {
            if let Ok(jobs) = result {
                stores.jobs.upsert_many(jobs.iter().cloned());
                if let Some(known) = known {
                    let listed: HashSet<&JobId> = jobs.iter().map(|job| &job.id).collect();
                    for id in known.iter().filter(|id| !listed.contains(id)) {
                        CrossResourceSynchronizer::<D>::remove_job(stores, id);
                    }
                }
            }
            stores.settle(Collection::Jobs, result);
        })
    }

    fn issue_jobs(&self, filter: JobFilter, force: bool) -> InFlight<Vec<Job>> {
        let known = {
            let mut stores = self.lock();
            stores.mark_loading(Collection::Jobs);
            filter.is_unfiltered().then(|| {
                stores
                    .jobs
                    .iter()
                    .filter(|job| job.status == JobStatus::Active)
                    .map(|job| job.id.clone())
                    .collect::<HashSet<_>>()
            })
        };
        let api = Arc::clone(&self.api);
        let key = jobs_key(&filter);
        let operation = move || async move { api.list_jobs(&filter).await };
        if force {
            self.job_reads.reissue(key, operation, Some(self.jobs_commit(known)))
        } else {
            self.job_reads.execute_with(key, operation, self.jobs_commit(known))
        }
    }

    /// `GET /jobs`; concurrent calls with an equal filter share one request. An
    /// unfiltered listing also drops active jobs the server no longer lists.
    pub async fn fetch_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, SyncError> {
        self.issue_jobs(filter, false).await
    }

    /// Force a fresh `GET /jobs` even if one is pending; the older response is dropped.
    pub async fn refresh_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, SyncError> {
        self.issue_jobs(filter, true).await
    }

    /// Recruiters fetch applications to their jobs, seekers their own.
    pub async fn fetch_applications(&self) -> Result<Vec<Application>, SyncError> {
        self.lock().mark_loading(Collection::Applications);
        let api = Arc::clone(&self.api);
        let recruiter = self.user.is_recruiter();
        let key = if recruiter {
            RequestKey::new("fetchApplications", "recruiter")
        } else {
            RequestKey::new("fetchApplications", "mine")
        };
        let commit = self.hook(|stores, result: &Result<Vec<ApplicationRecord>, SyncError>| {
            if let Ok(records) = result {
                CrossResourceSynchronizer::<D>::merge_applications(stores, records.iter().cloned());
            }
            stores.settle(Collection::Applications, result);
        });
        let records = self
            .application_reads
            .execute_with(
                key,
                move || async move {
                    if recruiter {
                        api.recruiter_applications().await
                    } else {
                        api.my_applications().await
                    }
                },
                commit,
            )
            .await?;
        Ok(records.into_iter().map(|record| record.application).collect())
    }

    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, SyncError> {
        self.lock().mark_loading(Collection::Notifications);
        let api = Arc::clone(&self.api);
        let commit = self.hook(|stores, result: &Result<Vec<Notification>, SyncError>| {
            if let Ok(notifications) = result {
                stores.notifications.upsert_many(notifications.iter().cloned());
            }
            stores.settle(Collection::Notifications, result);
        });
        self.notification_reads
            .execute_with(
                RequestKey::new("fetchNotifications", "all"),
                move || async move { api.notifications().await },
                commit,
            )
            .await
    }

    pub async fn fetch_saved_jobs(&self) -> Result<Vec<Job>, SyncError> {
        self.require_role(Role::JobSeeker)?;
        self.lock().mark_loading(Collection::SavedJobs);
        let api = Arc::clone(&self.api);
        let user = self.user.id.clone();
        let commit = self.hook(move |stores, result: &Result<Vec<Job>, SyncError>| {
            if let Ok(jobs) = result {
                CrossResourceSynchronizer::<D>::merge_saved_jobs(stores, &user, jobs.clone());
            }
            stores.settle(Collection::SavedJobs, result);
        });
        self.job_reads
            .execute_with(
                RequestKey::new("fetchSavedJobs", "all"),
                move || async move { api.saved_jobs().await },
                commit,
            )
            .await
    }

    /// Fetch every collection concurrently. One collection failing leaves the others
    /// (and its own previous contents) intact.
    pub async fn refresh_all(&self) -> SyncReport {
        let seeker = self.user.role == Role::JobSeeker;
        let saved = async {
            if seeker {
                Some(self.fetch_saved_jobs().await.map(|jobs| jobs.len()))
            } else {
                None
            }
        };
        let (jobs, applications, notifications, saved_jobs) = tokio::join!(
            self.fetch_jobs(JobFilter::default()),
            self.fetch_applications(),
            self.fetch_notifications(),
            saved,
        );
        let report = SyncReport {
            jobs: jobs.map(|jobs| jobs.len()),
            applications: applications.map(|apps| apps.len()),
            notifications: notifications.map(|items| items.len()),
            saved_jobs,
        };
        info!(failures = report.failures().len(), "refresh finished");
        report
    }

    pub async fn fetch_remote_stats(&self) -> Result<RemoteStats, SyncError> {
        self.require_role(Role::Recruiter)?;
        self.api.recruiter_stats(&self.user.id).await
    }

    // ----- job mutations -----------------------------------------------------

    pub async fn post_job(&self, draft: JobDraft) -> Result<Job, SyncError> {
        self.require_role(Role::Recruiter)?;
        let api = Arc::clone(&self.api);
        let commit = self.hook(|stores, result: &Result<Job, SyncError>| {
            if let Ok(job) = result {
                stores.jobs.upsert(job.clone());
            }
        });
        self.job_writes
            .execute_with(
                RequestKey::new("postJob", uuid::Uuid::new_v4()),
                move || async move { api.create_job(&draft).await },
                commit,
            )
            .await
    }

    pub async fn update_job(&self, id: &JobId, draft: JobDraft) -> Result<Job, SyncError> {
        self.require_owner(id)?;
        let api = Arc::clone(&self.api);
        let job_id = id.clone();
        let commit = self.hook(|stores, result: &Result<Job, SyncError>| {
            if let Ok(job) = result {
                stores.jobs.upsert(job.clone());
            }
        });
        self.job_writes
            .reissue(
                RequestKey::new("updateJob", id),
                move || async move { api.update_job(&job_id, &draft).await },
                Some(commit),
            )
            .await
    }

    /// Delete an owned job. Saved references go with it; applications remain.
    pub async fn delete_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.require_owner(id)?;
        let api = Arc::clone(&self.api);
        let job_id = id.clone();
        let removed = id.clone();
        let commit = self.hook(move |stores, result: &Result<(), SyncError>| {
            if result.is_ok() {
                CrossResourceSynchronizer::<D>::remove_job(stores, &removed);
            }
        });
        self.acks
            .execute_with(
                RequestKey::new("deleteJob", id),
                move || async move { api.delete_job(&job_id).await },
                commit,
            )
            .await
    }

    // ----- applications ------------------------------------------------------

    /// Apply to a job. A second application for the same job, whether already stored
    /// or still in flight, is rejected rather than merged.
    pub async fn apply(
        &self,
        job_id: &JobId,
        draft: ApplicationDraft,
    ) -> Result<Application, SyncError> {
        self.require_role(Role::JobSeeker)?;
        {
            let mut stores = self.lock();
            let already = stores
                .applications
                .iter()
                .any(|app| &app.job_id == job_id && app.applicant_id == self.user.id);
            if already || !stores.applies_in_flight.insert(job_id.clone()) {
                return Err(SyncError::DuplicateApplication(job_id.clone()));
            }
        }

        let api = Arc::clone(&self.api);
        let target = job_id.clone();
        let pending = job_id.clone();
        let commit = self.hook(move |stores, result: &Result<ApplicationRecord, SyncError>| {
            stores.applies_in_flight.remove(&pending);
            if let Ok(record) = result {
                CrossResourceSynchronizer::<D>::merge_applications(
                    stores,
                    std::iter::once(record.clone()),
                );
            }
        });
        let record = self
            .application_writes
            .execute_with(
                RequestKey::new("apply", job_id),
                move || async move { api.apply(&target, &draft).await },
                commit,
            )
            .await?;
        Ok(self
            .application(&record.application.id)
            .unwrap_or(record.application))
    }

    /// Move an application along the status DAG.
    ///
    /// Illegal edges fail with [`SyncError::InvalidTransition`] before any network
    /// call. A remote failure rolls an optimistic write back to the prior status and
    /// emits nothing; the server's refusal surfaces as [`SyncError::RemoteRejected`].
    pub async fn transition(
        &self,
        id: &ApplicationId,
        target: ApplicationStatus,
    ) -> Result<Application, SyncError> {
        let change = {
            let mut stores = self.lock();
            self.synchronizer.prepare(&mut stores, &self.user, id, target)?
        };
        debug!(application_id = %id, from = %change.from, to = %target, "transition prepared");

        let api = Arc::clone(&self.api);
        let synchronizer = self.synchronizer.clone();
        let application_id = id.clone();
        let optimistic = synchronizer.mode() == TransitionMode::Optimistic;
        let commit = self.hook(move |stores, result: &Result<ApplicationRecord, SyncError>| {
            match result {
                Ok(record) => {
                    synchronizer.commit(stores, &change, record);
                }
                Err(err) => synchronizer.rollback(stores, &change, err),
            }
        });
        self.application_writes
            .execute_with(
                RequestKey::new("transition", id),
                move || async move {
                    api.update_application_status(&application_id, target)
                        .await
                        .map_err(|err| if optimistic { err.into_rejection() } else { err })
                },
                commit,
            )
            .await?;

        self.application(id)
            .ok_or_else(|| SyncError::NotFound(format!("application {id}")))
    }

    // ----- saved jobs --------------------------------------------------------

    /// Idempotent: saving a saved job is a no-op without a network call.
    pub async fn save_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.require_role(Role::JobSeeker)?;
        if self.is_saved(id) {
            return Ok(());
        }
        let api = Arc::clone(&self.api);
        let job_id = id.clone();
        let saved = SavedJob {
            applicant_id: self.user.id.clone(),
            job_id: id.clone(),
        };
        let commit = self.hook(move |stores, result: &Result<(), SyncError>| {
            if result.is_ok() {
                stores.saved_jobs.upsert(saved);
            }
        });
        self.acks
            .execute_with(
                RequestKey::new("saveJob", id),
                move || async move { api.save_job(&job_id).await },
                commit,
            )
            .await
    }

    /// Idempotent: removing an unsaved job is a no-op without a network call.
    pub async fn unsave_job(&self, id: &JobId) -> Result<(), SyncError> {
        self.require_role(Role::JobSeeker)?;
        if !self.is_saved(id) {
            return Ok(());
        }
        let api = Arc::clone(&self.api);
        let job_id = id.clone();
        let key = (self.user.id.clone(), id.clone());
        let commit = self.hook(move |stores, result: &Result<(), SyncError>| {
            if result.is_ok() {
                stores.saved_jobs.remove(&key);
            }
        });
        self.acks
            .execute_with(
                RequestKey::new("unsaveJob", id),
                move || async move { api.unsave_job(&job_id).await },
                commit,
            )
            .await
    }

    // ----- notifications -----------------------------------------------------

    /// Mark one notification read. Read never reverts, so an already-read notification
    /// and concurrent marks for the same id are no-ops. Locally generated notifications
    /// are flipped in place without a request.
    pub async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        let already_read = {
            let mut stores = self.lock();
            let notification = stores
                .notifications
                .get_by_id(id)
                .ok_or_else(|| SyncError::NotFound(format!("notification {id}")))?;
            if !notification.read && id.is_local() {
                flip_read(&mut stores, id);
                debug!(notification_id = %id, "local notification marked read");
                return Ok(());
            }
            notification.read
        };
        if already_read {
            return Ok(());
        }

        let api = Arc::clone(&self.api);
        let notification_id = id.clone();
        let target = id.clone();
        let commit = self.hook(move |stores, result: &Result<(), SyncError>| {
            if result.is_ok() {
                flip_read(stores, &target);
            }
        });
        self.acks
            .execute_with(
                RequestKey::new("markRead", id),
                move || async move { api.mark_notification_read(&notification_id).await },
                commit,
            )
            .await
    }

    /// Mark every unread notification read; returns how many were marked. Local flips
    /// stay in place even when a server mark fails, and the first failure is returned.
    pub async fn mark_all_read(&self) -> Result<usize, SyncError> {
        let unread: Vec<NotificationId> = self
            .lock()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.clone())
            .collect();

        let results = join_all(unread.iter().map(|id| self.mark_notification_read(id))).await;
        let mut marked = 0;
        for result in results {
            result?;
            marked += 1;
        }
        Ok(marked)
    }
}

fn flip_read(stores: &mut StoreSet, id: &NotificationId) {
    if let Some(notification) = stores.notifications.get_by_id(id) {
        let read = Notification {
            read: true,
            ..notification.clone()
        };
        stores.notifications.replace_one(read);
    }
}

fn jobs_key(filter: &JobFilter) -> RequestKey {
    let query = filter
        .query_pairs()
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    RequestKey::new("fetchJobs", query)
}
