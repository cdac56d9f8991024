use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Application, ApplicationStatus, Job, Notification, UserId};
use super::store::ResourceStore;

/// Counters derived from the current stores. Never cached; see [`StatsAggregator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedStats {
    pub active_jobs: usize,
    pub candidates: usize,
    pub success_rate: f64,
    pub unread_notifications: usize,
    pub status_breakdown: BTreeMap<ApplicationStatus, usize>,
}

/// Pure functions over store snapshots. Holds no state, so it cannot drift from the
/// stores it reads.
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn active_jobs(recruiter: &UserId, jobs: &ResourceStore<Job>) -> usize {
        jobs.iter().filter(|job| &job.owner == recruiter).count()
    }

    pub fn candidates(
        recruiter: &UserId,
        jobs: &ResourceStore<Job>,
        applications: &ResourceStore<Application>,
    ) -> usize {
        Self::recruiter_applications(recruiter, jobs, applications).count()
    }

    /// Accepted share of the recruiter's candidates in percent; `0.0` when there are none.
    pub fn success_rate(
        recruiter: &UserId,
        jobs: &ResourceStore<Job>,
        applications: &ResourceStore<Application>,
    ) -> f64 {
        let (total, accepted) = Self::recruiter_applications(recruiter, jobs, applications)
            .fold((0usize, 0usize), |(total, accepted), app| {
                let hit = usize::from(app.status == ApplicationStatus::Accepted);
                (total + 1, accepted + hit)
            });
        if total == 0 {
            return 0.0;
        }
        accepted as f64 / total as f64 * 100.0
    }

    pub fn unread_notifications(notifications: &ResourceStore<Notification>) -> usize {
        notifications.iter().filter(|n| !n.read).count()
    }

    pub fn status_breakdown(
        recruiter: &UserId,
        jobs: &ResourceStore<Job>,
        applications: &ResourceStore<Application>,
    ) -> BTreeMap<ApplicationStatus, usize> {
        let mut breakdown: BTreeMap<ApplicationStatus, usize> = ApplicationStatus::ALL
            .iter()
            .map(|status| (*status, 0))
            .collect();
        for app in Self::recruiter_applications(recruiter, jobs, applications) {
            *breakdown.entry(app.status).or_default() += 1;
        }
        breakdown
    }

    pub fn compute(
        recruiter: &UserId,
        jobs: &ResourceStore<Job>,
        applications: &ResourceStore<Application>,
        notifications: &ResourceStore<Notification>,
    ) -> DerivedStats {
        DerivedStats {
            active_jobs: Self::active_jobs(recruiter, jobs),
            candidates: Self::candidates(recruiter, jobs, applications),
            success_rate: Self::success_rate(recruiter, jobs, applications),
            unread_notifications: Self::unread_notifications(notifications),
            status_breakdown: Self::status_breakdown(recruiter, jobs, applications),
        }
    }

    /// Applications whose job belongs to `recruiter`. The live job store wins; the
    /// owner captured at ingestion covers jobs deleted since.
    fn recruiter_applications<'a>(
        recruiter: &'a UserId,
        jobs: &'a ResourceStore<Job>,
        applications: &'a ResourceStore<Application>,
    ) -> impl Iterator<Item = &'a Application> + 'a {
        applications.iter().filter(move |app| {
            let owner = jobs
                .get_by_id(&app.job_id)
                .map(|job| &job.owner)
                .or(app.job_owner.as_ref());
            owner == Some(recruiter)
        })
    }
}
