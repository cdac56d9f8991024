use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::domain::{
    Application, ApplicationId, Job, JobId, Notification, NotificationId, SavedJob, UserId,
};

/// Something a [`ResourceStore`] can hold.
pub trait Entity: Clone {
    type Id: Clone + Eq + Hash + fmt::Debug;

    fn id(&self) -> Self::Id;

    /// Merge an incoming copy over the stored one. Must be idempotent:
    /// `a.reconcile(b).reconcile(b) == a.reconcile(b)`.
    fn reconcile(&self, incoming: Self) -> Self {
        incoming
    }
}

impl Entity for Job {
    type Id = JobId;

    fn id(&self) -> JobId {
        self.id.clone()
    }
}

impl Entity for Application {
    type Id = ApplicationId;

    fn id(&self) -> ApplicationId {
        self.id.clone()
    }

    /// Job, applicant, and applied date are fixed at creation. Status only moves
    /// downstream; a copy carrying an upstream status is a stale read.
    fn reconcile(&self, incoming: Self) -> Self {
        let status = if self.status.reaches(incoming.status) {
            incoming.status
        } else {
            self.status
        };
        Application {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            applicant_id: self.applicant_id.clone(),
            job_owner: incoming.job_owner.or_else(|| self.job_owner.clone()),
            status,
            applied_at: self.applied_at.or(incoming.applied_at),
            cover_letter: incoming.cover_letter,
            expected_salary: incoming.expected_salary,
            experience: incoming.experience,
        }
    }
}

impl Entity for Notification {
    type Id = NotificationId;

    fn id(&self) -> NotificationId {
        self.id.clone()
    }

    fn reconcile(&self, incoming: Self) -> Self {
        Notification {
            read: self.read || incoming.read,
            ..incoming
        }
    }
}

impl Entity for SavedJob {
    type Id = (UserId, JobId);

    fn id(&self) -> (UserId, JobId) {
        (self.applicant_id.clone(), self.job_id.clone())
    }
}

/// Counts reported by [`ResourceStore::upsert_many`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Normalized in-memory collection keyed by entity id, listing in first-seen order.
#[derive(Debug, Clone)]
pub struct ResourceStore<T: Entity> {
    entries: HashMap<T::Id, T>,
    order: Vec<T::Id>,
}

impl<T: Entity> Default for ResourceStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Entity> ResourceStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unseen ids at the end, reconcile known ids in place.
    pub fn upsert_many<I>(&mut self, entities: I) -> UpsertSummary
    where
        I: IntoIterator<Item = T>,
    {
        let mut summary = UpsertSummary::default();
        for entity in entities {
            let id = entity.id();
            match self.entries.get_mut(&id) {
                Some(existing) => {
                    *existing = existing.reconcile(entity);
                    summary.updated += 1;
                }
                None => {
                    self.order.push(id.clone());
                    self.entries.insert(id, entity);
                    summary.inserted += 1;
                }
            }
        }
        summary
    }

    pub fn upsert(&mut self, entity: T) -> UpsertSummary {
        self.upsert_many(std::iter::once(entity))
    }

    /// Overwrite without reconciling. Used for local writes and rollbacks where the
    /// caller is the authority on the new value.
    pub fn replace_one(&mut self, entity: T) -> Option<T> {
        let id = entity.id();
        match self.entries.insert(id.clone(), entity) {
            Some(previous) => Some(previous),
            None => {
                self.order.push(id);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    /// Drop every entity the predicate rejects; returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.order.len();
        let entries = &mut self.entries;
        self.order.retain(|id| {
            let kept = entries.get(id).map_or(false, &mut keep);
            if !kept {
                entries.remove(id);
            }
            kept
        });
        before - self.order.len()
    }

    pub fn get_by_id(&self, id: &T::Id) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.entries.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Ordered snapshot detached from later mutation.
    pub fn get_all(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
