//! Boundary between committed state transitions and notification delivery.
//!
//! The synchronizer calls [`NotificationDispatcher::notify`] inside the same critical
//! section that commits a transition, so implementations must only enqueue. A failed
//! notify is logged and never rolls the transition back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::domain::{ApplicationId, ApplicationStatus, JobId, NotificationId};

/// Event emitted once per committed state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    ApplicationStatusChanged {
        application_id: ApplicationId,
        job_id: JobId,
        from: ApplicationStatus,
        to: ApplicationStatus,
        notification_id: NotificationId,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification channel closed")]
    Closed,
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, event: SyncEvent) -> Result<(), DispatchError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn notify(&self, _event: SyncEvent) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Forwards events to an unbounded tokio channel drained by the UI layer.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn notify(&self, event: SyncEvent) -> Result<(), DispatchError> {
        self.sender.send(event).map_err(|_| DispatchError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> SyncEvent {
        SyncEvent::ApplicationStatusChanged {
            application_id: ApplicationId::new("app-1"),
            job_id: JobId::new("job-1"),
            from: ApplicationStatus::Pending,
            to: ApplicationStatus::Shortlisted,
            notification_id: NotificationId::new("local-1"),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_dispatcher_delivers_events_in_order() {
        let (dispatcher, mut receiver) = ChannelDispatcher::new();
        dispatcher.notify(sample_event()).expect("channel open");

        let received = receiver.recv().await.expect("event delivered");
        assert!(matches!(
            received,
            SyncEvent::ApplicationStatusChanged {
                to: ApplicationStatus::Shortlisted,
                ..
            }
        ));
    }

    #[test]
    fn channel_dispatcher_reports_closed_receiver() {
        let (dispatcher, receiver) = ChannelDispatcher::new();
        drop(receiver);
        assert!(matches!(
            dispatcher.notify(sample_event()),
            Err(DispatchError::Closed)
        ));
    }
}
