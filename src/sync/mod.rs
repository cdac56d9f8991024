//! Client-side resource synchronization: request lifecycles, normalized stores,
//! cross-resource consistency, and derived statistics.

pub mod dispatch;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod seed;
pub mod state;
pub mod stats;
pub mod store;
pub mod synchronizer;

pub use dispatch::{ChannelDispatcher, DispatchError, NoopDispatcher, NotificationDispatcher, SyncEvent};
pub use domain::*;
pub use error::SyncError;
pub use lifecycle::{Outcome, RequestKey, RequestLifecycle, Supersession};
pub use seed::{CsvJobSeed, DemoSeed, SeedError, SeedProvider, SeedSummary};
pub use state::{AppState, Collection, CollectionStatus, LoadPhase, Snapshot, SyncOptions, SyncReport};
pub use stats::{DerivedStats, StatsAggregator};
pub use store::{Entity, ResourceStore, UpsertSummary};
pub use synchronizer::{CrossResourceSynchronizer, StatusChange, TransitionMode};

#[cfg(test)]
mod tests;
