//! Scheduled broadcast replay.
//!
//! This crate provides:
//! - ScheduledQueue: ordered, deduplicated in-memory queue of due broadcasts
//! - BroadcastScheduler: poller and releaser tasks around that queue
//! - BroadcastExecutor: rebuilds a persisted request and re-enters the pipeline
//! - DirectoryStore: JSON-file store for running the scheduler locally

mod directory;
mod error;
mod executor;
mod queue;
mod scheduler;
mod store;

pub use directory::{BroadcastRecord, DirectoryStore};
pub use error::{ReplayError, ReplayResult, StoreError, StoreResult};
pub use executor::{BroadcastExecutor, ExecuteBroadcast};
pub use queue::ScheduledQueue;
pub use scheduler::{BroadcastScheduler, SchedulerHandle};
pub use store::{due_window, BroadcastStore, ReplaySource};
