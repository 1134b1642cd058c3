//! # Tavern Scheduler
//! Watchdog orchestration for multi-tenant chat campaigns.
//!
//! Campaigns move along a fixed state machine. Stable states wait for the
//! calendar or an administrator, in-flight states wait for the
//! [`WorkflowOrchestrator`] to perform their side effects on the platform.
//! Progress is always persisted before the next step starts, so a restart
//! resumes where it stopped.

pub mod engine;
pub mod executors;
pub mod persistence;
pub mod retry;
pub mod schedule;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{TickReport, WorkflowOrchestrator};
pub use executors::Executors;
pub use persistence::SqliteStore;
pub use retry::{FailureVerdict, RetryStats, RetryTracker};
pub use schedule::scheduled_transition;
pub use store::MemoryStore;
