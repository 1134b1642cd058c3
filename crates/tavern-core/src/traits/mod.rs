//! Contracts for the collaborators Tavern does not own: the persistence
//! layer, the chat platform client and the audit sink.

pub mod action_log;
pub mod platform;
pub mod store;

pub use action_log::{ActionLog, ActionRecord, MemoryActionLog, TracingActionLog};
pub use platform::PlatformOps;
pub use store::WorkflowStore;
