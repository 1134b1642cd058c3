//! # Tavern Core
//!
//! Shared vocabulary for the Tavern workspace: the error type, configuration,
//! platform events, campaign entities and the collaborator contracts
//! (`WorkflowStore`, `PlatformOps`, `ActionLog`) the kernel and the
//! orchestrator are written against.
//!
//! ```text
//! tavern-core
//!   ├── error    TavernError + Result
//!   ├── config   TavernConfig (~/.tavern/config.toml)
//!   ├── types    Workflow, Submission, Vote, TenantSettings, permissions
//!   ├── events   EventKind, PlatformEvent
//!   └── traits   WorkflowStore, PlatformOps, ActionLog
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use config::TavernConfig;
pub use error::{Result, TavernError};
pub use events::{EventKind, PlatformEvent};
pub use traits::{ActionLog, ActionRecord, PlatformOps, WorkflowStore};
pub use types::{
    Permission, PermissionOverwrite, Submission, TenantSettings, Vote, VoteTally, Workflow,
    WorkflowStatus,
};
