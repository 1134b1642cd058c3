//! # Tavern Kernel
//!
//! Feature modules ("plugins") are described by a [`ModuleDescriptor`]:
//! identity, lifecycle hooks, declared commands and an explicit map from
//! event kind to handler. The [`ModuleRegistry`] validates and stores
//! descriptors and tracks which modules are enabled; the
//! [`EventDispatcher`] fans an inbound event out to every enabled
//! subscriber, one at a time, isolating failures per module.
//!
//! ```text
//! PlatformEvent ─▶ EventDispatcher ─▶ registry.enabled_handlers(kind)
//!                                        ├── module A handler ✅
//!                                        ├── module B handler ❌ (logged, skipped)
//!                                        └── module C handler ✅
//! ```

pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod registry;

pub use context::PluginContext;
pub use descriptor::{CommandSpec, EventHandler, LifecycleHook, ModuleDescriptor};
pub use dispatch::{DispatchReport, EventDispatcher};
pub use registry::ModuleRegistry;
