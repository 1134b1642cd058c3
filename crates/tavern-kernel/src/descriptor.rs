//! Module descriptor: the static contract a feature module registers with.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tavern_core::error::{Result, TavernError};
use tavern_core::events::{EventKind, PlatformEvent};

use crate::context::PluginContext;

/// `initialize` / `shutdown` hook.
pub type LifecycleHook = Arc<dyn Fn(PluginContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Handler for one event kind.
pub type EventHandler =
    Arc<dyn Fn(PluginContext, PlatformEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A command a module exposes to tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
}

/// Identity, declared capabilities and hooks of a feature module.
///
/// Built with the chained setters; the registry validates it on `register`.
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    /// Declared subscriptions. `None` is treated as empty.
    pub events: Option<Vec<EventKind>>,
    /// Declared commands. `None` is treated as empty.
    pub commands: Option<Vec<CommandSpec>>,
    pub enabled_by_default: bool,
    pub initialize: Option<LifecycleHook>,
    pub shutdown: Option<LifecycleHook>,
    handlers: HashMap<EventKind, EventHandler>,
}

impl ModuleDescriptor {
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            events: None,
            commands: None,
            enabled_by_default: false,
            initialize: None,
            shutdown: None,
            handlers: HashMap::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.commands.get_or_insert_with(Vec::new).push(CommandSpec {
            name: name.to_string(),
            description: description.to_string(),
        });
        self
    }

    pub fn on_initialize<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.initialize = Some(Arc::new(move |ctx: PluginContext| hook(ctx).boxed()));
        self
    }

    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.shutdown = Some(Arc::new(move |ctx: PluginContext| hook(ctx).boxed()));
        self
    }

    /// Subscribe to `kind` with `handler`. A later call for the same kind
    /// replaces the earlier handler.
    pub fn subscribe<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(PluginContext, PlatformEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let events = self.events.get_or_insert_with(Vec::new);
        if !events.contains(&kind) {
            events.push(kind);
        }
        self.handlers
            .insert(kind, Arc::new(move |ctx: PluginContext, event: PlatformEvent| {
                handler(ctx, event).boxed()
            }));
        self
    }

    pub fn subscribes_to(&self, kind: EventKind) -> bool {
        self.events.as_ref().is_some_and(|events| events.contains(&kind))
    }

    pub fn handler(&self, kind: EventKind) -> Option<&EventHandler> {
        self.handlers.get(&kind)
    }

    pub fn event_kinds(&self) -> &[EventKind] {
        self.events.as_deref().unwrap_or_default()
    }

    pub fn command_specs(&self) -> &[CommandSpec] {
        self.commands.as_deref().unwrap_or_default()
    }

    /// Check required fields and normalize absent lists to empty.
    pub(crate) fn validate(&mut self) -> Result<()> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id".to_string());
        }
        if self.name.trim().is_empty() {
            missing.push("name".to_string());
        }
        if self.version.trim().is_empty() {
            missing.push("version".to_string());
        }
        if self.initialize.is_none() {
            missing.push("initialize".to_string());
        }
        if self.shutdown.is_none() {
            missing.push("shutdown".to_string());
        }

        let events = self.events.get_or_insert_with(Vec::new);
        for kind in events.iter() {
            if !self.handlers.contains_key(kind) {
                missing.push(format!("handler for {kind}"));
            }
        }
        for kind in self.handlers.keys() {
            if !events.contains(kind) {
                missing.push(format!("subscription for {kind}"));
            }
        }
        self.commands.get_or_insert_with(Vec::new);

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TavernError::ContractViolation {
                module: if self.id.is_empty() { "<unnamed>".into() } else { self.id.clone() },
                missing,
            })
        }
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("events", &self.events)
            .field("commands", &self.commands)
            .field("enabled_by_default", &self.enabled_by_default)
            .field("initialize", &self.initialize.is_some())
            .field("shutdown", &self.shutdown.is_some())
            .finish()
    }
}
