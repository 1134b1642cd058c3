//! Module Registry: validates, stores and enables feature modules.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tavern_core::error::{Result, TavernError};
use tavern_core::events::EventKind;
use tokio::sync::{Mutex, RwLock};

use crate::context::PluginContext;
use crate::descriptor::{CommandSpec, EventHandler, ModuleDescriptor};

#[derive(Default)]
struct RegistryState {
    modules: HashMap<String, Arc<ModuleDescriptor>>,
    /// Registration order; dispatch follows it.
    order: Vec<String>,
    enabled: HashSet<String>,
}

impl RegistryState {
    fn ordered(&self, filter: impl Fn(&str) -> bool) -> Vec<Arc<ModuleDescriptor>> {
        self.order
            .iter()
            .filter(|id| filter(id.as_str()))
            .filter_map(|id| self.modules.get(id).cloned())
            .collect()
    }
}

/// Registry of all known modules and their enablement.
pub struct ModuleRegistry {
    state: RwLock<RegistryState>,
    /// Serializes enable/disable/unregister so hooks never run twice concurrently.
    lifecycle: Mutex<()>,
    context: PluginContext,
}

impl ModuleRegistry {
    pub fn new(context: PluginContext) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            lifecycle: Mutex::new(()),
            context,
        }
    }

    /// The context handed to module hooks and handlers.
    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Register a module. Default-enabled modules are marked enabled without
    /// running `initialize`.
    pub async fn register(&self, mut descriptor: ModuleDescriptor) -> Result<()> {
        descriptor.validate()?;

        let mut state = self.state.write().await;
        if state.modules.contains_key(&descriptor.id) {
            return Err(TavernError::DuplicateRegistration(descriptor.id));
        }

        let id = descriptor.id.clone();
        tracing::info!(
            "🧩 Registered module: {} v{} ({} events, {} commands)",
            id,
            descriptor.version,
            descriptor.event_kinds().len(),
            descriptor.command_specs().len()
        );
        if descriptor.enabled_by_default {
            state.enabled.insert(id.clone());
        }
        state.modules.insert(id.clone(), Arc::new(descriptor));
        state.order.push(id);
        Ok(())
    }

    /// Remove a module from the registry. Its shutdown hook is not run.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let mut state = self.state.write().await;
        if state.modules.remove(id).is_none() {
            return Err(TavernError::NotFound(format!("module {id}")));
        }
        state.order.retain(|m| m != id);
        if state.enabled.remove(id) {
            tracing::warn!("⚠️ Module {} unregistered while enabled", id);
        }
        tracing::info!("🧩 Unregistered module: {}", id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.state.read().await.modules.get(id).cloned()
    }

    /// All modules in registration order.
    pub async fn get_all(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.state.read().await.ordered(|_| true)
    }

    pub async fn get_enabled(&self) -> Vec<Arc<ModuleDescriptor>> {
        let state = self.state.read().await;
        state.ordered(|id| state.enabled.contains(id))
    }

    pub async fn get_disabled(&self) -> Vec<Arc<ModuleDescriptor>> {
        let state = self.state.read().await;
        state.ordered(|id| !state.enabled.contains(id))
    }

    pub async fn is_enabled(&self, id: &str) -> bool {
        self.state.read().await.enabled.contains(id)
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.modules.len()
    }

    /// Commands declared by enabled modules, as (module id, command).
    pub async fn commands(&self) -> Vec<(String, CommandSpec)> {
        self.get_enabled()
            .await
            .iter()
            .flat_map(|m| {
                m.command_specs()
                    .iter()
                    .map(|c| (m.id.clone(), c.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Handlers of enabled modules subscribed to `kind`, in registration order.
    pub async fn enabled_handlers(&self, kind: EventKind) -> Vec<(String, EventHandler)> {
        self.get_enabled()
            .await
            .iter()
            .filter(|m| m.subscribes_to(kind))
            .filter_map(|m| m.handler(kind).map(|h| (m.id.clone(), Arc::clone(h))))
            .collect()
    }

    /// Run the module's `initialize` hook, then mark it enabled.
    /// On failure the module stays disabled and the error is returned.
    pub async fn enable(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let module = {
            let state = self.state.read().await;
            let module = state
                .modules
                .get(id)
                .cloned()
                .ok_or_else(|| TavernError::NotFound(format!("module {id}")))?;
            if state.enabled.contains(id) {
                tracing::warn!("⚠️ Module {} is already enabled", id);
                return Ok(());
            }
            module
        };

        if let Some(initialize) = &module.initialize {
            if let Err(e) = initialize(self.context.for_module(id)).await {
                tracing::error!("❌ Module {} failed to initialize: {e}", id);
                return Err(e);
            }
        }

        self.state.write().await.enabled.insert(id.to_string());
        tracing::info!("✅ Module enabled: {}", id);
        Ok(())
    }

    /// Run the module's `shutdown` hook and mark it disabled. The module is
    /// disabled even when the hook fails; the failure is still returned.
    pub async fn disable(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let module = {
            let state = self.state.read().await;
            let module = state
                .modules
                .get(id)
                .cloned()
                .ok_or_else(|| TavernError::NotFound(format!("module {id}")))?;
            if !state.enabled.contains(id) {
                tracing::warn!("⚠️ Module {} is already disabled", id);
                return Ok(());
            }
            module
        };

        let result = match &module.shutdown {
            Some(shutdown) => shutdown(self.context.for_module(id)).await,
            None => Ok(()),
        };

        self.state.write().await.enabled.remove(id);
        match &result {
            Ok(()) => tracing::info!("⏹️ Module disabled: {}", id),
            Err(e) => tracing::error!("❌ Module {} shutdown failed (disabled anyway): {e}", id),
        }
        result
    }

    /// Disable every enabled module, newest first. Returns how many shutdown
    /// hooks failed.
    pub async fn shutdown_all(&self) -> usize {
        let mut enabled = self.get_enabled().await;
        enabled.reverse();
        let mut failures = 0;
        for module in enabled {
            if self.disable(&module.id).await.is_err() {
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn module(id: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(id, "Test Module", "1.0.0")
            .on_initialize(|_| async { Ok(()) })
            .on_shutdown(|_| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let reg = ModuleRegistry::new(test_context());
        reg.register(module("m")).await.unwrap();
        let err = reg.register(module("m")).await.unwrap_err();
        assert!(matches!(err, TavernError::DuplicateRegistration(ref id) if id == "m"));
        assert_eq!(reg.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_missing_shutdown() {
        let reg = ModuleRegistry::new(test_context());
        let desc = ModuleDescriptor::new("m", "Test", "1.0.0").on_initialize(|_| async { Ok(()) });
        let err = reg.register(desc).await.unwrap_err();
        match err {
            TavernError::ContractViolation { missing, .. } => {
                assert!(missing.contains(&"shutdown".to_string()))
            }
            other => panic!("expected contract violation, got {other:?}"),
        }
        assert_eq!(reg.count().await, 0);
    }

    #[tokio::test]
    async fn test_default_enabled_skips_initialize() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let desc = ModuleDescriptor::new("m", "Test", "1.0.0")
            .enabled_by_default(true)
            .on_initialize(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .on_shutdown(|_| async { Ok(()) });

        let reg = ModuleRegistry::new(test_context());
        reg.register(desc).await.unwrap();
        assert!(reg.is_enabled("m").await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Already enabled: no-op.
        reg.enable("m").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_unknown() {
        let reg = ModuleRegistry::new(test_context());
        assert!(matches!(reg.enable("ghost").await, Err(TavernError::NotFound(_))));
        assert!(matches!(reg.disable("ghost").await, Err(TavernError::NotFound(_))));
        assert!(matches!(reg.unregister("ghost").await, Err(TavernError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let reg = ModuleRegistry::new(test_context());
        reg.register(module("a")).await.unwrap();
        reg.register(module("b")).await.unwrap();
        assert_eq!(reg.get_disabled().await.len(), 2);

        reg.enable("b").await.unwrap();
        let enabled: Vec<_> = reg.get_enabled().await.iter().map(|m| m.id.clone()).collect();
        assert_eq!(enabled, vec!["b".to_string()]);

        reg.disable("b").await.unwrap();
        assert!(!reg.is_enabled("b").await);
        // Already disabled: silent no-op.
        reg.disable("b").await.unwrap();
        assert!(!reg.is_enabled("b").await);
    }

    #[tokio::test]
    async fn test_initialize_failure_keeps_disabled() {
        let desc = ModuleDescriptor::new("m", "Test", "1.0.0")
            .on_initialize(|_| async { Err(TavernError::module("no token")) })
            .on_shutdown(|_| async { Ok(()) });
        let reg = ModuleRegistry::new(test_context());
        reg.register(desc).await.unwrap();

        let err = reg.enable("m").await.unwrap_err();
        assert!(err.to_string().contains("no token"));
        assert!(!reg.is_enabled("m").await);
    }

    #[tokio::test]
    async fn test_shutdown_failure_still_disables() {
        let desc = ModuleDescriptor::new("m", "Test", "1.0.0")
            .on_initialize(|_| async { Ok(()) })
            .on_shutdown(|_| async { Err(TavernError::module("stuck")) });
        let reg = ModuleRegistry::new(test_context());
        reg.register(desc).await.unwrap();
        reg.enable("m").await.unwrap();

        assert!(reg.disable("m").await.is_err());
        assert!(!reg.is_enabled("m").await);
    }

    #[tokio::test]
    async fn test_initialize_receives_module_context() {
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = seen.clone();
        let desc = ModuleDescriptor::new("greeter", "Greeter", "1.0.0")
            .on_initialize(move |ctx| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = ctx.module_id().to_string();
                    Ok(())
                }
            })
            .on_shutdown(|_| async { Ok(()) });
        let reg = ModuleRegistry::new(test_context());
        reg.register(desc).await.unwrap();
        reg.enable("greeter").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), "greeter");
    }

    #[tokio::test]
    async fn test_unregister_removes_everywhere() {
        let reg = ModuleRegistry::new(test_context());
        reg.register(module("m")).await.unwrap();
        reg.enable("m").await.unwrap();
        reg.unregister("m").await.unwrap();
        assert!(reg.get("m").await.is_none());
        assert!(!reg.is_enabled("m").await);
        // Id is free again.
        reg.register(module("m")).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_all_and_commands() {
        let reg = ModuleRegistry::new(test_context());
        reg.register(module("a").command("ping", "Replies pong")).await.unwrap();
        reg.register(
            ModuleDescriptor::new("b", "B", "1.0.0")
                .on_initialize(|_| async { Ok(()) })
                .on_shutdown(|_| async { Err(TavernError::module("boom")) }),
        )
        .await
        .unwrap();
        reg.enable("a").await.unwrap();
        reg.enable("b").await.unwrap();

        let commands = reg.commands().await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "a");
        assert_eq!(commands[0].1.name, "ping");

        assert_eq!(reg.shutdown_all().await, 1);
        assert!(reg.get_enabled().await.is_empty());
    }
}
