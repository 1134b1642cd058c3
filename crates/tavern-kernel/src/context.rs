//! Services handed to a module at `initialize` and on every event.

use std::sync::Arc;

use tavern_core::traits::{ActionLog, ActionRecord, PlatformOps, WorkflowStore};

/// Dependencies injected into modules.
#[derive(Clone)]
pub struct PluginContext {
    store: Arc<dyn WorkflowStore>,
    platform: Arc<dyn PlatformOps>,
    action_log: Arc<dyn ActionLog>,
    module_id: Option<String>,
}

impl PluginContext {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        platform: Arc<dyn PlatformOps>,
        action_log: Arc<dyn ActionLog>,
    ) -> Self {
        Self {
            store,
            platform,
            action_log,
            module_id: None,
        }
    }

    /// A copy of this context scoped to one module.
    pub fn for_module(&self, module_id: &str) -> Self {
        Self {
            module_id: Some(module_id.to_string()),
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn platform(&self) -> &Arc<dyn PlatformOps> {
        &self.platform
    }

    pub fn action_log(&self) -> &Arc<dyn ActionLog> {
        &self.action_log
    }

    pub fn module_id(&self) -> &str {
        self.module_id.as_deref().unwrap_or("kernel")
    }

    /// The module's logger: a span every event it emits is nested under.
    /// The dispatcher fills in `event` per invocation.
    pub fn logger(&self) -> tracing::Span {
        tracing::info_span!("module", id = %self.module_id(), event = tracing::field::Empty)
    }

    /// Record an audit entry as this module. Failures are logged, not returned.
    pub async fn audit(&self, tenant_id: &str, action: &str, details: Option<String>) {
        let record = ActionRecord::new(tenant_id, self.module_id(), action, details);
        if let Err(e) = self.action_log.record(record).await {
            tracing::warn!("⚠️ Failed to write audit record '{}': {e}", action);
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("module_id", &self.module_id)
            .finish_non_exhaustive()
    }
}
