//! Event Dispatcher: routes one inbound event to every enabled subscriber.
//!
//! Handlers run sequentially in registration order, each awaited before the
//! next starts. A handler error or panic is logged with the module id and
//! event kind and never stops the fan-out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tavern_core::events::{EventKind, PlatformEvent};
use tracing::Instrument;

use crate::registry::ModuleRegistry;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Modules whose handler completed successfully.
    pub delivered: Vec<String>,
    /// Modules whose handler returned an error or panicked.
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn invoked(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<ModuleRegistry>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, event: PlatformEvent) -> DispatchReport {
        let kind = event.kind();
        let handlers = self.registry.enabled_handlers(kind).await;
        let mut report = DispatchReport::default();

        if handlers.is_empty() {
            tracing::debug!("📭 No enabled module subscribes to {}", kind);
            return report;
        }

        for (module_id, handler) in handlers {
            let ctx = self.registry.context().for_module(&module_id);
            let span = ctx.logger();
            span.record("event", kind.as_str());
            let outcome = AssertUnwindSafe(handler(ctx, event.clone()).instrument(span))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => report.delivered.push(module_id),
                Ok(Err(e)) => {
                    log_failure(&module_id, kind, &e.to_string());
                    report.failed.push(module_id);
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    log_failure(&module_id, kind, &format!("panicked: {reason}"));
                    report.failed.push(module_id);
                }
            }
        }

        report
    }
}

fn log_failure(module_id: &str, kind: EventKind, reason: &str) {
    tracing::error!(
        module = module_id,
        event = %kind,
        "❌ Module {} failed handling {}: {}",
        module_id,
        kind,
        reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleDescriptor;
    use crate::testing::test_context;
    use std::sync::Mutex;
    use tavern_core::error::TavernError;
    use tavern_core::events::{MemberEvent, ReactionEvent};

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recording_module(id: &str, calls: &Calls, fail: bool) -> ModuleDescriptor {
        let calls = calls.clone();
        let module_id = id.to_string();
        ModuleDescriptor::new(id, id, "1.0.0")
            .on_initialize(|_| async { Ok(()) })
            .on_shutdown(|_| async { Ok(()) })
            .subscribe(EventKind::MemberJoin, move |_, _| {
                let calls = calls.clone();
                let module_id = module_id.clone();
                async move {
                    calls.lock().unwrap().push(module_id.clone());
                    if fail {
                        Err(TavernError::module(format!("{module_id} exploded")))
                    } else {
                        Ok(())
                    }
                }
            })
    }

    fn explode() -> tavern_core::error::Result<()> {
        panic!("handler bug")
    }

    fn join_event() -> PlatformEvent {
        PlatformEvent::MemberJoin(MemberEvent {
            tenant_id: "g1".into(),
            member_id: "u1".into(),
        })
    }

    async fn registry_with(modules: Vec<ModuleDescriptor>) -> Arc<ModuleRegistry> {
        let reg = Arc::new(ModuleRegistry::new(test_context()));
        for m in modules {
            let id = m.id.clone();
            reg.register(m).await.unwrap();
            reg.enable(&id).await.unwrap();
        }
        reg
    }

    #[tokio::test]
    async fn test_failing_module_does_not_stop_others() {
        let calls: Calls = Arc::default();
        let reg = registry_with(vec![
            recording_module("a", &calls, false),
            recording_module("b", &calls, true),
            recording_module("c", &calls, false),
        ])
        .await;

        let report = EventDispatcher::new(reg).dispatch(join_event()).await;
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(report.delivered, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(report.failed, vec!["b".to_string()]);
        assert_eq!(report.invoked(), 3);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let calls: Calls = Arc::default();
        let panicky = ModuleDescriptor::new("p", "p", "1.0.0")
            .on_initialize(|_| async { Ok(()) })
            .on_shutdown(|_| async { Ok(()) })
            .subscribe(EventKind::MemberJoin, |_, _| async { explode() });
        let reg = registry_with(vec![panicky, recording_module("after", &calls, false)]).await;

        let report = EventDispatcher::new(reg).dispatch(join_event()).await;
        assert_eq!(report.failed, vec!["p".to_string()]);
        assert_eq!(report.delivered, vec!["after".to_string()]);
    }

    #[tokio::test]
    async fn test_skips_disabled_and_unsubscribed() {
        let calls: Calls = Arc::default();
        let reg = registry_with(vec![recording_module("on", &calls, false)]).await;
        reg.register(recording_module("off", &calls, false)).await.unwrap();

        let dispatcher = EventDispatcher::new(reg.clone());
        let report = dispatcher.dispatch(join_event()).await;
        assert_eq!(report.delivered, vec!["on".to_string()]);

        let reaction = PlatformEvent::ReactionAdd(ReactionEvent {
            tenant_id: "g1".into(),
            channel_id: "c1".into(),
            message_id: "m1".into(),
            participant_id: "u1".into(),
            marker: "⭐".into(),
            participant_is_bot: false,
        });
        let report = dispatcher.dispatch(reaction).await;
        assert_eq!(report.invoked(), 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_disable_module() {
        let calls: Calls = Arc::default();
        let reg = registry_with(vec![recording_module("flaky", &calls, true)]).await;
        let dispatcher = EventDispatcher::new(reg.clone());
        dispatcher.dispatch(join_event()).await;
        dispatcher.dispatch(join_event()).await;
        assert!(reg.is_enabled("flaky").await);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }
}
