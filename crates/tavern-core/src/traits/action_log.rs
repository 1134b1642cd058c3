//! Audit sink for actions taken on behalf of tenants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tenant_id: String,
    /// Module id, or "orchestrator".
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub details: Option<String>,
    pub at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(tenant_id: &str, actor: &str, action: &str, details: Option<String>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor: actor.to_string(),
            action: action.to_string(),
            details,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn record(&self, record: ActionRecord) -> Result<()>;
}

/// Emits each record as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActionLog;

#[async_trait]
impl ActionLog for TracingActionLog {
    async fn record(&self, record: ActionRecord) -> Result<()> {
        tracing::info!(
            target: "tavern::audit",
            tenant = %record.tenant_id,
            actor = %record.actor,
            action = %record.action,
            details = record.details.as_deref().unwrap_or(""),
            "📝 audit"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryActionLog {
    records: Mutex<Vec<ActionRecord>>,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ActionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ActionLog for MemoryActionLog {
    async fn record(&self, record: ActionRecord) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_log_keeps_order() {
        let log = MemoryActionLog::new();
        log.record(ActionRecord::new("g1", "orchestrator", "a", None)).await.unwrap();
        log.record(ActionRecord::new("g1", "contest", "b", Some("x".into()))).await.unwrap();
        let records = log.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "a");
        assert_eq!(records[1].details.as_deref(), Some("x"));
    }
}
