//! Test doubles shared by the scheduler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tavern_core::error::{Result, TavernError};
use tavern_core::traits::PlatformOps;
use tavern_core::types::PermissionOverwrite;
use tokio::sync::Notify;

/// Pauses `send_message` until released.
pub struct SendGate {
    entered: Notify,
    released: Notify,
}

impl SendGate {
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    messages: Vec<(String, String)>,
    failures: HashMap<&'static str, u32>,
    next_channel: u32,
    gate: Option<Arc<SendGate>>,
}

/// Records every platform call as `op:arg:arg…` and can fail named
/// operations a set number of times.
#[derive(Default)]
pub struct RecordingPlatform {
    inner: Mutex<Inner>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, op: &'static str, times: u32) {
        self.inner.lock().unwrap().failures.insert(op, times);
    }

    pub fn hold_sends(&self) -> Arc<SendGate> {
        let gate = Arc::new(SendGate {
            entered: Notify::new(),
            released: Notify::new(),
        });
        self.inner.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_named(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().messages.clone()
    }

    fn enter(&self, op: &'static str, call: String) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(left) = inner.failures.get_mut(op)
            && *left > 0
        {
            *left -= 1;
            return Err(TavernError::platform(format!("{op} unavailable")));
        }
        inner.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl PlatformOps for RecordingPlatform {
    async fn send_message(&self, target: &str, content: &str) -> Result<String> {
        let gate = self.inner.lock().unwrap().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }
        self.enter("send_message", format!("send_message:{target}"))?;
        let mut inner = self.inner.lock().unwrap();
        inner.messages.push((target.to_string(), content.to_string()));
        Ok(format!("msg-{}", inner.messages.len()))
    }

    async fn send_direct_message(&self, participant_id: &str, content: &str) -> Result<String> {
        self.enter("send_direct_message", format!("send_direct_message:{participant_id}"))?;
        let mut inner = self.inner.lock().unwrap();
        inner.messages.push((format!("@{participant_id}"), content.to_string()));
        Ok(format!("dm-{}", inner.messages.len()))
    }

    async fn create_resource(
        &self,
        _tenant_id: &str,
        parent_id: &str,
        name: &str,
        _overwrites: &[PermissionOverwrite],
    ) -> Result<String> {
        self.enter("create_resource", format!("create_resource:{parent_id}:{name}"))?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_channel += 1;
        Ok(format!("channel-{}", inner.next_channel))
    }

    async fn set_resource_permissions(
        &self,
        resource_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<()> {
        self.enter(
            "set_resource_permissions",
            format!("set_resource_permissions:{resource_id}:{}", overwrite.target_id),
        )
    }

    async fn rename_and_move_resource(
        &self,
        resource_id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<()> {
        self.enter(
            "rename_and_move_resource",
            format!("rename_and_move_resource:{resource_id}:{new_name}:{new_parent_id}"),
        )
    }

    async fn add_reaction_marker(&self, channel_id: &str, message_id: &str, marker: &str) -> Result<()> {
        self.enter(
            "add_reaction_marker",
            format!("add_reaction_marker:{channel_id}:{message_id}:{marker}"),
        )
    }

    async fn remove_reaction_marker(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: &str,
        participant_id: &str,
    ) -> Result<()> {
        self.enter(
            "remove_reaction_marker",
            format!("remove_reaction_marker:{channel_id}:{message_id}:{marker}:{participant_id}"),
        )
    }
}
