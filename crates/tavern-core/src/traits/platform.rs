//! Chat platform operations used by the orchestrator and modules.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PermissionOverwrite;

/// Remote calls against the chat platform. All are fallible and may be slow.
#[async_trait]
pub trait PlatformOps: Send + Sync {
    /// Post a message to a channel. Returns the new message id.
    async fn send_message(&self, target_id: &str, content: &str) -> Result<String>;

    /// Privately message a participant. Returns the new message id.
    async fn send_direct_message(&self, participant_id: &str, content: &str) -> Result<String>;

    /// Create a text channel under `parent_id`. Returns the channel id.
    async fn create_resource(
        &self,
        tenant_id: &str,
        parent_id: &str,
        name: &str,
        permissions: &[PermissionOverwrite],
    ) -> Result<String>;

    async fn set_resource_permissions(
        &self,
        resource_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<()>;

    async fn rename_and_move_resource(
        &self,
        resource_id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<()>;

    /// React to a message as the bot.
    async fn add_reaction_marker(&self, channel_id: &str, message_id: &str, marker: &str)
    -> Result<()>;

    /// Remove a participant's reaction from a message.
    async fn remove_reaction_marker(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: &str,
        participant_id: &str,
    ) -> Result<()>;
}
