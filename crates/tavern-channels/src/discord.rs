//! Discord channel: REST v10 client for the operations campaigns need.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tavern_core::config::DiscordConfig;
use tavern_core::error::{Result, TavernError};
use tavern_core::traits::PlatformOps;
use tavern_core::types::{Permission, PermissionOverwrite};

/// Discord channel type for a guild text channel.
const GUILD_TEXT: u8 = 0;
/// Overwrite target type for a role.
const ROLE_OVERWRITE: u8 = 0;

/// Discord REST client.
pub struct DiscordOps {
    client: reqwest::Client,
    api_base: Url,
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

impl DiscordOps {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(TavernError::Config("discord.bot_token is empty".into()));
        }
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| TavernError::Config(format!("invalid discord.api_base: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(TavernError::Config(format!(
                "discord.api_base is not a base URL: {}",
                config.api_base
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("tavern/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TavernError::platform(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            api_base,
            bot_token: config.bot_token.clone(),
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<reqwest::Response> {
        let url = self.endpoint(segments);
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header("Authorization", format!("Bot {}", self.bot_token));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TavernError::platform(format!("Discord {method} {} failed: {e}", url.path())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Discord {method} {} returned {status}", url.path());
            return Err(TavernError::platform(format!(
                "Discord {method} {} returned {status}: {body}",
                url.path()
            )));
        }
        Ok(response)
    }

    async fn call_for_id(&self, method: Method, segments: &[&str], body: Value) -> Result<String> {
        let created: Created = self
            .call(method, segments, Some(body))
            .await?
            .json()
            .await
            .map_err(|e| TavernError::platform(format!("Invalid Discord response: {e}")))?;
        Ok(created.id)
    }

    /// The bot account's own user id (GET /users/@me).
    pub async fn current_user_id(&self) -> Result<String> {
        let me: Created = self
            .call(Method::GET, &["users", "@me"], None)
            .await?
            .json()
            .await
            .map_err(|e| TavernError::platform(format!("Invalid Discord response: {e}")))?;
        Ok(me.id)
    }
}

#[async_trait]
impl PlatformOps for DiscordOps {
    async fn send_message(&self, target_id: &str, content: &str) -> Result<String> {
        let id = self
            .call_for_id(
                Method::POST,
                &["channels", target_id, "messages"],
                json!({ "content": content }),
            )
            .await?;
        tracing::debug!("💬 Discord message {id} sent to {target_id}");
        Ok(id)
    }

    async fn send_direct_message(&self, participant_id: &str, content: &str) -> Result<String> {
        let dm_channel = self
            .call_for_id(
                Method::POST,
                &["users", "@me", "channels"],
                json!({ "recipient_id": participant_id }),
            )
            .await?;
        self.send_message(&dm_channel, content).await
    }

    async fn create_resource(
        &self,
        tenant_id: &str,
        parent_id: &str,
        name: &str,
        permissions: &[PermissionOverwrite],
    ) -> Result<String> {
        let body = json!({
            "name": name,
            "type": GUILD_TEXT,
            "parent_id": parent_id,
            "permission_overwrites": permissions.iter().map(overwrite_json).collect::<Vec<_>>(),
        });
        let id = self
            .call_for_id(Method::POST, &["guilds", tenant_id, "channels"], body)
            .await?;
        tracing::info!("📁 Discord channel #{name} ({id}) created in guild {tenant_id}");
        Ok(id)
    }

    async fn set_resource_permissions(
        &self,
        resource_id: &str,
        overwrite: &PermissionOverwrite,
    ) -> Result<()> {
        let mut body = overwrite_json(overwrite);
        if let Some(obj) = body.as_object_mut() {
            obj.remove("id");
        }
        self.call(
            Method::PUT,
            &["channels", resource_id, "permissions", &overwrite.target_id],
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn rename_and_move_resource(
        &self,
        resource_id: &str,
        new_name: &str,
        new_parent_id: &str,
    ) -> Result<()> {
        self.call(
            Method::PATCH,
            &["channels", resource_id],
            Some(json!({ "name": new_name, "parent_id": new_parent_id })),
        )
        .await?;
        Ok(())
    }

    async fn add_reaction_marker(&self, channel_id: &str, message_id: &str, marker: &str) -> Result<()> {
        self.call(
            Method::PUT,
            &["channels", channel_id, "messages", message_id, "reactions", marker, "@me"],
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove_reaction_marker(
        &self,
        channel_id: &str,
        message_id: &str,
        marker: &str,
        participant_id: &str,
    ) -> Result<()> {
        self.call(
            Method::DELETE,
            &["channels", channel_id, "messages", message_id, "reactions", marker, participant_id],
            None,
        )
        .await?;
        Ok(())
    }
}

fn permission_bit(permission: Permission) -> u64 {
    match permission {
        Permission::AddReactions => 1 << 6,
        Permission::ViewChannel => 1 << 10,
        Permission::SendMessages => 1 << 11,
        Permission::AttachFiles => 1 << 15,
        Permission::ReadMessageHistory => 1 << 16,
    }
}

fn permission_bits(permissions: &[Permission]) -> u64 {
    permissions.iter().fold(0, |bits, p| bits | permission_bit(*p))
}

/// Discord sends permission sets as decimal strings.
fn overwrite_json(overwrite: &PermissionOverwrite) -> Value {
    json!({
        "id": overwrite.target_id,
        "type": ROLE_OVERWRITE,
        "allow": permission_bits(&overwrite.allow).to_string(),
        "deny": permission_bits(&overwrite.deny).to_string(),
    })
}
