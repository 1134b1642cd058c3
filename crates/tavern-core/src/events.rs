//! Inbound platform events routed to modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of platform events a module can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageCreate,
    ReactionAdd,
    ReactionRemove,
    MemberJoin,
    CommandInvoked,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreate => "message_create",
            Self::ReactionAdd => "reaction_add",
            Self::ReactionRemove => "reaction_remove",
            Self::MemberJoin => "member_join",
            Self::CommandInvoked => "command_invoked",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message posted in a tenant channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub tenant_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    #[serde(default)]
    pub content: String,
    /// Attachment URLs.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub author_is_bot: bool,
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub tenant_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub participant_id: String,
    /// Emoji, e.g. "⭐" or "name:id" for custom emoji.
    pub marker: String,
    #[serde(default)]
    pub participant_is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEvent {
    pub tenant_id: String,
    pub member_id: String,
}

/// A slash command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub tenant_id: String,
    pub channel_id: String,
    pub invoker_id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// An inbound event with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PlatformEvent {
    MessageCreate(MessageEvent),
    ReactionAdd(ReactionEvent),
    ReactionRemove(ReactionEvent),
    MemberJoin(MemberEvent),
    CommandInvoked(CommandEvent),
}

impl PlatformEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::ReactionAdd(_) => EventKind::ReactionAdd,
            Self::ReactionRemove(_) => EventKind::ReactionRemove,
            Self::MemberJoin(_) => EventKind::MemberJoin,
            Self::CommandInvoked(_) => EventKind::CommandInvoked,
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            Self::MessageCreate(e) => &e.tenant_id,
            Self::ReactionAdd(e) | Self::ReactionRemove(e) => &e.tenant_id,
            Self::MemberJoin(e) => &e.tenant_id,
            Self::CommandInvoked(e) => &e.tenant_id,
        }
    }
}
