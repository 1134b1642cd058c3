//! Campaign entities and tenant settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TavernError;

/// Campaign status.
///
/// Stable states carry no pending work. Each in-flight state is exactly one
/// queued unit of side-effecting work for the orchestrator.
///
/// ```text
/// Setup ─▶ CreatingChannel ─▶ Setup
/// Setup ─▶ Announcing ─▶ Announced
/// Setup | Announced ─▶ OpeningSubs ─▶ Submissions
/// Submissions ─▶ StartingVoting ─▶ Voting
/// Voting ─▶ Ending ─▶ Ended
/// Ended ─▶ Archiving ─▶ Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Setup,
    CreatingChannel,
    Announcing,
    Announced,
    OpeningSubs,
    Submissions,
    StartingVoting,
    Voting,
    Ending,
    Ended,
    Archiving,
    Archived,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 12] = [
        Self::Setup,
        Self::CreatingChannel,
        Self::Announcing,
        Self::Announced,
        Self::OpeningSubs,
        Self::Submissions,
        Self::StartingVoting,
        Self::Voting,
        Self::Ending,
        Self::Ended,
        Self::Archiving,
        Self::Archived,
    ];

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::CreatingChannel
                | Self::Announcing
                | Self::OpeningSubs
                | Self::StartingVoting
                | Self::Ending
                | Self::Archiving
        )
    }

    pub fn is_stable(&self) -> bool {
        !self.is_in_flight()
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Archived
    }

    /// The stable state committed when this in-flight state's work succeeds.
    pub fn success_state(&self) -> Option<WorkflowStatus> {
        match self {
            Self::CreatingChannel => Some(Self::Setup),
            Self::Announcing => Some(Self::Announced),
            Self::OpeningSubs => Some(Self::Submissions),
            Self::StartingVoting => Some(Self::Voting),
            Self::Ending => Some(Self::Ended),
            Self::Archiving => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::CreatingChannel => "creating_channel",
            Self::Announcing => "announcing",
            Self::Announced => "announced",
            Self::OpeningSubs => "opening_subs",
            Self::Submissions => "submissions",
            Self::StartingVoting => "starting_voting",
            Self::Voting => "voting",
            Self::Ending => "ending",
            Self::Ended => "ended",
            Self::Archiving => "archiving",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = TavernError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TavernError::store(format!("Unknown workflow status: {s}")))
    }
}

/// A campaign: a persisted, multi-phase timed process scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub number: u32,
    #[serde(default)]
    pub description: String,
    pub open_submissions_at: Option<DateTime<Utc>>,
    pub start_voting_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new campaign in `Setup` with no schedule.
    pub fn new(tenant_id: &str, title: &str, number: u32) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            title: title.to_string(),
            number,
            description: String::new(),
            open_submissions_at: None,
            start_voting_at: None,
            end_at: None,
            status: WorkflowStatus::Setup,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_schedule(
        mut self,
        open_submissions_at: Option<DateTime<Utc>>,
        start_voting_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.open_submissions_at = open_submissions_at;
        self.start_voting_at = start_voting_at;
        self.end_at = end_at;
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    /// Channel-safe name, e.g. "Summer Art Jam" #3 → "summer-art-jam-3".
    pub fn channel_name(&self) -> String {
        let mut slug = String::with_capacity(self.title.len());
        for c in self.title.chars() {
            if c.is_alphanumeric() {
                slug.extend(c.to_lowercase());
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        if slug.is_empty() {
            format!("campaign-{}", self.number)
        } else {
            format!("{slug}-{}", self.number)
        }
    }
}

/// A participant's entry in a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub workflow_id: String,
    pub participant_id: String,
    /// Channel the submission message was posted in.
    pub channel_id: String,
    /// Platform message carrying the artifact; voting markers go here.
    pub message_id: String,
    pub artifact_url: String,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(
        workflow_id: &str,
        participant_id: &str,
        channel_id: &str,
        message_id: &str,
        artifact_url: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            participant_id: participant_id.to_string(),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            artifact_url: artifact_url.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One live vote. At most two per (workflow, participant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub workflow_id: String,
    pub submission_id: String,
    pub participant_id: String,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(workflow_id: &str, submission_id: &str, participant_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            submission_id: submission_id.to_string(),
            participant_id: participant_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Maximum live votes a participant may hold in one campaign.
pub const MAX_VOTES_PER_PARTICIPANT: u32 = 2;

/// Vote count for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub submission: Submission,
    pub votes: u32,
}

/// Per-tenant configuration the executors and modules read and write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    /// Channel the current campaign runs in.
    #[serde(default)]
    pub working_channel_id: Option<String>,
    /// Category new campaign channels are created under.
    #[serde(default)]
    pub parent_category_id: Option<String>,
    /// Category finished campaign channels are moved into.
    #[serde(default)]
    pub archive_category_id: Option<String>,
    #[serde(default)]
    pub announcement_channel_id: Option<String>,
    /// Role mentioned in announcements.
    #[serde(default)]
    pub notify_role_id: Option<String>,
    #[serde(default = "default_voting_marker")]
    pub voting_marker: String,
    /// The bot's own user id; its reactions are never counted as votes.
    #[serde(default)]
    pub bot_user_id: Option<String>,
}

fn default_voting_marker() -> String {
    "⭐".into()
}

impl TenantSettings {
    pub fn new(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            working_channel_id: None,
            parent_category_id: None,
            archive_category_id: None,
            announcement_channel_id: None,
            notify_role_id: None,
            voting_marker: default_voting_marker(),
            bot_user_id: None,
        }
    }
}

/// Channel permissions the orchestrator toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewChannel,
    SendMessages,
    AttachFiles,
    AddReactions,
    ReadMessageHistory,
}

/// Allow/deny overwrite for one role or member on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    /// Role id. The tenant id addresses the everyone role.
    pub target_id: String,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

impl PermissionOverwrite {
    pub fn new(target_id: &str, allow: &[Permission], deny: &[Permission]) -> Self {
        Self {
            target_id: target_id.to_string(),
            allow: allow.to_vec(),
            deny: deny.to_vec(),
        }
    }
}
