//! Executors: the side effects behind each in-flight campaign state.
//!
//! An executor performs the remote calls for one state and returns. The
//! orchestrator commits the resulting stable state only when it returns `Ok`.
//! Executors may run more than once for the same state (a retry after a
//! partial failure), so each tolerates work a previous attempt already did.

use tavern_core::error::{Result, TavernError};
use tavern_core::traits::{PlatformOps, WorkflowStore};
use tavern_core::types::{
    MAX_VOTES_PER_PARTICIPANT, Permission, PermissionOverwrite, TenantSettings, VoteTally, Workflow,
    WorkflowStatus,
};

/// Runs executors against a store and a platform client.
pub struct Executors<'a> {
    store: &'a dyn WorkflowStore,
    platform: &'a dyn PlatformOps,
}

impl<'a> Executors<'a> {
    pub fn new(store: &'a dyn WorkflowStore, platform: &'a dyn PlatformOps) -> Self {
        Self { store, platform }
    }

    /// Perform the work for `workflow.status`. Stable states have no work.
    pub async fn execute(&self, workflow: &Workflow) -> Result<()> {
        match workflow.status {
            WorkflowStatus::CreatingChannel => self.create_channel(workflow).await,
            WorkflowStatus::Announcing => self.announce(workflow).await,
            WorkflowStatus::OpeningSubs => self.open_submissions(workflow).await,
            WorkflowStatus::StartingVoting => self.start_voting(workflow).await,
            WorkflowStatus::Ending => self.end(workflow).await,
            WorkflowStatus::Archiving => self.archive(workflow).await,
            stable => Err(TavernError::InvalidTransition {
                from: stable.to_string(),
                to: "execution".into(),
            }),
        }
    }

    async fn create_channel(&self, workflow: &Workflow) -> Result<()> {
        let mut settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        if let Some(existing) = &settings.working_channel_id {
            tracing::info!(
                "📁 Campaign {} already has working channel {}, nothing to create",
                workflow.id,
                existing
            );
            return Ok(());
        }
        let parent = settings.parent_category_id.clone().ok_or_else(|| {
            TavernError::MissingPrerequisite(format!(
                "tenant {} has no parent category configured",
                workflow.tenant_id
            ))
        })?;

        let locked = PermissionOverwrite::new(
            &workflow.tenant_id,
            &[Permission::ViewChannel, Permission::ReadMessageHistory],
            &[Permission::SendMessages, Permission::AttachFiles, Permission::AddReactions],
        );
        let channel_id = self
            .platform
            .create_resource(&workflow.tenant_id, &parent, &workflow.channel_name(), &[locked])
            .await?;
        tracing::info!("📁 Created channel {} for campaign {}", channel_id, workflow.id);

        settings.working_channel_id = Some(channel_id);
        self.store.save_tenant_settings(&settings).await
    }

    async fn announce(&self, workflow: &Workflow) -> Result<()> {
        let settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        let target = announcement_target(&settings)?;
        self.platform
            .send_message(target, &announcement_text(workflow, &settings))
            .await?;
        Ok(())
    }

    async fn open_submissions(&self, workflow: &Workflow) -> Result<()> {
        let settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        let channel = working_channel(&settings)?;

        let open = PermissionOverwrite::new(
            &workflow.tenant_id,
            &[
                Permission::ViewChannel,
                Permission::ReadMessageHistory,
                Permission::SendMessages,
                Permission::AttachFiles,
            ],
            &[Permission::AddReactions],
        );
        self.platform.set_resource_permissions(channel, &open).await?;

        let mut notice = format!(
            "📬 Submissions for **{} #{}** are open! Post your entry here as an attachment.",
            workflow.title, workflow.number
        );
        if let Some(at) = workflow.start_voting_at {
            notice.push_str(&format!("\nVoting starts <t:{}:R>.", at.timestamp()));
        }
        self.platform.send_message(channel, &notice).await?;
        Ok(())
    }

    async fn start_voting(&self, workflow: &Workflow) -> Result<()> {
        let settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        let channel = working_channel(&settings)?;

        // Lock new entries and open reactions in one overwrite.
        let voting = PermissionOverwrite::new(
            &workflow.tenant_id,
            &[
                Permission::ViewChannel,
                Permission::ReadMessageHistory,
                Permission::AddReactions,
            ],
            &[Permission::SendMessages, Permission::AttachFiles],
        );
        self.platform.set_resource_permissions(channel, &voting).await?;

        let submissions = self.store.list_submissions(&workflow.id).await?;
        for submission in &submissions {
            self.platform
                .add_reaction_marker(
                    &submission.channel_id,
                    &submission.message_id,
                    &settings.voting_marker,
                )
                .await?;
        }

        let mut notice = format!(
            "🗳️ Voting for **{} #{}** has begun! React with {} on up to {} entries.",
            workflow.title, workflow.number, settings.voting_marker, MAX_VOTES_PER_PARTICIPANT
        );
        if let Some(at) = workflow.end_at {
            notice.push_str(&format!("\nVoting closes <t:{}:R>.", at.timestamp()));
        }
        self.platform.send_message(channel, &notice).await?;
        tracing::info!(
            "🗳️ Voting started for campaign {} ({} submissions)",
            workflow.id,
            submissions.len()
        );
        Ok(())
    }

    async fn end(&self, workflow: &Workflow) -> Result<()> {
        let settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        let target = announcement_target(&settings)?;
        let tally = self.store.tally_votes(&workflow.id).await?;
        self.platform
            .send_message(target, &results_text(workflow, &tally))
            .await?;
        Ok(())
    }

    async fn archive(&self, workflow: &Workflow) -> Result<()> {
        let mut settings = self.store.tenant_settings(&workflow.tenant_id).await?;
        let Some(channel) = settings.working_channel_id.clone() else {
            tracing::info!("📦 Campaign {} has no working channel to archive", workflow.id);
            return Ok(());
        };
        let archive = settings.archive_category_id.clone().ok_or_else(|| {
            TavernError::MissingPrerequisite(format!(
                "tenant {} has no archive category configured",
                workflow.tenant_id
            ))
        })?;

        let name = format!("archived-{}", workflow.channel_name());
        self.platform
            .rename_and_move_resource(&channel, &name, &archive)
            .await?;

        settings.working_channel_id = None;
        self.store.save_tenant_settings(&settings).await?;
        tracing::info!("📦 Archived channel {} as {}", channel, name);
        Ok(())
    }
}

fn working_channel(settings: &TenantSettings) -> Result<&str> {
    settings.working_channel_id.as_deref().ok_or_else(|| {
        TavernError::MissingPrerequisite(format!(
            "tenant {} has no working channel",
            settings.tenant_id
        ))
    })
}

/// Announcement channel, falling back to the working channel.
fn announcement_target(settings: &TenantSettings) -> Result<&str> {
    settings
        .announcement_channel_id
        .as_deref()
        .or(settings.working_channel_id.as_deref())
        .ok_or_else(|| {
            TavernError::MissingPrerequisite(format!(
                "tenant {} has no announcement or working channel",
                settings.tenant_id
            ))
        })
}

fn announcement_text(workflow: &Workflow, settings: &TenantSettings) -> String {
    let mut text = String::new();
    if let Some(role) = &settings.notify_role_id {
        text.push_str(&format!("<@&{role}> "));
    }
    text.push_str(&format!("📣 **{} #{}**", workflow.title, workflow.number));
    if !workflow.description.is_empty() {
        text.push_str(&format!("\n{}", workflow.description));
    }
    let schedule = [
        ("Submissions open", workflow.open_submissions_at),
        ("Voting starts", workflow.start_voting_at),
        ("Ends", workflow.end_at),
    ];
    for (label, at) in schedule {
        if let Some(at) = at {
            text.push_str(&format!("\n• {label}: <t:{}:F>", at.timestamp()));
        }
    }
    if let Some(channel) = &settings.working_channel_id {
        text.push_str(&format!("\nHead over to <#{channel}>."));
    }
    text
}

fn results_text(workflow: &Workflow, tally: &[VoteTally]) -> String {
    let mut text = format!("🏆 Results for **{} #{}**", workflow.title, workflow.number);
    if tally.is_empty() {
        text.push_str("\nNo entries this time.");
        return text;
    }
    let medals = ["🥇", "🥈", "🥉"];
    for (i, entry) in tally.iter().take(medals.len()).enumerate() {
        let plural = if entry.votes == 1 { "" } else { "s" };
        text.push_str(&format!(
            "\n{} <@{}> with {} vote{}",
            medals[i], entry.submission.participant_id, entry.votes, plural
        ));
    }
    text
}
