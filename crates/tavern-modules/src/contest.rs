//! Contest module: records submissions and counts votes cast as reactions.
//!
//! Submissions are attachments posted in the tenant's working channel while
//! a campaign accepts entries. Votes are reactions with the tenant's voting
//! marker on a submission while that campaign is voting. Each participant
//! holds at most [`MAX_VOTES_PER_PARTICIPANT`] live votes per campaign.

use std::sync::Arc;

use tavern_core::error::Result;
use tavern_core::events::{CommandEvent, EventKind, MessageEvent, PlatformEvent, ReactionEvent};
use tavern_core::types::{
    MAX_VOTES_PER_PARTICIPANT, Submission, TenantSettings, Vote, WorkflowStatus,
};
use tavern_kernel::{ModuleDescriptor, PluginContext};
use tokio::sync::Mutex;

pub const MODULE_ID: &str = "contest";
pub const STATUS_COMMAND: &str = "contest-status";

pub fn contest_module() -> ModuleDescriptor {
    // Count-then-insert must not interleave between two reactions.
    let vote_lock = Arc::new(Mutex::new(()));

    ModuleDescriptor::new(MODULE_ID, "Contest", env!("CARGO_PKG_VERSION"))
        .description("Collects campaign submissions and counts reaction votes")
        .command(STATUS_COMMAND, "Show the state of this server's campaigns")
        .on_initialize(|ctx: PluginContext| async move {
            tracing::info!("🏆 Contest module ready");
            ctx.audit("*", "module_initialized", None).await;
            Ok(())
        })
        .on_shutdown(|ctx: PluginContext| async move {
            tracing::info!("🏆 Contest module stopped");
            ctx.audit("*", "module_shutdown", None).await;
            Ok(())
        })
        .subscribe(EventKind::MessageCreate, |ctx, event| async move {
            match event {
                PlatformEvent::MessageCreate(message) => record_submission(&ctx, &message).await,
                _ => Ok(()),
            }
        })
        .subscribe(EventKind::ReactionAdd, move |ctx, event| {
            let vote_lock = vote_lock.clone();
            async move {
                match event {
                    PlatformEvent::ReactionAdd(reaction) => {
                        let _held = vote_lock.lock().await;
                        cast_vote(&ctx, &reaction).await
                    }
                    _ => Ok(()),
                }
            }
        })
        .subscribe(EventKind::ReactionRemove, |ctx, event| async move {
            match event {
                PlatformEvent::ReactionRemove(reaction) => retract_vote(&ctx, &reaction).await,
                _ => Ok(()),
            }
        })
        .subscribe(EventKind::CommandInvoked, |ctx, event| async move {
            match event {
                PlatformEvent::CommandInvoked(command) if command.command == STATUS_COMMAND => {
                    report_status(&ctx, &command).await
                }
                _ => Ok(()),
            }
        })
}

async fn record_submission(ctx: &PluginContext, message: &MessageEvent) -> Result<()> {
    if message.author_is_bot {
        return Ok(());
    }
    let Some(artifact) = message.attachments.first() else {
        return Ok(());
    };
    let store = ctx.store();
    let settings = store.tenant_settings(&message.tenant_id).await?;
    if settings.working_channel_id.as_deref() != Some(message.channel_id.as_str()) {
        return Ok(());
    }
    let Some(workflow) = store
        .find_active_workflow(&message.tenant_id, WorkflowStatus::Submissions)
        .await?
    else {
        return Ok(());
    };

    if store.find_submission(&workflow.id, &message.author_id).await?.is_some() {
        tracing::debug!(
            "Participant {} already submitted to campaign {}, ignoring message {}",
            message.author_id,
            workflow.id,
            message.message_id
        );
        return Ok(());
    }

    let submission = Submission::new(
        &workflow.id,
        &message.author_id,
        &message.channel_id,
        &message.message_id,
        artifact,
    );
    store.create_submission(&submission).await?;
    tracing::info!(
        "📥 Submission {} from {} recorded for campaign {}",
        submission.id,
        message.author_id,
        workflow.id
    );
    ctx.audit(
        &message.tenant_id,
        "submission_recorded",
        Some(format!("campaign {} participant {}", workflow.id, message.author_id)),
    )
    .await;
    Ok(())
}

/// The bot's own markers, seeded when voting starts.
fn is_own_reaction(reaction: &ReactionEvent, settings: &TenantSettings) -> bool {
    reaction.participant_is_bot
        || settings.bot_user_id.as_deref() == Some(reaction.participant_id.as_str())
}

async fn cast_vote(ctx: &PluginContext, reaction: &ReactionEvent) -> Result<()> {
    let store = ctx.store();
    let Some(submission) = store.find_submission_by_message(&reaction.message_id).await? else {
        return Ok(());
    };
    let settings = store.tenant_settings(&reaction.tenant_id).await?;
    if is_own_reaction(reaction, &settings) {
        return Ok(());
    }

    let voting = store
        .find_active_workflow(&reaction.tenant_id, WorkflowStatus::Voting)
        .await?
        .filter(|w| w.id == submission.workflow_id);
    let Some(workflow) = voting else {
        tracing::debug!("Reaction on {} outside voting, retracting", reaction.message_id);
        return retract_reaction(ctx, reaction).await;
    };
    if reaction.marker != settings.voting_marker {
        tracing::debug!("Reaction {} is not the voting marker, retracting", reaction.marker);
        return retract_reaction(ctx, reaction).await;
    }

    let held = store.count_votes(&workflow.id, &reaction.participant_id).await?;
    if held >= MAX_VOTES_PER_PARTICIPANT {
        tracing::info!(
            "🚫 Participant {} already holds {} votes in campaign {}",
            reaction.participant_id,
            held,
            workflow.id
        );
        retract_reaction(ctx, reaction).await?;
        let notice = format!(
            "You can vote for at most {MAX_VOTES_PER_PARTICIPANT} entries in **{} #{}**. \
             Remove one of your votes to vote for this entry.",
            workflow.title, workflow.number
        );
        if let Err(e) = ctx
            .platform()
            .send_direct_message(&reaction.participant_id, &notice)
            .await
        {
            tracing::warn!("⚠️ Could not notify {} about the vote limit: {e}", reaction.participant_id);
        }
        return Ok(());
    }

    let vote = Vote::new(&workflow.id, &submission.id, &reaction.participant_id);
    store.create_vote(&vote).await?;
    tracing::info!(
        "🗳️ Vote by {} for submission {} in campaign {}",
        reaction.participant_id,
        submission.id,
        workflow.id
    );
    Ok(())
}

async fn retract_reaction(ctx: &PluginContext, reaction: &ReactionEvent) -> Result<()> {
    ctx.platform()
        .remove_reaction_marker(
            &reaction.channel_id,
            &reaction.message_id,
            &reaction.marker,
            &reaction.participant_id,
        )
        .await
}

async fn retract_vote(ctx: &PluginContext, reaction: &ReactionEvent) -> Result<()> {
    let store = ctx.store();
    let Some(submission) = store.find_submission_by_message(&reaction.message_id).await? else {
        return Ok(());
    };
    // Only the voting marker ever created a vote.
    let settings = store.tenant_settings(&reaction.tenant_id).await?;
    if is_own_reaction(reaction, &settings) || reaction.marker != settings.voting_marker {
        return Ok(());
    }
    let removed = store
        .delete_votes(&submission.workflow_id, &submission.id, &reaction.participant_id)
        .await?;
    if removed > 0 {
        tracing::info!(
            "↩️ Vote by {} for submission {} withdrawn",
            reaction.participant_id,
            submission.id
        );
    }
    Ok(())
}

async fn report_status(ctx: &PluginContext, command: &CommandEvent) -> Result<()> {
    let store = ctx.store();
    let workflows = store.list_non_terminal_workflows(Some(&command.tenant_id)).await?;
    let mut text = String::from("**Campaigns**");
    if workflows.is_empty() {
        text.push_str("\nNo campaigns are running.");
    }
    for workflow in &workflows {
        let entries = store.list_submissions(&workflow.id).await?.len();
        text.push_str(&format!(
            "\n• {} #{}: {} ({} {})",
            workflow.title,
            workflow.number,
            workflow.status,
            entries,
            if entries == 1 { "entry" } else { "entries" }
        ));
    }
    ctx.platform().send_message(&command.channel_id, &text).await?;
    Ok(())
}
