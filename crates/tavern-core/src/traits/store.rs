//! Repository contract for campaigns, submissions, votes and tenant settings.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Submission, TenantSettings, Vote, VoteTally, Workflow, WorkflowStatus};

/// Persistence for campaign state.
///
/// Implementations must be safe to share between the orchestrator tick and
/// concurrently running module handlers.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// All campaigns not yet `Archived`, optionally restricted to one tenant,
    /// oldest first.
    async fn list_non_terminal_workflows(&self, tenant_id: Option<&str>) -> Result<Vec<Workflow>>;

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Fails with `NotFound` for an unknown id.
    async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<()>;

    /// Write `status` only while the stored status is still `expected`.
    /// Returns `false` when another writer moved the campaign first.
    /// Fails with `NotFound` for an unknown id.
    async fn update_status_from(
        &self,
        id: &str,
        expected: WorkflowStatus,
        status: WorkflowStatus,
    ) -> Result<bool>;

    /// The tenant's oldest campaign currently in `status`.
    async fn find_active_workflow(
        &self,
        tenant_id: &str,
        status: WorkflowStatus,
    ) -> Result<Option<Workflow>>;

    async fn create_submission(&self, submission: &Submission) -> Result<()>;

    async fn list_submissions(&self, workflow_id: &str) -> Result<Vec<Submission>>;

    async fn find_submission(
        &self,
        workflow_id: &str,
        participant_id: &str,
    ) -> Result<Option<Submission>>;

    async fn find_submission_by_message(&self, message_id: &str) -> Result<Option<Submission>>;

    async fn create_vote(&self, vote: &Vote) -> Result<()>;

    /// Delete votes matching all three keys. Returns how many were removed.
    async fn delete_votes(
        &self,
        workflow_id: &str,
        submission_id: &str,
        participant_id: &str,
    ) -> Result<u64>;

    /// Live votes held by a participant in a campaign.
    async fn count_votes(&self, workflow_id: &str, participant_id: &str) -> Result<u32>;

    /// Vote count per submission, highest first, ties by submission time.
    async fn tally_votes(&self, workflow_id: &str) -> Result<Vec<VoteTally>>;

    /// Settings for a tenant; defaults when none were saved.
    async fn tenant_settings(&self, tenant_id: &str) -> Result<TenantSettings>;

    async fn save_tenant_settings(&self, settings: &TenantSettings) -> Result<()>;
}
