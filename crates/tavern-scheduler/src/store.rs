//! In-memory workflow store. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tavern_core::error::{Result, TavernError};
use tavern_core::traits::WorkflowStore;
use tavern_core::types::{Submission, TenantSettings, Vote, VoteTally, Workflow, WorkflowStatus};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    workflows: HashMap<String, Workflow>,
    submissions: Vec<Submission>,
    votes: Vec<Vote>,
    settings: HashMap<String, TenantSettings>,
}

/// Workflow store backed by maps behind a tokio mutex.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every vote currently stored.
    pub async fn votes(&self) -> Vec<Vote> {
        self.state.lock().await.votes.clone()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn list_non_terminal_workflows(&self, tenant_id: Option<&str>) -> Result<Vec<Workflow>> {
        let state = self.state.lock().await;
        let mut workflows: Vec<Workflow> = state
            .workflows
            .values()
            .filter(|w| !w.status.is_terminal())
            .filter(|w| tenant_id.is_none_or(|t| w.tenant_id == t))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(workflows)
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.state.lock().await.workflows.get(id).cloned())
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.state
            .lock()
            .await
            .workflows
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let workflow = state
            .workflows
            .get_mut(id)
            .ok_or_else(|| TavernError::NotFound(format!("workflow {id}")))?;
        workflow.status = status;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status_from(
        &self,
        id: &str,
        expected: WorkflowStatus,
        status: WorkflowStatus,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let workflow = state
            .workflows
            .get_mut(id)
            .ok_or_else(|| TavernError::NotFound(format!("workflow {id}")))?;
        if workflow.status != expected {
            return Ok(false);
        }
        workflow.status = status;
        workflow.updated_at = Utc::now();
        Ok(true)
    }

    async fn find_active_workflow(
        &self,
        tenant_id: &str,
        status: WorkflowStatus,
    ) -> Result<Option<Workflow>> {
        let state = self.state.lock().await;
        Ok(state
            .workflows
            .values()
            .filter(|w| w.tenant_id == tenant_id && w.status == status)
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn create_submission(&self, submission: &Submission) -> Result<()> {
        self.state.lock().await.submissions.push(submission.clone());
        Ok(())
    }

    async fn list_submissions(&self, workflow_id: &str) -> Result<Vec<Submission>> {
        let state = self.state.lock().await;
        Ok(state
            .submissions
            .iter()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn find_submission(
        &self,
        workflow_id: &str,
        participant_id: &str,
    ) -> Result<Option<Submission>> {
        let state = self.state.lock().await;
        Ok(state
            .submissions
            .iter()
            .find(|s| s.workflow_id == workflow_id && s.participant_id == participant_id)
            .cloned())
    }

    async fn find_submission_by_message(&self, message_id: &str) -> Result<Option<Submission>> {
        let state = self.state.lock().await;
        Ok(state.submissions.iter().find(|s| s.message_id == message_id).cloned())
    }

    async fn create_vote(&self, vote: &Vote) -> Result<()> {
        self.state.lock().await.votes.push(vote.clone());
        Ok(())
    }

    async fn delete_votes(
        &self,
        workflow_id: &str,
        submission_id: &str,
        participant_id: &str,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.votes.len();
        state.votes.retain(|v| {
            !(v.workflow_id == workflow_id
                && v.submission_id == submission_id
                && v.participant_id == participant_id)
        });
        Ok((before - state.votes.len()) as u64)
    }

    async fn count_votes(&self, workflow_id: &str, participant_id: &str) -> Result<u32> {
        let state = self.state.lock().await;
        Ok(state
            .votes
            .iter()
            .filter(|v| v.workflow_id == workflow_id && v.participant_id == participant_id)
            .count() as u32)
    }

    async fn tally_votes(&self, workflow_id: &str) -> Result<Vec<VoteTally>> {
        let state = self.state.lock().await;
        let mut tally: Vec<VoteTally> = state
            .submissions
            .iter()
            .filter(|s| s.workflow_id == workflow_id)
            .map(|s| VoteTally {
                submission: s.clone(),
                votes: state
                    .votes
                    .iter()
                    .filter(|v| v.workflow_id == workflow_id && v.submission_id == s.id)
                    .count() as u32,
            })
            .collect();
        tally.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.submission.created_at.cmp(&b.submission.created_at))
        });
        Ok(tally)
    }

    async fn tenant_settings(&self, tenant_id: &str) -> Result<TenantSettings> {
        let state = self.state.lock().await;
        Ok(state
            .settings
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| TenantSettings::new(tenant_id)))
    }

    async fn save_tenant_settings(&self, settings: &TenantSettings) -> Result<()> {
        self.state
            .lock()
            .await
            .settings
            .insert(settings.tenant_id.clone(), settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_terminal_filter() {
        let store = MemoryStore::new();
        let live = Workflow::new("g1", "Live", 1);
        let done = Workflow::new("g1", "Done", 2).with_status(WorkflowStatus::Archived);
        let other = Workflow::new("g2", "Other", 1);
        for w in [&live, &done, &other] {
            store.insert_workflow(w).await.unwrap();
        }

        assert_eq!(store.list_non_terminal_workflows(None).await.unwrap().len(), 2);
        let g1 = store.list_non_terminal_workflows(Some("g1")).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g1[0].id, live.id);
    }

    #[tokio::test]
    async fn test_status_write_requires_expected() {
        let store = MemoryStore::new();
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Ended);
        store.insert_workflow(&wf).await.unwrap();

        assert!(
            !store
                .update_status_from(&wf.id, WorkflowStatus::Setup, WorkflowStatus::Announcing)
                .await
                .unwrap()
        );
        assert!(
            store
                .update_status_from(&wf.id, WorkflowStatus::Ended, WorkflowStatus::Archiving)
                .await
                .unwrap()
        );
        let loaded = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Archiving);
        assert!(matches!(
            store
                .update_status_from("missing", WorkflowStatus::Setup, WorkflowStatus::Announcing)
                .await,
            Err(TavernError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_unknown() {
        let store = MemoryStore::new();
        let err = store.update_status("nope", WorkflowStatus::Voting).await.unwrap_err();
        assert!(matches!(err, TavernError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_votes_is_exact() {
        let store = MemoryStore::new();
        store.create_vote(&Vote::new("w", "s1", "u1")).await.unwrap();
        store.create_vote(&Vote::new("w", "s2", "u1")).await.unwrap();
        store.create_vote(&Vote::new("w", "s1", "u2")).await.unwrap();

        assert_eq!(store.delete_votes("w", "s1", "u1").await.unwrap(), 1);
        assert_eq!(store.count_votes("w", "u1").await.unwrap(), 1);
        assert_eq!(store.count_votes("w", "u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_settings_default() {
        let store = MemoryStore::new();
        let settings = store.tenant_settings("g1").await.unwrap();
        assert_eq!(settings, TenantSettings::new("g1"));
    }
}
