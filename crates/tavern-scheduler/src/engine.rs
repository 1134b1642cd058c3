//! Workflow Orchestrator: the watchdog that advances campaigns.
//!
//! Every tick runs two passes over all non-archived campaigns:
//! 1. schedule pass: promote campaigns whose calendar time has arrived into
//!    an in-flight state (pure status writes);
//! 2. execution pass: run the executor for each in-flight campaign and commit
//!    the resulting stable state on success.
//!
//! A failed execution leaves the campaign where it is, so the next tick
//! retries it. Only one tick runs at a time. Every status write is
//! conditional on the status the pass read, so a concurrent `tavern request`
//! or a second daemon never gets overwritten with a stale state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tavern_core::config::OrchestratorConfig;
use tavern_core::error::{Result, TavernError};
use tavern_core::traits::{ActionLog, ActionRecord, PlatformOps, WorkflowStore};
use tavern_core::types::{Workflow, WorkflowStatus};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::executors::Executors;
use crate::retry::{FailureVerdict, RetryStats, RetryTracker};
use crate::schedule::scheduled_transition;

const ACTOR: &str = "orchestrator";

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Another tick was still running; nothing was touched.
    pub skipped: bool,
    pub scheduled: usize,
    pub executed: usize,
    pub failed: usize,
    /// `CreatingChannel` campaigns sent back to `Setup` for missing config.
    pub reverted: usize,
    /// In-flight campaigns still backing off after a failure.
    pub deferred: usize,
    /// Campaigns another writer moved while their executor ran.
    pub superseded: usize,
}

impl TickReport {
    pub fn skipped() -> Self {
        Self { skipped: true, ..Default::default() }
    }
}

/// Clears the in-progress flag when a tick ends, including by panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    platform: Arc<dyn PlatformOps>,
    action_log: Arc<dyn ActionLog>,
    config: OrchestratorConfig,
    tick_in_progress: AtomicBool,
    retries: Mutex<RetryTracker>,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        platform: Arc<dyn PlatformOps>,
        action_log: Arc<dyn ActionLog>,
        config: OrchestratorConfig,
    ) -> Self {
        let retries = Mutex::new(RetryTracker::new(&config));
        Self {
            store,
            platform,
            action_log,
            config,
            tick_in_progress: AtomicBool::new(false),
            retries,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn retry_stats(&self) -> RetryStats {
        self.retries.lock().await.stats()
    }

    /// Run both passes once. Returns a skipped report if a tick is already running.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        if self
            .tick_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("⏳ Previous tick still running, skipping this one");
            return Ok(TickReport::skipped());
        }
        let _guard = TickGuard(&self.tick_in_progress);

        let mut report = TickReport { scheduled: self.schedule_pass(now).await?, ..Default::default() };
        self.execution_pass(now, &mut report).await?;

        if report.scheduled + report.executed + report.failed + report.reverted + report.superseded > 0 {
            tracing::info!(
                "⏰ Tick: {} scheduled, {} executed, {} failed, {} reverted, {} superseded, {} deferred",
                report.scheduled,
                report.executed,
                report.failed,
                report.reverted,
                report.superseded,
                report.deferred
            );
        }
        Ok(report)
    }

    /// Promote campaigns whose scheduled time has passed. Returns how many moved.
    pub async fn schedule_pass(&self, now: DateTime<Utc>) -> Result<usize> {
        let workflows = self.store.list_non_terminal_workflows(None).await?;
        let mut promoted = 0;
        for workflow in &workflows {
            let Some(next) = scheduled_transition(workflow, now) else {
                continue;
            };
            match self.store.update_status_from(&workflow.id, workflow.status, next).await {
                Ok(false) => tracing::debug!(
                    "Campaign {} left {} before it could be queued",
                    workflow.id,
                    workflow.status
                ),
                Ok(true) => {
                    tracing::info!(
                        "📅 Campaign {} ({}) queued: {} → {}",
                        workflow.id,
                        workflow.tenant_id,
                        workflow.status,
                        next
                    );
                    promoted += 1;
                }
                Err(e) => tracing::error!(
                    "❌ Failed to queue campaign {} into {}: {e}",
                    workflow.id,
                    next
                ),
            }
        }
        Ok(promoted)
    }

    /// Run executors for every in-flight campaign.
    pub async fn execution_pass(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        let workflows = self.store.list_non_terminal_workflows(None).await?;
        for workflow in workflows.iter().filter(|w| w.status.is_in_flight()) {
            if self.retries.lock().await.is_deferred(&workflow.id, now) {
                report.deferred += 1;
                continue;
            }
            self.execute_one(workflow, now, report).await;
        }
        Ok(())
    }

    async fn execute_one(&self, workflow: &Workflow, now: DateTime<Utc>, report: &mut TickReport) {
        let Some(target) = workflow.status.success_state() else {
            return;
        };
        let executors = Executors::new(self.store.as_ref(), self.platform.as_ref());

        let outcome = match executors.execute(workflow).await {
            Ok(()) => {
                self.store
                    .update_status_from(&workflow.id, workflow.status, target)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(false) => {
                self.retries.lock().await.record_success(&workflow.id);
                report.superseded += 1;
                tracing::warn!(
                    "⚠️ Campaign {} left {} while it was executing, not committing {}",
                    workflow.id,
                    workflow.status,
                    target
                );
            }
            Ok(true) => {
                self.retries.lock().await.record_success(&workflow.id);
                report.executed += 1;
                tracing::info!(
                    "✅ Campaign {} ({}): {} → {}",
                    workflow.id,
                    workflow.tenant_id,
                    workflow.status,
                    target
                );
                self.audit(
                    workflow,
                    "status_committed",
                    format!("{} -> {}", workflow.status, target),
                )
                .await;
            }
            Err(TavernError::MissingPrerequisite(reason))
                if workflow.status == WorkflowStatus::CreatingChannel =>
            {
                tracing::warn!(
                    "⚠️ Campaign {} cannot create its channel ({reason}), reverting to setup",
                    workflow.id
                );
                match self
                    .store
                    .update_status_from(&workflow.id, workflow.status, WorkflowStatus::Setup)
                    .await
                {
                    Ok(false) => {
                        self.retries.lock().await.record_success(&workflow.id);
                        report.superseded += 1;
                    }
                    Ok(true) => {
                        self.retries.lock().await.record_success(&workflow.id);
                        report.reverted += 1;
                        self.audit(workflow, "channel_creation_reverted", reason).await;
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!("❌ Failed to revert campaign {} to setup: {e}", workflow.id);
                    }
                }
            }
            Err(e) => {
                report.failed += 1;
                if e.is_retryable() {
                    tracing::warn!(
                        "⚠️ Campaign {} ({}) failed {} → {}, retrying: {e}",
                        workflow.id,
                        workflow.tenant_id,
                        workflow.status,
                        target
                    );
                } else {
                    tracing::error!(
                        "❌ Campaign {} ({}) failed {} → {}: {e}",
                        workflow.id,
                        workflow.tenant_id,
                        workflow.status,
                        target
                    );
                }
                let verdict = self
                    .retries
                    .lock()
                    .await
                    .record_failure(&workflow.id, &e.to_string(), now);
                if verdict == FailureVerdict::Alert {
                    tracing::error!(
                        "🚨 Campaign {} has failed {} {} times in a row, needs attention",
                        workflow.id,
                        workflow.status,
                        self.config.alert_after_failures
                    );
                    self.audit(
                        workflow,
                        "execution_failing",
                        format!("{} failed {} times: {e}", workflow.status, self.config.alert_after_failures),
                    )
                    .await;
                }
            }
        }
    }

    /// Queue administrative work: `CreatingChannel` or `Announcing` from
    /// `Setup`, `Archiving` from `Ended`.
    pub async fn request(&self, workflow_id: &str, state: WorkflowStatus) -> Result<()> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| TavernError::NotFound(format!("workflow {workflow_id}")))?;

        let allowed = match state {
            WorkflowStatus::CreatingChannel | WorkflowStatus::Announcing => {
                workflow.status == WorkflowStatus::Setup
            }
            WorkflowStatus::Archiving => workflow.status == WorkflowStatus::Ended,
            _ => false,
        };
        if !allowed {
            return Err(TavernError::InvalidTransition {
                from: workflow.status.to_string(),
                to: state.to_string(),
            });
        }

        if !self.store.update_status_from(workflow_id, workflow.status, state).await? {
            let current = self
                .store
                .get_workflow(workflow_id)
                .await?
                .map_or_else(|| "deleted".to_string(), |w| w.status.to_string());
            return Err(TavernError::InvalidTransition { from: current, to: state.to_string() });
        }
        tracing::info!("📝 Campaign {} requested: {} → {}", workflow_id, workflow.status, state);
        self.audit(&workflow, "status_requested", format!("{} -> {}", workflow.status, state))
            .await;
        Ok(())
    }

    async fn audit(&self, workflow: &Workflow, action: &str, details: String) {
        let record = ActionRecord::new(
            &workflow.tenant_id,
            ACTOR,
            action,
            Some(format!("campaign {}: {details}", workflow.id)),
        );
        if let Err(e) = self.action_log.record(record).await {
            tracing::warn!("⚠️ Failed to write audit record: {e}");
        }
    }

    /// Tick every `tick_interval_secs` until `shutdown` flips to true or its
    /// sender is dropped. A tick already running when shutdown arrives finishes.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let every = std::time::Duration::from_secs(self.config.tick_interval_secs.max(1));
        tracing::info!("⏰ Orchestrator started (tick every {}s)", every.as_secs());

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!("❌ Orchestrator tick failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("⏹️ Orchestrator stopped");
    }

    /// Spawn [`run`](Self::run) as a background tokio task.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::RecordingPlatform;
    use chrono::Duration;
    use tavern_core::traits::MemoryActionLog;
    use tavern_core::types::{Submission, TenantSettings, Vote};

    struct Harness {
        store: Arc<MemoryStore>,
        platform: Arc<RecordingPlatform>,
        log: Arc<MemoryActionLog>,
        orchestrator: Arc<WorkflowOrchestrator>,
    }

    fn harness_with(config: OrchestratorConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(RecordingPlatform::new());
        let log = Arc::new(MemoryActionLog::new());
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            store.clone(),
            platform.clone(),
            log.clone(),
            config,
        ));
        Harness { store, platform, log, orchestrator }
    }

    fn harness() -> Harness {
        harness_with(OrchestratorConfig::default())
    }

    async fn configured_tenant(store: &MemoryStore) {
        let mut settings = TenantSettings::new("g1");
        settings.parent_category_id = Some("cat-live".into());
        settings.archive_category_id = Some("cat-archive".into());
        settings.announcement_channel_id = Some("news".into());
        settings.working_channel_id = Some("work".into());
        store.save_tenant_settings(&settings).await.unwrap();
    }

    async fn status_of(store: &MemoryStore, id: &str) -> WorkflowStatus {
        store.get_workflow(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_open_submissions_end_to_end() {
        let h = harness();
        configured_tenant(&h.store).await;
        let now = Utc::now();
        let wf = Workflow::new("g1", "Jam", 1).with_schedule(Some(now - Duration::minutes(1)), None, None);
        h.store.insert_workflow(&wf).await.unwrap();

        assert_eq!(h.orchestrator.schedule_pass(now).await.unwrap(), 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::OpeningSubs);

        let mut report = TickReport::default();
        h.orchestrator.execution_pass(now, &mut report).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Submissions);
        assert_eq!(h.platform.calls_named("set_resource_permissions"), 1);
        assert_eq!(h.platform.calls_named("send_message"), 1);
    }

    #[tokio::test]
    async fn test_schedule_pass_is_idempotent() {
        let h = harness();
        let now = Utc::now();
        let wf = Workflow::new("g1", "Jam", 1).with_schedule(Some(now - Duration::minutes(1)), None, None);
        h.store.insert_workflow(&wf).await.unwrap();

        assert_eq!(h.orchestrator.schedule_pass(now).await.unwrap(), 1);
        let after_first = h.store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(h.orchestrator.schedule_pass(now).await.unwrap(), 0);
        let after_second = h.store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_every_in_flight_state_commits_its_stable_state() {
        let cases = [
            (WorkflowStatus::CreatingChannel, WorkflowStatus::Setup),
            (WorkflowStatus::Announcing, WorkflowStatus::Announced),
            (WorkflowStatus::OpeningSubs, WorkflowStatus::Submissions),
            (WorkflowStatus::StartingVoting, WorkflowStatus::Voting),
            (WorkflowStatus::Ending, WorkflowStatus::Ended),
            (WorkflowStatus::Archiving, WorkflowStatus::Archived),
        ];
        for (from, to) in cases {
            let h = harness();
            configured_tenant(&h.store).await;
            let wf = Workflow::new("g1", "Jam", 1).with_status(from);
            h.store.insert_workflow(&wf).await.unwrap();

            let report = h.orchestrator.tick(Utc::now()).await.unwrap();
            assert_eq!(report.executed, 1, "{from}");
            assert_eq!(status_of(&h.store, &wf.id).await, to, "{from}");

            // A second tick finds nothing to do.
            let report = h.orchestrator.tick(Utc::now()).await.unwrap();
            assert_eq!(report.executed, 0, "{from}");
            assert_eq!(status_of(&h.store, &wf.id).await, to, "{from}");
        }
    }

    #[tokio::test]
    async fn test_failed_execution_retries_next_tick() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::StartingVoting);
        h.store.insert_workflow(&wf).await.unwrap();
        h.platform.fail_next("set_resource_permissions", 1);

        let report = h.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::StartingVoting);
        assert_eq!(h.orchestrator.retry_stats().await.failing, 1);

        let report = h.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Voting);
        assert_eq!(h.orchestrator.retry_stats().await.failing, 0);
    }

    #[tokio::test]
    async fn test_start_voting_seeds_markers() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::StartingVoting);
        h.store.insert_workflow(&wf).await.unwrap();
        for (who, msg) in [("alice", "m1"), ("bob", "m2")] {
            h.store
                .create_submission(&Submission::new(&wf.id, who, "work", msg, "https://cdn/x.png"))
                .await
                .unwrap();
        }

        h.orchestrator.tick(Utc::now()).await.unwrap();
        let reactions = h.platform.calls_named("add_reaction_marker");
        assert_eq!(reactions, 2);
        assert!(h.platform.calls().iter().any(|c| c == "add_reaction_marker:work:m2:⭐"));
    }

    #[tokio::test]
    async fn test_missing_parent_category_reverts_to_setup() {
        let h = harness();
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::CreatingChannel);
        h.store.insert_workflow(&wf).await.unwrap();

        let report = h.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(report.reverted, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Setup);
        assert_eq!(h.platform.calls_named("create_resource"), 0);

        let records = h.log.records().await;
        assert!(records.iter().any(|r| r.action == "channel_creation_reverted"));
    }

    #[tokio::test]
    async fn test_create_channel_persists_working_channel() {
        let h = harness();
        let mut settings = TenantSettings::new("g1");
        settings.parent_category_id = Some("cat-live".into());
        h.store.save_tenant_settings(&settings).await.unwrap();
        let wf = Workflow::new("g1", "Art Jam", 5).with_status(WorkflowStatus::CreatingChannel);
        h.store.insert_workflow(&wf).await.unwrap();

        h.orchestrator.tick(Utc::now()).await.unwrap();
        let settings = h.store.tenant_settings("g1").await.unwrap();
        assert_eq!(settings.working_channel_id.as_deref(), Some("channel-1"));
        assert!(h.platform.calls().iter().any(|c| c == "create_resource:cat-live:art-jam-5"));
    }

    #[tokio::test]
    async fn test_transient_create_failure_keeps_state() {
        let h = harness();
        configured_tenant(&h.store).await;
        let mut settings = h.store.tenant_settings("g1").await.unwrap();
        settings.working_channel_id = None;
        h.store.save_tenant_settings(&settings).await.unwrap();
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::CreatingChannel);
        h.store.insert_workflow(&wf).await.unwrap();
        h.platform.fail_next("create_resource", 1);

        let report = h.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::CreatingChannel);
    }

    #[tokio::test]
    async fn test_archive_detaches_channel() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 2).with_status(WorkflowStatus::Archiving);
        h.store.insert_workflow(&wf).await.unwrap();

        h.orchestrator.tick(Utc::now()).await.unwrap();
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Archived);
        let settings = h.store.tenant_settings("g1").await.unwrap();
        assert!(settings.working_channel_id.is_none());
        assert!(h
            .platform
            .calls()
            .iter()
            .any(|c| c == "rename_and_move_resource:work:archived-jam-2:cat-archive"));
        // Archived campaigns drop out of the watchdog's view.
        assert!(h.store.list_non_terminal_workflows(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_announces_ranked_results() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Ending);
        h.store.insert_workflow(&wf).await.unwrap();
        let a = Submission::new(&wf.id, "alice", "work", "m1", "u");
        let b = Submission::new(&wf.id, "bob", "work", "m2", "u");
        h.store.create_submission(&a).await.unwrap();
        h.store.create_submission(&b).await.unwrap();
        h.store.create_vote(&Vote::new(&wf.id, &b.id, "carol")).await.unwrap();

        h.orchestrator.tick(Utc::now()).await.unwrap();
        let sent = h.platform.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "news");
        assert!(sent[0].1.contains("🥇 <@bob>"));
    }

    #[tokio::test]
    async fn test_backoff_defers_retry() {
        let h = harness_with(OrchestratorConfig {
            retry_backoff_base_secs: 30,
            ..Default::default()
        });
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Announcing);
        h.store.insert_workflow(&wf).await.unwrap();
        h.platform.fail_next("send_message", 1);

        let t0 = Utc::now();
        assert_eq!(h.orchestrator.tick(t0).await.unwrap().failed, 1);
        let report = h.orchestrator.tick(t0 + Duration::seconds(10)).await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Announcing);

        let report = h.orchestrator.tick(t0 + Duration::seconds(31)).await.unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Announced);
    }

    #[tokio::test]
    async fn test_alert_after_repeated_failures() {
        let h = harness_with(OrchestratorConfig {
            alert_after_failures: 2,
            ..Default::default()
        });
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Ending);
        h.store.insert_workflow(&wf).await.unwrap();
        h.platform.fail_next("send_message", 3);

        for _ in 0..3 {
            h.orchestrator.tick(Utc::now()).await.unwrap();
        }
        let alerts = h
            .log
            .records()
            .await
            .into_iter()
            .filter(|r| r.action == "execution_failing")
            .count();
        assert_eq!(alerts, 1);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Ending);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Announcing);
        h.store.insert_workflow(&wf).await.unwrap();

        let gate = h.platform.hold_sends();
        let orchestrator = h.orchestrator.clone();
        let first = tokio::spawn(async move { orchestrator.tick(Utc::now()).await });
        gate.entered().await;

        let second = h.orchestrator.tick(Utc::now()).await.unwrap();
        assert!(second.skipped);

        gate.release();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.executed, 1);
        assert_eq!(h.platform.calls_named("send_message"), 1);
    }

    #[tokio::test]
    async fn test_stale_commit_does_not_rewind_status() {
        let h = harness();
        configured_tenant(&h.store).await;
        let wf = Workflow::new("g1", "Jam", 1).with_status(WorkflowStatus::Announcing);
        h.store.insert_workflow(&wf).await.unwrap();

        let gate = h.platform.hold_sends();
        let orchestrator = h.orchestrator.clone();
        let tick = tokio::spawn(async move { orchestrator.tick(Utc::now()).await });
        gate.entered().await;

        // A second writer commits and moves the campaign on meanwhile.
        h.store.update_status(&wf.id, WorkflowStatus::OpeningSubs).await.unwrap();
        gate.release();

        let report = tick.await.unwrap().unwrap();
        assert_eq!(report.executed, 0);
        assert_eq!(report.superseded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::OpeningSubs);
        assert!(h.log.records().await.iter().all(|r| r.action != "status_committed"));
    }

    #[tokio::test]
    async fn test_request_validates_predecessor() {
        let h = harness();
        let wf = Workflow::new("g1", "Jam", 1);
        h.store.insert_workflow(&wf).await.unwrap();

        h.orchestrator.request(&wf.id, WorkflowStatus::Announcing).await.unwrap();
        assert_eq!(status_of(&h.store, &wf.id).await, WorkflowStatus::Announcing);

        let err = h.orchestrator.request(&wf.id, WorkflowStatus::Archiving).await.unwrap_err();
        assert!(matches!(err, TavernError::InvalidTransition { .. }));
        let err = h.orchestrator.request("ghost", WorkflowStatus::Announcing).await.unwrap_err();
        assert!(matches!(err, TavernError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness_with(OrchestratorConfig {
            tick_interval_secs: 1,
            ..Default::default()
        });
        let (tx, rx) = watch::channel(false);
        let handle = h.orchestrator.clone().spawn(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("orchestrator should stop")
            .unwrap();
    }
}
