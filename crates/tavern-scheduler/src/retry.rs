//! Per-campaign failure streaks, optional exponential backoff and alerting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tavern_core::config::OrchestratorConfig;

/// Consecutive failures of one campaign's pending execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureStreak {
    pub failures: u32,
    pub last_error: String,
    /// Earliest time the execution is attempted again.
    pub next_attempt: DateTime<Utc>,
    pub alerted: bool,
}

/// Snapshot for status output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryStats {
    pub failing: usize,
    pub alerted: usize,
    pub max_failures: u32,
}

/// What the caller should do after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    Retry,
    /// The streak just crossed the alert threshold.
    Alert,
}

#[derive(Debug, Default)]
pub struct RetryTracker {
    streaks: HashMap<String, FailureStreak>,
    base_secs: u64,
    max_secs: u64,
    alert_after: u32,
}

impl RetryTracker {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            streaks: HashMap::new(),
            base_secs: config.retry_backoff_base_secs,
            max_secs: config.retry_backoff_max_secs,
            alert_after: config.alert_after_failures,
        }
    }

    /// Whether `workflow_id` is still backing off at `now`.
    pub fn is_deferred(&self, workflow_id: &str, now: DateTime<Utc>) -> bool {
        self.streaks
            .get(workflow_id)
            .is_some_and(|s| s.next_attempt > now)
    }

    pub fn record_failure(
        &mut self,
        workflow_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> FailureVerdict {
        let streak = self
            .streaks
            .entry(workflow_id.to_string())
            .or_insert_with(|| FailureStreak {
                failures: 0,
                last_error: String::new(),
                next_attempt: now,
                alerted: false,
            });
        streak.failures += 1;
        streak.last_error = error.to_string();
        let delay = backoff(self.base_secs, self.max_secs, streak.failures);
        streak.next_attempt = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);

        if self.alert_after > 0 && streak.failures >= self.alert_after && !streak.alerted {
            streak.alerted = true;
            FailureVerdict::Alert
        } else {
            FailureVerdict::Retry
        }
    }

    pub fn record_success(&mut self, workflow_id: &str) {
        self.streaks.remove(workflow_id);
    }

    pub fn streak(&self, workflow_id: &str) -> Option<&FailureStreak> {
        self.streaks.get(workflow_id)
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            failing: self.streaks.len(),
            alerted: self.streaks.values().filter(|s| s.alerted).count(),
            max_failures: self.streaks.values().map(|s| s.failures).max().unwrap_or(0),
        }
    }
}

/// Largest delay `chrono::Duration` can hold in whole seconds.
const MAX_BACKOFF_SECS: u64 = i64::MAX as u64 / 1000;

/// `base * 2^(failures-1)`, capped at `max`. Zero base means no delay.
fn backoff(base_secs: u64, max_secs: u64, failures: u32) -> Duration {
    if base_secs == 0 {
        return Duration::zero();
    }
    let exp = failures.saturating_sub(1).min(32);
    let secs = base_secs
        .saturating_mul(1u64 << exp)
        .min(max_secs)
        .min(MAX_BACKOFF_SECS);
    Duration::try_seconds(secs as i64).unwrap_or(Duration::MAX)
}
