//! Schedule pass: calendar-driven promotion of stable campaigns into
//! in-flight states. Pure: no side effects, no I/O.
//!
//! Each rule names a *set* of predecessor states, so re-running the pass on a
//! campaign an earlier tick already promoted matches nothing.

use chrono::{DateTime, Utc};
use tavern_core::types::{Workflow, WorkflowStatus};

/// One calendar rule: once `due(workflow)` has passed, a campaign in any of
/// `from` is queued into `to`.
struct ScheduleRule {
    due: fn(&Workflow) -> Option<DateTime<Utc>>,
    from: &'static [WorkflowStatus],
    to: WorkflowStatus,
}

const RULES: [ScheduleRule; 3] = [
    ScheduleRule {
        due: open_submissions_at,
        from: &[WorkflowStatus::Setup, WorkflowStatus::Announced],
        to: WorkflowStatus::OpeningSubs,
    },
    ScheduleRule {
        due: start_voting_at,
        from: &[WorkflowStatus::Submissions],
        to: WorkflowStatus::StartingVoting,
    },
    ScheduleRule {
        due: end_at,
        from: &[WorkflowStatus::Voting],
        to: WorkflowStatus::Ending,
    },
];

fn open_submissions_at(w: &Workflow) -> Option<DateTime<Utc>> {
    w.open_submissions_at
}

fn start_voting_at(w: &Workflow) -> Option<DateTime<Utc>> {
    w.start_voting_at
}

fn end_at(w: &Workflow) -> Option<DateTime<Utc>> {
    w.end_at
}

/// The in-flight state `workflow` should be queued into at `now`, if any.
pub fn scheduled_transition(workflow: &Workflow, now: DateTime<Utc>) -> Option<WorkflowStatus> {
    RULES.iter().find_map(|rule| {
        let due = (rule.due)(workflow)?;
        (due <= now && rule.from.contains(&workflow.status)).then_some(rule.to)
    })
}
