//! Lifecycle transitions.
//!
//! Every status change goes through a [`Precondition`] check followed by a
//! [`Change`] applied to the same task snapshot. Stores run the pair
//! atomically, so concurrent writers cannot interleave between them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::feedback::{Feedback, RejectedFeedback, SubmittedFeedback};
use super::task::{Task, TaskStatus};
use crate::accounts::AgentId;

/// What must hold on the stored task before a change may apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precondition {
    /// Allowed current statuses. Empty means any status.
    pub statuses: Vec<TaskStatus>,
    /// Required owner, if any.
    pub agent: Option<AgentId>,
}

impl Precondition {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn status(status: TaskStatus) -> Self {
        Self::any_of(&[status])
    }

    pub fn any_of(statuses: &[TaskStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            agent: None,
        }
    }

    pub fn owned_by(mut self, agent_id: AgentId) -> Self {
        self.agent = Some(agent_id);
        self
    }

    pub fn check(&self, task: &Task) -> Result<(), Violation> {
        if let Some(agent_id) = self.agent {
            if !task.is_assigned_to(agent_id) {
                return Err(Violation::Owner);
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return Err(Violation::Status {
                current: task.status,
            });
        }
        Ok(())
    }
}

/// Why a precondition did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Status { current: TaskStatus },
    Owner,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Status { current } => write!(f, "task is {}", current),
            Violation::Owner => write!(f, "task is not assigned to this agent"),
        }
    }
}

/// A mutation of a task's lifecycle fields.
#[derive(Debug, Clone)]
pub enum Change {
    Assign {
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    Escalate,
    Complete {
        feedback: SubmittedFeedback,
        visit_date: DateTime<Utc>,
    },
    Reject {
        feedback: RejectedFeedback,
        approve: bool,
    },
    Approve,
}

impl Change {
    pub fn apply(&self, task: &mut Task) {
        match self {
            Change::Assign {
                agent_id,
                assigned_at,
                deadline,
            } => {
                task.agent_id = Some(*agent_id);
                task.status = TaskStatus::Assigned;
                task.assigned_date = Some(*assigned_at);
                task.task_submission_date = Some(*deadline);
            }
            Change::Escalate => {
                task.status = TaskStatus::OverDue;
            }
            Change::Complete {
                feedback,
                visit_date,
            } => {
                task.status = TaskStatus::Completed;
                task.feedback = Some(Feedback::Submitted(feedback.clone()));
                task.visit_date = Some(*visit_date);
                task.report_is_approved = false;
            }
            Change::Reject { feedback, approve } => {
                task.status = TaskStatus::Incomplete;
                task.feedback = Some(Feedback::Rejected(feedback.clone()));
                task.task_submission_date = None;
                task.visit_date = None;
                task.report_is_approved = *approve;
            }
            Change::Approve => {
                task.report_is_approved = true;
            }
        }
    }
}

/// Deployment policy for deadlines and late work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Time an agent has from assignment to submission.
    pub sla: Duration,
    /// Whether agents may still submit or reject once a task is over-due.
    pub allow_late_submission: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            sla: Duration::hours(48),
            allow_late_submission: true,
        }
    }
}

impl LifecyclePolicy {
    /// Statuses from which the assigned agent may submit or reject.
    pub fn agent_workable(&self) -> Vec<TaskStatus> {
        let mut statuses = vec![TaskStatus::Assigned, TaskStatus::InProgress];
        if self.allow_late_submission {
            statuses.push(TaskStatus::OverDue);
        }
        statuses
    }

    pub fn deadline_from(&self, assigned_at: DateTime<Utc>) -> DateTime<Utc> {
        assigned_at + self.sla
    }
}
