//! The verification task entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::feedback::Feedback;
use crate::accounts::{AgentId, ClientId};

/// Internal task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle status of a task.
///
/// `InProgress` is never written by a transition; it exists so that listings,
/// statistics and the deletion guard can name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Incomplete,
    OverDue,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        Self::Pending,
        Self::Assigned,
        Self::InProgress,
        Self::Incomplete,
        Self::OverDue,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::Incomplete => "incomplete",
            Self::OverDue => "over-due",
            Self::Completed => "completed",
        }
    }

    /// True while an agent is expected to be working the task.
    pub fn is_being_worked(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::OverDue)
    }

    /// True once the agent has filed an outcome (submission or rejection).
    pub fn has_outcome(&self) -> bool {
        matches!(self, Self::Completed | Self::Incomplete)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both the stored spelling and the camelCase filter names.
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in-progress" | "inProgress" => Ok(Self::InProgress),
            "incomplete" | "inComplete" => Ok(Self::Incomplete),
            "over-due" | "overDue" => Ok(Self::OverDue),
            "completed" => Ok(Self::Completed),
            other => Err(TaskError::UnknownStatus(other.to_string())),
        }
    }
}

/// Errors raised while building or parsing task values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("unknown task status: {0}")]
    UnknownStatus(String),
}

/// A verification request as submitted by a client, before it becomes a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub activity_id: String,
    pub customer_name: String,
    pub verification_address: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl NewTask {
    fn validate(&self) -> Result<(), TaskError> {
        if self.activity_id.trim().is_empty() {
            return Err(TaskError::MissingField("activityId"));
        }
        if self.customer_name.trim().is_empty() {
            return Err(TaskError::MissingField("customerName"));
        }
        if self.verification_address.trim().is_empty() {
            return Err(TaskError::MissingField("verificationAddress"));
        }
        Ok(())
    }
}

/// A single address verification assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub activity_id: String,
    pub client_id: ClientId,
    pub agent_id: Option<AgentId>,
    pub customer_name: String,
    pub verification_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_date: Option<DateTime<Utc>>,
    /// Submission deadline. Only meaningful while the task is assigned.
    pub task_submission_date: Option<DateTime<Utc>>,
    pub visit_date: Option<DateTime<Utc>>,
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub report_is_approved: bool,
}

impl Task {
    /// Create a pending, unassigned task owned by `client_id`.
    pub fn new(client_id: ClientId, request: NewTask, now: DateTime<Utc>) -> Result<Self, TaskError> {
        request.validate()?;
        Ok(Self {
            id: TaskId::new(),
            activity_id: request.activity_id.trim().to_string(),
            client_id,
            agent_id: None,
            customer_name: request.customer_name.trim().to_string(),
            verification_address: request.verification_address.trim().to_string(),
            state: request.state.filter(|s| !s.trim().is_empty()),
            city: request.city.filter(|s| !s.trim().is_empty()),
            status: TaskStatus::Pending,
            created_at: now,
            assigned_date: None,
            task_submission_date: None,
            visit_date: None,
            feedback: None,
            report_is_approved: false,
        })
    }

    pub fn report_url(&self) -> Option<&str> {
        self.feedback.as_ref().and_then(|f| f.report_url())
    }

    /// An assigned task whose deadline lies strictly before `now`.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Assigned
            && self.task_submission_date.map_or(false, |deadline| deadline < now)
    }

    pub fn is_assigned_to(&self, agent_id: AgentId) -> bool {
        self.agent_id == Some(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(activity_id: &str) -> NewTask {
        NewTask {
            activity_id: activity_id.to_string(),
            customer_name: "Ada Obi".to_string(),
            verification_address: "12 Marina Road".to_string(),
            state: Some("Lagos".to_string()),
            city: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_new_task_is_pending_and_unassigned() {
        let task = Task::new(ClientId::new(), request(" A-100 "), Utc::now()).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.agent_id.is_none());
        assert_eq!(task.activity_id, "A-100");
        assert_eq!(task.state.as_deref(), Some("Lagos"));
        assert!(task.city.is_none());
        assert!(!task.report_is_approved);
    }

    #[test]
    fn test_new_task_requires_fields() {
        let err = Task::new(ClientId::new(), request(""), Utc::now()).unwrap_err();
        assert_eq!(err, TaskError::MissingField("activityId"));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::OverDue).unwrap(),
            "\"over-due\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!("overDue".parse::<TaskStatus>().unwrap(), TaskStatus::OverDue);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_overdue_requires_assigned_and_past_deadline() {
        let now = Utc::now();
        let mut task = Task::new(ClientId::new(), request("A-1"), now).unwrap();
        task.task_submission_date = Some(now - chrono::Duration::hours(1));
        assert!(!task.is_overdue_at(now));

        task.status = TaskStatus::Assigned;
        assert!(task.is_overdue_at(now));
        assert!(!task.is_overdue_at(now - chrono::Duration::hours(2)));
    }
}
