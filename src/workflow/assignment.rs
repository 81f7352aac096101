//! Assigning pending tasks to agents.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{export, parse_task_id, SkippedTask, Workflow};
use crate::accounts::{Agent, AgentId};
use crate::error::WorkflowError;
use crate::store::{AccountStore, StoreError, TaskStore};
use crate::task::{Change, Precondition, Task, TaskId, TaskStatus, Violation};

pub const SHEET_FOLDER: &str = "sheets";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReport {
    pub assigned: usize,
    pub skipped: usize,
    pub assigned_tasks: Vec<Task>,
    pub skipped_tasks: Vec<SkippedTask>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetAssignment {
    pub assigned_tasks: Vec<Task>,
    pub sheet_url: Option<String>,
    /// Whether the agent was emailed the sheet.
    pub notified: bool,
}

fn skip_reason(error: &StoreError) -> String {
    match error {
        StoreError::NotFound(_) => "task not found".to_string(),
        StoreError::Precondition {
            violation: Violation::Status { current },
            ..
        } => format!("task is {}", current),
        other => other.to_string(),
    }
}

impl Workflow {
    async fn agent(&self, agent_id: AgentId) -> Result<Agent, WorkflowError> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("agent {}", agent_id)))
    }

    async fn assign_one(
        &self,
        id: TaskId,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let change = Change::Assign {
            agent_id,
            assigned_at: now,
            deadline: self.policy.deadline_from(now),
        };
        self.store
            .transition(id, &Precondition::status(TaskStatus::Pending), &change)
            .await
    }

    /// Assign each pending task in `task_ids` to an agent.
    ///
    /// Ids that are unknown, malformed or not pending are skipped with a reason.
    pub async fn assign(
        &self,
        agent_id: AgentId,
        task_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<AssignmentReport, WorkflowError> {
        if task_ids.is_empty() {
            return Err(WorkflowError::Validation(
                "taskIds must be a non-empty array".to_string(),
            ));
        }
        let agent = self.agent(agent_id).await?;

        let mut report = AssignmentReport::default();
        for raw in task_ids {
            let Some(id) = parse_task_id(raw) else {
                report.skipped_tasks.push(SkippedTask {
                    task_id: raw.clone(),
                    reason: "task not found".to_string(),
                });
                continue;
            };

            match self.assign_one(id, agent.id, now).await {
                Ok(task) => {
                    tracing::info!("Assigned task {} to {}", task.activity_id, agent.email);
                    report.assigned_tasks.push(task);
                }
                Err(e) => {
                    if matches!(e, StoreError::Backend(_)) {
                        tracing::error!("Assigning task {} failed: {}", id, e);
                    } else {
                        tracing::warn!("Skipped assigning task {}: {}", id, e);
                    }
                    report.skipped_tasks.push(SkippedTask {
                        task_id: raw.clone(),
                        reason: skip_reason(&e),
                    });
                }
            }
        }

        report.assigned = report.assigned_tasks.len();
        report.skipped = report.skipped_tasks.len();
        Ok(report)
    }

    /// Assign the pending tasks among `task_ids` and email the agent a sheet.
    ///
    /// Ids that are not pending are ignored. The sheet upload and email run
    /// after the assignments commit; their failure is reported, not raised.
    pub async fn assign_with_sheet(
        &self,
        agent_id: AgentId,
        task_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<SheetAssignment, WorkflowError> {
        let agent = self.agent(agent_id).await?;

        let mut pending = Vec::new();
        for id in task_ids.iter().filter_map(|raw| parse_task_id(raw)) {
            if let Some(task) = self.store.get_task(id).await? {
                if task.status == TaskStatus::Pending {
                    pending.push(task.id);
                }
            }
        }
        if pending.is_empty() {
            return Err(WorkflowError::NotFound(
                "no pending tasks among the given ids".to_string(),
            ));
        }

        let mut assigned = Vec::with_capacity(pending.len());
        for id in pending {
            match self.assign_one(id, agent.id, now).await {
                Ok(task) => assigned.push(task),
                Err(e) => tracing::warn!("Task {} was not assigned: {}", id, e),
            }
        }
        if assigned.is_empty() {
            return Err(WorkflowError::NotFound(
                "no pending tasks among the given ids".to_string(),
            ));
        }
        tracing::info!("Assigned {} tasks to {} by sheet", assigned.len(), agent.email);

        let csv = export::assignment_sheet_csv(&assigned);
        let name = format!("tasks-{}-{}.csv", agent.id, now.format("%Y%m%d%H%M%S"));
        let (sheet_url, notified) = match self
            .blobs
            .put(SHEET_FOLDER, &name, "text/csv", csv.into_bytes())
            .await
        {
            Ok(url) => {
                let notified = self
                    .notifier
                    .notify_assigned(&agent, assigned.len(), &url)
                    .await;
                (Some(url), notified)
            }
            Err(e) => {
                tracing::warn!("Storing assignment sheet for {} failed: {}", agent.email, e);
                (None, false)
            }
        };

        Ok(SheetAssignment {
            assigned_tasks: assigned,
            sheet_url,
            notified,
        })
    }
}
