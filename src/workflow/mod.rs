//! Task lifecycle operations.
//!
//! [`Workflow`] ties the store, blob storage, report rendering, result push
//! and notifications together. Every status change goes through
//! [`TaskStore::transition`](crate::store::TaskStore::transition); side
//! effects that happen after a commit (push, email) are reported in the
//! result instead of undoing the commit.
//!
//! Batch operations work through their ids in order and never stop on a
//! single failing item.

mod approval;
mod assignment;
mod export;
mod intake;
mod reporting;
mod submission;

pub use approval::ApprovalReport;
pub use assignment::{AssignmentReport, SheetAssignment};
pub use export::assignment_sheet_csv;
pub use intake::{IntakeReport, InvalidRequest};
pub use reporting::{AdminDashboard, ClientDashboard, MonthSummary, ReportCounts};
pub use submission::{MediaUpload, RejectionOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::accounts::{Actor, AgentId, Client, ClientId};
use crate::blob::BlobStore;
use crate::dispatch::{DispatchOutcome, ResultPublisher};
use crate::error::WorkflowError;
use crate::notify::Notifier;
use crate::report::ReportGenerator;
use crate::store::{AccountStore, SharedStore, TaskFilter, TaskStore};
use crate::task::{LifecyclePolicy, Precondition, Task, TaskId, TaskStatus};

/// An id from a batch that was not acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: String,
}

/// An id from a batch whose processing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub id: String,
    pub error: String,
}

/// What happened to the result push after a committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum DispatchStatus {
    NotAttempted,
    Skipped,
    Delivered,
    Failed(String),
}

impl From<Result<DispatchOutcome, WorkflowError>> for DispatchStatus {
    fn from(result: Result<DispatchOutcome, WorkflowError>) -> Self {
        match result {
            Ok(DispatchOutcome::Skipped) => DispatchStatus::Skipped,
            Ok(DispatchOutcome::Delivered { .. }) => DispatchStatus::Delivered,
            Err(e) => DispatchStatus::Failed(e.to_string()),
        }
    }
}

pub struct Workflow {
    store: SharedStore,
    blobs: Arc<dyn BlobStore>,
    reports: Arc<dyn ReportGenerator>,
    publisher: Arc<dyn ResultPublisher>,
    notifier: Arc<Notifier>,
    policy: LifecyclePolicy,
}

impl Workflow {
    pub fn new(
        store: SharedStore,
        blobs: Arc<dyn BlobStore>,
        reports: Arc<dyn ReportGenerator>,
        publisher: Arc<dyn ResultPublisher>,
        notifier: Arc<Notifier>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            reports,
            publisher,
            notifier,
            policy,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    async fn load_task(&self, id: TaskId) -> Result<Task, WorkflowError> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {}", id)))
    }

    /// Tasks visible to `actor` matching `filter`.
    ///
    /// Agents only see their own tasks and never pending ones; clients only
    /// see the tasks they created.
    pub async fn list_tasks(
        &self,
        actor: &Actor,
        mut filter: TaskFilter,
    ) -> Result<Vec<Task>, WorkflowError> {
        match actor {
            Actor::Admin => {}
            Actor::Agent(agent_id) => {
                filter.agent_id = Some(*agent_id);
                if filter.statuses.is_empty() {
                    filter.statuses = TaskStatus::ALL
                        .into_iter()
                        .filter(|s| *s != TaskStatus::Pending)
                        .collect();
                }
            }
            Actor::Client(client_id) => filter.client_id = Some(*client_id),
        }
        Ok(self.store.find_tasks(&filter).await?)
    }

    /// Per-status task counts for an agent.
    pub async fn agent_dashboard(
        &self,
        agent_id: AgentId,
    ) -> Result<BTreeMap<TaskStatus, usize>, WorkflowError> {
        if self.store.get_agent(agent_id).await?.is_none() {
            return Err(WorkflowError::NotFound(format!("agent {}", agent_id)));
        }
        Ok(self
            .store
            .count_by_status(&TaskFilter::default().agent(agent_id))
            .await?)
    }

    /// Remove a task that is not being worked.
    pub async fn delete_task(&self, id: TaskId) -> Result<Task, WorkflowError> {
        let deletable: Vec<TaskStatus> = TaskStatus::ALL
            .into_iter()
            .filter(|s| !s.is_being_worked())
            .collect();
        let task = self
            .store
            .delete_task(id, &Precondition::any_of(&deletable))
            .await?;
        tracing::info!("Deleted task {} ({})", task.activity_id, task.status);
        Ok(task)
    }

    async fn client_of(&self, client_id: ClientId) -> Result<Client, WorkflowError> {
        self.store
            .get_client(client_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("client {}", client_id)))
    }

    /// Push a task's result to its client. Errors are returned, never retried.
    async fn dispatch(&self, task: &Task) -> Result<DispatchOutcome, WorkflowError> {
        let client = self.client_of(task.client_id).await?;
        let outcome = self.publisher.publish(task, &client).await.map_err(|e| {
            tracing::error!("Result push for {} failed: {}", task.activity_id, e);
            WorkflowError::from(e)
        })?;
        Ok(outcome)
    }
}

/// Parse a batch id, treating malformed ids like unknown ones.
fn parse_task_id(raw: &str) -> Option<TaskId> {
    raw.parse().ok()
}
