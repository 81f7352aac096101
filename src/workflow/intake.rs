//! Client request intake.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FailedItem, Workflow};
use crate::accounts::ClientId;
use crate::error::WorkflowError;
use crate::store::{StoreError, TaskStore};
use crate::task::{NewTask, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidRequest {
    pub index: usize,
    pub activity_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReport {
    pub created: Vec<Task>,
    /// Activity ids that already exist.
    pub duplicates: Vec<String>,
    pub invalid: Vec<InvalidRequest>,
    pub failed: Vec<FailedItem>,
}

impl Workflow {
    /// Create pending tasks for a client, one per request.
    pub async fn create_tasks(
        &self,
        client_id: ClientId,
        requests: Vec<NewTask>,
        now: DateTime<Utc>,
    ) -> Result<IntakeReport, WorkflowError> {
        if requests.is_empty() {
            return Err(WorkflowError::Validation(
                "at least one task is required".to_string(),
            ));
        }
        self.client_of(client_id).await?;

        let mut report = IntakeReport::default();
        for (index, request) in requests.into_iter().enumerate() {
            let activity_id = request.activity_id.trim().to_string();
            let task = match Task::new(client_id, request, now) {
                Ok(task) => task,
                Err(e) => {
                    report.invalid.push(InvalidRequest {
                        index,
                        activity_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.store.find_by_activity(&activity_id).await {
                Ok(Some(_)) => {
                    report.duplicates.push(activity_id);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Duplicate check for {} failed: {}", activity_id, e);
                    report.failed.push(FailedItem {
                        id: activity_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            // A concurrent intake can still win the insert.
            match self.store.insert_task(task).await {
                Ok(task) => report.created.push(task),
                Err(StoreError::Duplicate(_)) => report.duplicates.push(activity_id),
                Err(e) => {
                    tracing::error!("Failed to create task {}: {}", activity_id, e);
                    report.failed.push(FailedItem {
                        id: activity_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Client {} intake: {} created, {} duplicates, {} invalid",
            client_id,
            report.created.len(),
            report.duplicates.len(),
            report.invalid.len()
        );
        Ok(report)
    }
}
