//! Report approval.

use serde::Serialize;

use super::{parse_task_id, FailedItem, Workflow};
use crate::error::WorkflowError;
use crate::store::{StoreError, TaskStore};
use crate::task::{Change, Precondition, TaskStatus};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalReport {
    pub approved: Vec<String>,
    pub not_found: Vec<String>,
    /// Ids that could not be approved, or whose approval committed but the
    /// result push failed.
    pub failed: Vec<FailedItem>,
}

impl Workflow {
    /// Approve the reports of completed or incomplete tasks and push each
    /// result to its client.
    pub async fn approve_reports(
        &self,
        task_ids: &[String],
    ) -> Result<ApprovalReport, WorkflowError> {
        if task_ids.is_empty() {
            return Err(WorkflowError::Validation(
                "taskIds must be a non-empty array".to_string(),
            ));
        }

        let precondition = Precondition::any_of(&[TaskStatus::Completed, TaskStatus::Incomplete]);
        let mut report = ApprovalReport::default();

        for raw in task_ids {
            let Some(id) = parse_task_id(raw) else {
                report.not_found.push(raw.clone());
                continue;
            };

            let task = match self.store.transition(id, &precondition, &Change::Approve).await {
                Ok(task) => task,
                Err(StoreError::NotFound(_)) => {
                    report.not_found.push(raw.clone());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Could not approve report for task {}: {}", id, e);
                    report.failed.push(FailedItem {
                        id: raw.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            tracing::info!("Approved report for task {}", task.activity_id);

            match self.dispatch(&task).await {
                Ok(_) => report.approved.push(raw.clone()),
                Err(e) => report.failed.push(FailedItem {
                    id: raw.clone(),
                    error: format!("approved, but result push failed: {}", e),
                }),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{form, Fixture, RecordingPublisher};
    use super::*;
    use crate::dispatch::{verification_status, VerificationStatus};
    use crate::task::TaskId;
    use crate::workflow::MediaUpload;

    #[tokio::test]
    async fn test_approval_without_integration_pushes_nothing() {
        let fx = Fixture::new(false).await;
        let task = fx.assigned("A-1").await;
        fx.workflow
            .submit(fx.agent.id, task.id, form(), MediaUpload::default())
            .await
            .unwrap();

        let report = fx
            .workflow
            .approve_reports(&[task.id.to_string()])
            .await
            .unwrap();
        assert_eq!(report.approved, vec![task.id.to_string()]);
        assert!(fx.publisher.pushed.lock().unwrap().is_empty());
        assert!(fx.store.get_task(task.id).await.unwrap().unwrap().report_is_approved);
    }

    #[tokio::test]
    async fn test_approval_collects_breakdown() {
        let fx = Fixture::new(true).await;
        let done = fx.assigned("A-1").await;
        fx.workflow
            .submit(fx.agent.id, done.id, form(), MediaUpload::default())
            .await
            .unwrap();
        let rejected = fx.assigned("A-2").await;
        fx.workflow
            .reject_as_agent(fx.agent.id, rejected.id, "Gated estate, no access")
            .await
            .unwrap();
        let pending = fx.pending("A-3").await;
        let missing = TaskId::new().to_string();

        let report = fx
            .workflow
            .approve_reports(&[
                done.id.to_string(),
                missing.clone(),
                rejected.id.to_string(),
                pending.id.to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(
            report.approved,
            vec![done.id.to_string(), rejected.id.to_string()]
        );
        assert_eq!(report.not_found, vec![missing]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, pending.id.to_string());

        let pushed = fx.publisher.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 2);
        assert_eq!(verification_status(&pushed[0]), VerificationStatus::Success);
        assert_eq!(verification_status(&pushed[1]), VerificationStatus::Failed);
    }

    #[tokio::test]
    async fn test_push_failure_keeps_approval() {
        let publisher = RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        };
        let fx = Fixture::with_publisher(true, publisher).await;
        let task = fx.assigned("A-1").await;
        fx.workflow
            .submit(fx.agent.id, task.id, form(), MediaUpload::default())
            .await
            .unwrap();

        let report = fx
            .workflow
            .approve_reports(&[task.id.to_string()])
            .await
            .unwrap();
        assert!(report.approved.is_empty());
        assert!(report.failed[0].error.contains("push failed"));
        assert!(fx.store.get_task(task.id).await.unwrap().unwrap().report_is_approved);
    }
}
