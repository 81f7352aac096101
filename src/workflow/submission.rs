//! Agent submissions and rejections, plus admin rejection overrides.

use serde::Serialize;
use uuid::Uuid;

use super::{DispatchStatus, Workflow};
use crate::accounts::AgentId;
use crate::error::WorkflowError;
use crate::report::publish_report;
use crate::store::{StoreError, TaskStore};
use crate::task::{
    Change, FeedbackForm, MediaRefs, Precondition, RejectedFeedback, Task, TaskId,
};

/// Decoded media attached to a submission.
#[derive(Debug, Clone, Default)]
pub struct MediaUpload {
    pub images: Vec<Vec<u8>>,
    pub audio: Option<Vec<u8>>,
    pub video: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionOutcome {
    pub task: Task,
    pub dispatch: DispatchStatus,
}

fn require_comments(comments: &str) -> Result<String, WorkflowError> {
    let comments = comments.trim();
    if comments.is_empty() {
        return Err(WorkflowError::Validation(
            "rejection reason (comments) is required".to_string(),
        ));
    }
    Ok(comments.to_string())
}

impl Workflow {
    /// Precondition for agent-side work on a task.
    fn agent_precondition(&self, agent_id: AgentId) -> Precondition {
        Precondition::any_of(&self.policy.agent_workable()).owned_by(agent_id)
    }

    /// Load a task and check the precondition before doing any uploads.
    async fn load_checked(
        &self,
        id: TaskId,
        precondition: &Precondition,
    ) -> Result<Task, WorkflowError> {
        let task = self.load_task(id).await?;
        precondition
            .check(&task)
            .map_err(|violation| StoreError::Precondition { id, violation })?;
        Ok(task)
    }

    /// Render the report for `task` as it will look after `change`.
    async fn report_for(&self, task: &Task, change: &Change) -> Result<String, WorkflowError> {
        let mut preview = task.clone();
        change.apply(&mut preview);
        Ok(publish_report(self.reports.as_ref(), self.blobs.as_ref(), &preview).await?)
    }

    async fn upload_media(&self, id: TaskId, media: MediaUpload) -> Result<MediaRefs, WorkflowError> {
        let mut refs = MediaRefs::default();
        for bytes in media.images {
            let name = format!("{}-{}.jpg", id, Uuid::new_v4());
            refs.images
                .push(self.blobs.put("tasks/images", &name, "image/jpeg", bytes).await?);
        }
        if let Some(bytes) = media.audio {
            let name = format!("{}-{}.mp3", id, Uuid::new_v4());
            refs.audio = Some(self.blobs.put("tasks/audio", &name, "audio/mpeg", bytes).await?);
        }
        if let Some(bytes) = media.video {
            let name = format!("{}-{}.mp4", id, Uuid::new_v4());
            refs.video = Some(self.blobs.put("tasks/video", &name, "video/mp4", bytes).await?);
        }
        Ok(refs)
    }

    /// Confirm an agent may work on a task. Nothing is written.
    pub async fn start_task(&self, agent_id: AgentId, id: TaskId) -> Result<Task, WorkflowError> {
        let task = self.load_task(id).await?;
        if !task.is_assigned_to(agent_id) {
            return Err(WorkflowError::Unauthorized(format!(
                "task {} is not assigned to you",
                id
            )));
        }
        Ok(task)
    }

    /// File a visit report for a task and mark it completed.
    pub async fn submit(
        &self,
        agent_id: AgentId,
        id: TaskId,
        form: FeedbackForm,
        media: MediaUpload,
    ) -> Result<Task, WorkflowError> {
        form.validate().map_err(|p| WorkflowError::validation(&p))?;
        let precondition = self.agent_precondition(agent_id);
        let task = self.load_checked(id, &precondition).await?;

        let refs = self.upload_media(id, media).await?;
        let (mut feedback, visit_date) = form.into_feedback(refs);
        let preview = Change::Complete {
            feedback: feedback.clone(),
            visit_date,
        };
        feedback.report_url = Some(self.report_for(&task, &preview).await?);

        let task = self
            .store
            .transition(
                id,
                &precondition,
                &Change::Complete {
                    feedback,
                    visit_date,
                },
            )
            .await?;
        tracing::info!("Task {} submitted by agent {}", task.activity_id, agent_id);
        Ok(task)
    }

    /// Reject a task as its assigned agent.
    pub async fn reject_as_agent(
        &self,
        agent_id: AgentId,
        id: TaskId,
        comments: &str,
    ) -> Result<Task, WorkflowError> {
        let comments = require_comments(comments)?;
        let precondition = self.agent_precondition(agent_id);
        let task = self.load_checked(id, &precondition).await?;

        let change = self.rejection(&task, comments, false).await?;
        let task = self.store.transition(id, &precondition, &change).await?;
        tracing::info!("Task {} rejected by agent {}", task.activity_id, agent_id);
        Ok(task)
    }

    /// Reject a task as an administrator. The rejection is approved at once
    /// and, when `dispatch` is set, pushed to the client.
    pub async fn reject_as_admin(
        &self,
        id: TaskId,
        comments: &str,
        dispatch: bool,
    ) -> Result<RejectionOutcome, WorkflowError> {
        let comments = require_comments(comments)?;
        let task = self.load_task(id).await?;

        // Only overwrite the state the report was rendered from.
        let precondition = Precondition::status(task.status);
        let change = self.rejection(&task, comments, true).await?;
        let task = self.store.transition(id, &precondition, &change).await?;
        tracing::info!("Task {} rejected by admin", task.activity_id);

        let dispatch = if dispatch {
            DispatchStatus::from(self.dispatch(&task).await)
        } else {
            DispatchStatus::NotAttempted
        };
        Ok(RejectionOutcome { task, dispatch })
    }

    async fn rejection(
        &self,
        task: &Task,
        comments: String,
        approve: bool,
    ) -> Result<Change, WorkflowError> {
        let mut feedback = RejectedFeedback {
            comments,
            report_url: None,
        };
        let preview = Change::Reject {
            feedback: feedback.clone(),
            approve,
        };
        feedback.report_url = Some(self.report_for(task, &preview).await?);
        Ok(Change::Reject { feedback, approve })
    }
}
