//! Daily overdue scan.
//!
//! One run escalates every assigned task whose deadline has passed and tells
//! the agent. Escalated tasks stop matching the scan, so a task is notified at
//! most once. The loop is per process; running several instances against one
//! database would need external leader election.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::notify::Notifier;
use crate::store::{AccountStore, SharedStore, StoreError, TaskFilter, TaskStore};
use crate::task::{Change, Precondition, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Activity ids moved to over-due in this run.
    pub escalated: Vec<String>,
    pub notified: usize,
    pub notification_failures: usize,
    pub missing_agents: usize,
}

pub struct OverdueScanner {
    store: SharedStore,
    notifier: Arc<Notifier>,
}

impl OverdueScanner {
    pub fn new(store: SharedStore, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Escalate tasks whose deadline is before `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ScanReport, StoreError> {
        let filter = TaskFilter::default()
            .status(TaskStatus::Assigned)
            .due_before(now);
        let due = self.store.find_tasks(&filter).await?;
        let still_assigned = Precondition::status(TaskStatus::Assigned);

        let mut report = ScanReport::default();
        for task in due {
            let task = match self
                .store
                .transition(task.id, &still_assigned, &Change::Escalate)
                .await
            {
                Ok(task) => task,
                Err(StoreError::Backend(e)) => {
                    tracing::error!("Escalating task {} failed: {}", task.activity_id, e);
                    continue;
                }
                // Submitted or rejected since the query.
                Err(e) => {
                    tracing::debug!("Task {} not escalated: {}", task.activity_id, e);
                    continue;
                }
            };
            report.escalated.push(task.activity_id.clone());

            let agent = match task.agent_id {
                Some(agent_id) => self.store.get_agent(agent_id).await.unwrap_or_else(|e| {
                    tracing::error!("Loading agent {} failed: {}", agent_id, e);
                    None
                }),
                None => None,
            };
            let Some(agent) = agent else {
                tracing::warn!("Overdue task {} has no agent to notify", task.activity_id);
                report.missing_agents += 1;
                continue;
            };

            if self.notifier.notify_overdue(&agent, &task).await.any() {
                report.notified += 1;
            } else {
                report.notification_failures += 1;
            }
        }

        tracing::info!(
            "Overdue scan: {} escalated, {} notified, {} notification failures, {} missing agents",
            report.escalated.len(),
            report.notified,
            report.notification_failures,
            report.missing_agents
        );
        Ok(report)
    }

    /// Run the scan once a day at `at` (UTC) until the runtime shuts down.
    pub fn spawn(self: Arc<Self>, at: NaiveTime) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_run_after(now, at);
                tracing::info!("Next overdue scan at {}", next);
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::error!("Overdue scan failed: {}", e);
                }
            }
        })
    }
}

/// The first instant strictly after `now` whose UTC wall-clock time is `at`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
