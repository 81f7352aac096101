//! Dashboard statistics and monthly client summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use super::Workflow;
use crate::accounts::ClientId;
use crate::error::WorkflowError;
use crate::store::{AccountStore, TaskFilter, TaskStore};
use crate::task::{Task, TaskStatus};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Reports filed by agents, split by approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub approved: usize,
    pub unapproved: usize,
}

impl ReportCounts {
    fn count(&mut self, task: &Task) {
        if !task.status.has_outcome() {
            return;
        }
        if task.report_is_approved {
            self.approved += 1;
        } else {
            self.unapproved += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.approved + self.unapproved
    }
}

/// Month-to-date task counts across all clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub since: DateTime<Utc>,
    pub total_tasks: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub agent_count: usize,
}

/// Month-to-date task and report counts for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDashboard {
    pub since: DateTime<Utc>,
    pub total_tasks: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    pub reports: ReportCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: u32,
    pub name: &'static str,
    pub total_tasks: usize,
    pub total_reports: usize,
    pub approved_reports: usize,
    pub unapproved_reports: usize,
    pub overdue_tasks: usize,
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let day = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
}

fn start_of_month(now: DateTime<Utc>) -> Result<DateTime<Utc>, WorkflowError> {
    month_start(now.year(), now.month())
        .ok_or_else(|| WorkflowError::Validation(format!("no month start for {}", now)))
}

impl Workflow {
    /// Counts for tasks created since the start of `now`'s month, plus the
    /// number of registered agents.
    pub async fn admin_dashboard(&self, now: DateTime<Utc>) -> Result<AdminDashboard, WorkflowError> {
        let since = start_of_month(now)?;
        let filter = TaskFilter {
            created_from: Some(since),
            ..TaskFilter::default()
        };
        let by_status = self.store.count_by_status(&filter).await?;
        Ok(AdminDashboard {
            since,
            total_tasks: by_status.values().sum(),
            by_status,
            agent_count: self.store.count_agents().await?,
        })
    }

    /// Month-to-date counts for one client's tasks and reports.
    pub async fn client_dashboard(
        &self,
        client_id: ClientId,
        now: DateTime<Utc>,
    ) -> Result<ClientDashboard, WorkflowError> {
        self.client_of(client_id).await?;
        let since = start_of_month(now)?;
        let filter = TaskFilter {
            created_from: Some(since),
            ..TaskFilter::default().client(client_id)
        };
        let tasks = self.store.find_tasks(&filter).await?;

        let mut by_status = BTreeMap::new();
        let mut reports = ReportCounts::default();
        for task in &tasks {
            *by_status.entry(task.status).or_insert(0) += 1;
            reports.count(task);
        }
        Ok(ClientDashboard {
            since,
            total_tasks: tasks.len(),
            by_status,
            reports,
        })
    }

    /// Per-month counts for a client from `start_month` through December of
    /// `year`. Months without tasks are included with zero counts.
    pub async fn client_monthly_summary(
        &self,
        client_id: ClientId,
        year: i32,
        start_month: u32,
    ) -> Result<Vec<MonthSummary>, WorkflowError> {
        if !(1..=12).contains(&start_month) {
            return Err(WorkflowError::Validation(format!(
                "startMonth must be between 1 and 12, got {}",
                start_month
            )));
        }
        self.client_of(client_id).await?;

        let from = month_start(year, start_month)
            .ok_or_else(|| WorkflowError::Validation(format!("invalid year {}", year)))?;
        let to = month_start(year + 1, 1)
            .ok_or_else(|| WorkflowError::Validation(format!("invalid year {}", year)))?;
        let filter = TaskFilter {
            created_from: Some(from),
            ..TaskFilter::default().client(client_id)
        };

        let mut buckets: BTreeMap<u32, (usize, ReportCounts, usize)> =
            (start_month..=12).map(|m| (m, Default::default())).collect();
        for task in self.store.find_tasks(&filter).await? {
            if task.created_at >= to {
                continue;
            }
            if let Some((total, reports, overdue)) = buckets.get_mut(&task.created_at.month()) {
                *total += 1;
                reports.count(&task);
                if task.status == TaskStatus::OverDue {
                    *overdue += 1;
                }
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(month, (total, reports, overdue))| MonthSummary {
                month,
                name: MONTH_NAMES[(month - 1) as usize],
                total_tasks: total,
                total_reports: reports.total(),
                approved_reports: reports.approved,
                unapproved_reports: reports.unapproved,
                overdue_tasks: overdue,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{form, Fixture};
    use super::*;
    use crate::accounts::Client;
    use crate::task::NewTask;
    use crate::workflow::MediaUpload;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    async fn created(fx: &Fixture, activity_id: &str, when: DateTime<Utc>) -> Task {
        let task = Task::new(
            fx.client.id,
            NewTask {
                activity_id: activity_id.to_string(),
                customer_name: "Ada Obi".to_string(),
                verification_address: "12 Marina Road".to_string(),
                state: None,
                city: None,
            },
            when,
        )
        .unwrap();
        fx.store.insert_task(task).await.unwrap()
    }

    #[tokio::test]
    async fn test_admin_dashboard_counts_current_month() {
        let fx = Fixture::new(false).await;
        let now = at(2026, 3, 15);
        created(&fx, "A-1", at(2026, 2, 28)).await;
        created(&fx, "A-2", at(2026, 3, 1)).await;
        let assigned = created(&fx, "A-3", at(2026, 3, 10)).await;
        fx.workflow
            .assign(fx.agent.id, &[assigned.id.to_string()], now)
            .await
            .unwrap();

        let stats = fx.workflow.admin_dashboard(now).await.unwrap();
        assert_eq!(stats.since, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.by_status.get(&TaskStatus::Pending), Some(&1));
        assert_eq!(stats.by_status.get(&TaskStatus::Assigned), Some(&1));
        assert_eq!(stats.agent_count, 1);
    }

    #[tokio::test]
    async fn test_client_dashboard_splits_reports() {
        let fx = Fixture::new(false).await;
        let now = Utc::now();
        let first = fx.assigned("A-1").await;
        let second = fx.assigned("A-2").await;
        fx.assigned("A-3").await;
        for task in [&first, &second] {
            fx.workflow
                .submit(fx.agent.id, task.id, form(), MediaUpload::default())
                .await
                .unwrap();
        }
        fx.workflow
            .approve_reports(&[first.id.to_string()])
            .await
            .unwrap();

        let stats = fx.workflow.client_dashboard(fx.client.id, now).await.unwrap();
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.by_status.get(&TaskStatus::Completed), Some(&2));
        assert_eq!(stats.reports, ReportCounts { approved: 1, unapproved: 1 });

        // Another client sees none of it.
        let other = fx
            .store
            .insert_client(Client::new("Other".to_string(), "other@bank.test".to_string()))
            .await
            .unwrap();
        let empty = fx.workflow.client_dashboard(other.id, now).await.unwrap();
        assert_eq!(empty.total_tasks, 0);
    }

    #[tokio::test]
    async fn test_monthly_summary_buckets() {
        let fx = Fixture::new(false).await;
        created(&fx, "A-1", at(2025, 11, 3)).await;
        created(&fx, "A-2", at(2025, 12, 31)).await;
        created(&fx, "A-3", at(2026, 1, 2)).await;
        created(&fx, "A-4", at(2025, 10, 30)).await;

        let summary = fx
            .workflow
            .client_monthly_summary(fx.client.id, 2025, 11)
            .await
            .unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "November");
        assert_eq!(summary[0].total_tasks, 1);
        assert_eq!(summary[1].month, 12);
        assert_eq!(summary[1].total_tasks, 1);
        assert_eq!(summary[1].total_reports, 0);

        let err = fx
            .workflow
            .client_monthly_summary(fx.client.id, 2025, 13)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
