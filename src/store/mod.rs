//! Persistence for tasks, accounts and notifications.
//!
//! Two backends implement the same traits:
//! - [`MemoryStore`] keeps everything in `RwLock<HashMap>`s (tests, dev mode)
//! - [`SqliteStore`] keeps JSON documents in SQLite with indexed lookup columns
//!
//! Task transitions are conditional: [`TaskStore::transition`] evaluates the
//! precondition and applies the change under one lock or one SQLite
//! transaction, so a stale caller gets [`StoreError::Precondition`] instead of
//! overwriting a newer state.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::accounts::{Actor, Agent, AgentId, Client, ClientId, Integration};
use crate::notify::{Notification, NotificationKind, Recipient};
use crate::task::{Change, Precondition, Task, TaskId, TaskStatus, Violation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("task {id}: {violation}")]
    Precondition { id: TaskId, violation: Violation },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(format!("document encoding: {}", e))
    }
}

/// Selection criteria for task queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub statuses: Vec<TaskStatus>,
    pub agent_id: Option<AgentId>,
    pub client_id: Option<ClientId>,
    /// Only tasks whose deadline is strictly before this instant.
    pub due_before: Option<DateTime<Utc>>,
    /// Case-insensitive match on activity id, customer name or address.
    pub search: Option<String>,
    pub state: Option<String>,
    /// Creation time window, both ends inclusive.
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn due_before(mut self, instant: DateTime<Utc>) -> Self {
        self.due_before = Some(instant);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if self.agent_id.is_some() && task.agent_id != self.agent_id {
            return false;
        }
        if self.client_id.is_some_and(|id| task.client_id != id) {
            return false;
        }
        if let Some(limit) = self.due_before {
            if !task.task_submission_date.is_some_and(|deadline| deadline < limit) {
                return false;
            }
        }
        if let Some(state) = self.state.as_deref() {
            if !task
                .state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(state))
            {
                return false;
            }
        }
        if self.created_from.is_some_and(|from| task.created_at < from)
            || self.created_to.is_some_and(|to| task.created_at > to)
        {
            return false;
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let hit = [
                &task.activity_id,
                &task.customer_name,
                &task.verification_address,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `Duplicate` if the activity id exists.
    async fn insert_task(&self, task: Task) -> Result<Task, StoreError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn find_by_activity(&self, activity_id: &str) -> Result<Option<Task>, StoreError>;

    /// Matching tasks, newest first.
    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// Apply `change` if `precondition` holds on the stored task.
    async fn transition(
        &self,
        id: TaskId,
        precondition: &Precondition,
        change: &Change,
    ) -> Result<Task, StoreError>;

    /// Remove a task if `precondition` holds. Returns the removed task.
    async fn delete_task(&self, id: TaskId, precondition: &Precondition)
        -> Result<Task, StoreError>;

    async fn count_by_status(
        &self,
        filter: &TaskFilter,
    ) -> Result<BTreeMap<TaskStatus, usize>, StoreError> {
        let mut counts = BTreeMap::new();
        for task in self.find_tasks(filter).await? {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert an agent. Fails with `Duplicate` if the email is taken.
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError>;

    async fn count_agents(&self) -> Result<usize, StoreError>;

    /// Insert a client. Fails with `Duplicate` if the email is taken.
    async fn insert_client(&self, client: Client) -> Result<Client, StoreError>;

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;

    async fn set_integration(
        &self,
        id: ClientId,
        integration: Option<Integration>,
    ) -> Result<Client, StoreError>;

    /// Whether the account behind an actor still exists.
    async fn actor_exists(&self, actor: &Actor) -> Result<bool, StoreError> {
        Ok(match actor {
            Actor::Admin => true,
            Actor::Agent(id) => self.get_agent(*id).await?.is_some(),
            Actor::Client(id) => self.get_client(*id).await?.is_some(),
        })
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError>;

    /// Notifications for a recipient, newest first.
    async fn list_notifications(
        &self,
        recipient: &Recipient,
        kind: Option<NotificationKind>,
    ) -> Result<Vec<Notification>, StoreError>;
}

/// Everything the workflow needs from persistence.
pub trait Store: TaskStore + AccountStore + NotificationStore {}

impl<T: TaskStore + AccountStore + NotificationStore> Store for T {}

pub type SharedStore = Arc<dyn Store>;

pub(crate) fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
