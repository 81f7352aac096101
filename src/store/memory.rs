//! In-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{newest_first, AccountStore, NotificationStore, StoreError, TaskFilter, TaskStore};
use crate::accounts::{Agent, AgentId, Client, ClientId, Integration};
use crate::notify::{Notification, NotificationKind, Recipient};
use crate::task::{Change, Precondition, Task, TaskId};

/// Store backed by hash maps. Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
    clients: Arc<RwLock<HashMap<ClientId, Client>>>,
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.values().any(|t| t.activity_id == task.activity_id) {
            return Err(StoreError::Duplicate(format!(
                "activity id {}",
                task.activity_id
            )));
        }
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn find_by_activity(&self, activity_id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().find(|t| t.activity_id == activity_id).cloned())
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn transition(
        &self,
        id: TaskId,
        precondition: &Precondition,
        change: &Change,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
        precondition
            .check(task)
            .map_err(|violation| StoreError::Precondition { id, violation })?;
        change.apply(task);
        Ok(task.clone())
    }

    async fn delete_task(
        &self,
        id: TaskId,
        precondition: &Precondition,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
        precondition
            .check(task)
            .map_err(|violation| StoreError::Precondition { id, violation })?;
        tasks
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        let mut agents = self.agents.write().await;
        if agents.values().any(|a| a.email.eq_ignore_ascii_case(&agent.email)) {
            return Err(StoreError::Duplicate(format!("agent email {}", agent.email)));
        }
        agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn count_agents(&self) -> Result<usize, StoreError> {
        Ok(self.agents.read().await.len())
    }

    async fn insert_client(&self, client: Client) -> Result<Client, StoreError> {
        let mut clients = self.clients.write().await;
        if clients
            .values()
            .any(|c| c.email.eq_ignore_ascii_case(&client.email))
        {
            return Err(StoreError::Duplicate(format!(
                "client email {}",
                client.email
            )));
        }
        clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.read().await.get(&id).cloned())
    }

    async fn set_integration(
        &self,
        id: ClientId,
        integration: Option<Integration>,
    ) -> Result<Client, StoreError> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("client {}", id)))?;
        client.integration = integration;
        Ok(client.clone())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        self.notifications.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        recipient: &Recipient,
        kind: Option<NotificationKind>,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.read().await;
        let mut found: Vec<Notification> = notifications
            .iter()
            .filter(|n| &n.recipient == recipient && kind.map_or(true, |k| n.kind == k))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus, Violation};
    use chrono::Utc;

    fn new_task(activity_id: &str) -> Task {
        Task::new(
            ClientId::new(),
            NewTask {
                activity_id: activity_id.to_string(),
                customer_name: "Emeka".to_string(),
                verification_address: "9 Ring Road".to_string(),
                state: None,
                city: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_activity_rejected() {
        let store = MemoryStore::new();
        store.insert_task(new_task("A-1")).await.unwrap();
        let err = store.insert_task(new_task("A-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let store = MemoryStore::new();
        let task = store.insert_task(new_task("A-2")).await.unwrap();
        let now = Utc::now();
        let assign = Change::Assign {
            agent_id: AgentId::new(),
            assigned_at: now,
            deadline: now,
        };

        let pre = Precondition::status(TaskStatus::Pending);
        let assigned = store.transition(task.id, &pre, &assign).await.unwrap();
        assert_eq!(assigned.status, TaskStatus::Assigned);

        let err = store.transition(task.id, &pre, &assign).await.unwrap_err();
        match err {
            StoreError::Precondition { violation, .. } => assert_eq!(
                violation,
                Violation::Status {
                    current: TaskStatus::Assigned
                }
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_respects_precondition() {
        let store = MemoryStore::new();
        let task = store.insert_task(new_task("A-3")).await.unwrap();
        let guard = Precondition::status(TaskStatus::Completed);
        assert!(store.delete_task(task.id, &guard).await.is_err());
        assert!(store.get_task(task.id).await.unwrap().is_some());

        store.delete_task(task.id, &Precondition::any()).await.unwrap();
        assert!(store.get_task(task.id).await.unwrap().is_none());
    }
}
