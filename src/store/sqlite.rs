//! SQLite store.
//!
//! Each record is kept as a JSON document next to the columns used for
//! lookup. Calls run on the blocking pool; transitions run inside an
//! immediate transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Transaction,
    TransactionBehavior,
};
use serde::de::DeserializeOwned;

use super::{newest_first, AccountStore, NotificationStore, StoreError, TaskFilter, TaskStore};
use crate::accounts::{Agent, AgentId, Client, ClientId, Integration};
use crate::notify::{Notification, NotificationKind, Recipient};
use crate::task::{Change, Precondition, Task, TaskId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    activity_id TEXT NOT NULL UNIQUE,
    client_id TEXT NOT NULL,
    agent_id TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_agent ON tasks(agent_id);
CREATE INDEX IF NOT EXISTS idx_tasks_client ON tasks(client_id);

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    doc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    recipient TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL,
    doc TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient);
";

/// Store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Opened task database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn decode<T: DeserializeOwned>(doc: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(doc)?)
}

fn load_task(conn: &Connection, id: TaskId) -> Result<Option<Task>, StoreError> {
    let doc: Option<String> = conn
        .query_row(
            "SELECT doc FROM tasks WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    doc.as_deref().map(decode).transpose()
}

fn write_task(tx: &Transaction<'_>, task: &Task) -> Result<(), StoreError> {
    let doc = serde_json::to_string(task)?;
    tx.execute(
        "UPDATE tasks SET agent_id = ?2, status = ?3, doc = ?4 WHERE id = ?1",
        params![
            task.id.to_string(),
            task.agent_id.map(|id| id.to_string()),
            task.status.as_str(),
            doc,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        self.with_conn(move |conn| {
            let doc = serde_json::to_string(&task)?;
            let inserted = conn.execute(
                "INSERT INTO tasks (id, activity_id, client_id, agent_id, status, created_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    task.id.to_string(),
                    task.activity_id,
                    task.client_id.to_string(),
                    task.agent_id.map(|id| id.to_string()),
                    task.status.as_str(),
                    task.created_at.to_rfc3339(),
                    doc,
                ],
            );
            match inserted {
                Ok(_) => Ok(task),
                Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(format!(
                    "activity id {}",
                    task.activity_id
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.with_conn(move |conn| load_task(conn, id)).await
    }

    async fn find_by_activity(&self, activity_id: &str) -> Result<Option<Task>, StoreError> {
        let activity_id = activity_id.to_string();
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM tasks WHERE activity_id = ?1",
                    params![activity_id],
                    |row| row.get(0),
                )
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut clauses = Vec::new();
            let mut values: Vec<String> = Vec::new();

            if !filter.statuses.is_empty() {
                let marks = vec!["?"; filter.statuses.len()].join(", ");
                clauses.push(format!("status IN ({})", marks));
                values.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
            }
            if let Some(agent_id) = filter.agent_id {
                clauses.push("agent_id = ?".to_string());
                values.push(agent_id.to_string());
            }
            if let Some(client_id) = filter.client_id {
                clauses.push("client_id = ?".to_string());
                values.push(client_id.to_string());
            }

            let mut sql = "SELECT doc FROM tasks".to_string();
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }

            let mut stmt = conn.prepare(&sql)?;
            let docs = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut tasks = Vec::with_capacity(docs.len());
            for doc in docs {
                let task: Task = decode(&doc)?;
                // Deadline and search are evaluated on the document.
                if filter.matches(&task) {
                    tasks.push(task);
                }
            }
            newest_first(&mut tasks);
            Ok(tasks)
        })
        .await
    }

    async fn transition(
        &self,
        id: TaskId,
        precondition: &Precondition,
        change: &Change,
    ) -> Result<Task, StoreError> {
        let precondition = precondition.clone();
        let change = change.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut task =
                load_task(&tx, id)?.ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
            precondition
                .check(&task)
                .map_err(|violation| StoreError::Precondition { id, violation })?;
            change.apply(&mut task);
            write_task(&tx, &task)?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }

    async fn delete_task(
        &self,
        id: TaskId,
        precondition: &Precondition,
    ) -> Result<Task, StoreError> {
        let precondition = precondition.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let task =
                load_task(&tx, id)?.ok_or_else(|| StoreError::NotFound(format!("task {}", id)))?;
            precondition
                .check(&task)
                .map_err(|violation| StoreError::Precondition { id, violation })?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.with_conn(move |conn| {
            let doc = serde_json::to_string(&agent)?;
            match conn.execute(
                "INSERT INTO agents (id, email, doc) VALUES (?1, ?2, ?3)",
                params![agent.id.to_string(), agent.email, doc],
            ) {
                Ok(_) => Ok(agent),
                Err(e) if is_unique_violation(&e) => {
                    Err(StoreError::Duplicate(format!("agent email {}", agent.email)))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM agents WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn count_agents(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn insert_client(&self, client: Client) -> Result<Client, StoreError> {
        self.with_conn(move |conn| {
            let doc = serde_json::to_string(&client)?;
            match conn.execute(
                "INSERT INTO clients (id, email, doc) VALUES (?1, ?2, ?3)",
                params![client.id.to_string(), client.email, doc],
            ) {
                Ok(_) => Ok(client),
                Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate(format!(
                    "client email {}",
                    client.email
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM clients WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn set_integration(
        &self,
        id: ClientId,
        integration: Option<Integration>,
    ) -> Result<Client, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let doc: Option<String> = tx
                .query_row(
                    "SELECT doc FROM clients WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let mut client: Client = decode(
                &doc.ok_or_else(|| StoreError::NotFound(format!("client {}", id)))?,
            )?;
            client.integration = integration;
            tx.execute(
                "UPDATE clients SET doc = ?2 WHERE id = ?1",
                params![id.to_string(), serde_json::to_string(&client)?],
            )?;
            tx.commit()?;
            Ok(client)
        })
        .await
    }
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO notifications (id, recipient, kind, created_at, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    notification.id.to_string(),
                    notification.recipient.key(),
                    notification.kind.as_str(),
                    notification.created_at.to_rfc3339(),
                    serde_json::to_string(&notification)?,
                ],
            )?;
            Ok(notification)
        })
        .await
    }

    async fn list_notifications(
        &self,
        recipient: &Recipient,
        kind: Option<NotificationKind>,
    ) -> Result<Vec<Notification>, StoreError> {
        let recipient = recipient.key();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc FROM notifications WHERE recipient = ?1 ORDER BY created_at DESC",
            )?;
            let docs = stmt
                .query_map(params![recipient], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut found = Vec::with_capacity(docs.len());
            for doc in docs {
                let notification: Notification = decode(&doc)?;
                if kind.map_or(true, |k| notification.kind == k) {
                    found.push(notification);
                }
            }
            Ok(found)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus};
    use chrono::Utc;

    fn new_task(activity_id: &str) -> Task {
        Task::new(
            ClientId::new(),
            NewTask {
                activity_id: activity_id.to_string(),
                customer_name: "Funke Ade".to_string(),
                verification_address: "44 Adeola Odeku".to_string(),
                state: Some("Lagos".to_string()),
                city: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_tasks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/tasks.sqlite");

        let task = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_task(new_task("A-100")).await.unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        assert_eq!(
            store.find_by_activity("A-100").await.unwrap().map(|t| t.id),
            Some(task.id)
        );
    }

    #[tokio::test]
    async fn test_duplicate_activity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.sqlite")).unwrap();
        store.insert_task(new_task("A-1")).await.unwrap();
        let err = store.insert_task(new_task("A-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_transition_updates_indexed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.sqlite")).unwrap();
        let task = store.insert_task(new_task("A-5")).await.unwrap();
        let agent_id = AgentId::new();
        let now = Utc::now();

        store
            .transition(
                task.id,
                &Precondition::status(TaskStatus::Pending),
                &Change::Assign {
                    agent_id,
                    assigned_at: now,
                    deadline: now + chrono::Duration::hours(48),
                },
            )
            .await
            .unwrap();

        let assigned = store
            .find_tasks(&TaskFilter::default().status(TaskStatus::Assigned).agent(agent_id))
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert!(store
            .find_tasks(&TaskFilter::default().status(TaskStatus::Pending))
            .await
            .unwrap()
            .is_empty());

        let err = store
            .transition(
                task.id,
                &Precondition::status(TaskStatus::Pending),
                &Change::Escalate,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Precondition { .. }));

        let counts = store.count_by_status(&TaskFilter::default()).await.unwrap();
        assert_eq!(counts.get(&TaskStatus::Assigned), Some(&1));
    }

    #[tokio::test]
    async fn test_integration_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.sqlite")).unwrap();
        let client = store
            .insert_client(Client::new("Acme".to_string(), "ops@acme.test".to_string()))
            .await
            .unwrap();

        let updated = store
            .set_integration(
                client.id,
                Some(Integration {
                    avs_endpoint: "https://avs.test/push".to_string(),
                    subscription_key: "k".to_string(),
                    vendor_external_id: "v".to_string(),
                    integration_enabled: true,
                }),
            )
            .await
            .unwrap();
        assert!(updated.enabled_integration().is_some());

        let dup = store
            .insert_client(Client::new("Other".to_string(), "OPS@acme.test".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(dup, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_count_agents() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.sqlite")).unwrap();
        assert_eq!(store.count_agents().await.unwrap(), 0);
        for email in ["a@fieldcheck.test", "b@fieldcheck.test"] {
            store
                .insert_agent(Agent::new("Agent".to_string(), email.to_string()))
                .await
                .unwrap();
        }
        assert_eq!(store.count_agents().await.unwrap(), 2);
    }
}
