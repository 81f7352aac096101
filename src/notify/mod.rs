//! Agent and client notifications: in-app inbox entries and email.
//!
//! Delivery failures are logged and reported as booleans. They never fail
//! the lifecycle operation that triggered them.

pub mod mailer;

pub use mailer::{DisabledMailer, HttpMailer, Mail, Mailer};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::{Agent, AgentId, ClientId};
use crate::store::{NotificationStore, SharedStore, StoreError};
use crate::task::Task;

pub const OVERDUE_TITLE: &str = "Overdue task";
pub const OVERDUE_BODY: &str =
    "Your assigned task is overdue. Submit it immediately to avoid a penalty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Agent(AgentId),
    Client(ClientId),
}

impl Recipient {
    /// Stable lookup key, e.g. `agent:<uuid>`.
    pub fn key(&self) -> String {
        match self {
            Recipient::Agent(id) => format!("agent:{}", id),
            Recipient::Client(id) => format!("client:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "report")]
    Report,
    #[serde(rename = "complaint resolution")]
    ComplaintResolution,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Report => "report",
            Self::ComplaintResolution => "complaint resolution",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient: Recipient, kind: NotificationKind, title: String, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            kind,
            title,
            body,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

/// What reached the agent for one overdue task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverdueDelivery {
    pub email: bool,
    pub in_app: bool,
}

impl OverdueDelivery {
    pub fn any(&self) -> bool {
        self.email || self.in_app
    }
}

pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    store: SharedStore,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, store: SharedStore) -> Self {
        Self { mailer, store }
    }

    pub async fn push_in_app(
        &self,
        recipient: Recipient,
        kind: NotificationKind,
        title: String,
        body: String,
    ) -> Result<Notification, StoreError> {
        self.store
            .insert_notification(Notification::new(recipient, kind, title, body))
            .await
    }

    pub async fn notify_overdue(&self, agent: &Agent, task: &Task) -> OverdueDelivery {
        let mut delivery = OverdueDelivery::default();

        let mail = mailer::overdue_mail(&agent.email, &agent.full_name, &task.activity_id);
        match self.mailer.send(&mail).await {
            Ok(()) => delivery.email = true,
            Err(e) => tracing::warn!(
                "Overdue email for task {} to {} failed: {}",
                task.activity_id,
                agent.email,
                e
            ),
        }

        match self
            .push_in_app(
                Recipient::Agent(agent.id),
                NotificationKind::Message,
                OVERDUE_TITLE.to_string(),
                OVERDUE_BODY.to_string(),
            )
            .await
        {
            Ok(_) => delivery.in_app = true,
            Err(e) => tracing::warn!(
                "Overdue in-app notification for task {} failed: {}",
                task.activity_id,
                e
            ),
        }

        delivery
    }

    /// Email an agent a link to their assignment sheet. Returns whether it was sent.
    pub async fn notify_assigned(&self, agent: &Agent, count: usize, sheet_url: &str) -> bool {
        let mail = mailer::assigned_mail(&agent.email, &agent.full_name, count, sheet_url);
        match self.mailer.send(&mail).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Assignment email to {} failed: {}", agent.email, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::Client;
    use crate::store::MemoryStore;
    use crate::task::NewTask;

    #[test]
    fn test_wire_names() {
        let id = AgentId::new();
        let value = serde_json::to_value(Recipient::Agent(id)).unwrap();
        assert_eq!(value["type"], "agent");
        assert_eq!(
            serde_json::to_string(&NotificationKind::ComplaintResolution).unwrap(),
            "\"complaint resolution\""
        );
        assert_eq!(Recipient::Agent(id).key(), format!("agent:{}", id));
    }

    #[tokio::test]
    async fn test_overdue_records_in_app_even_when_mail_fails() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Notifier::new(Arc::new(DisabledMailer), store.clone());
        let agent = Agent::new("Kemi Ade".to_string(), "kemi@fieldcheck.test".to_string());
        let client = Client::new("Acme".to_string(), "ops@acme.test".to_string());
        let task = Task::new(
            client.id,
            NewTask {
                activity_id: "A-9".to_string(),
                customer_name: "Musa".to_string(),
                verification_address: "1 Bank Road".to_string(),
                state: None,
                city: None,
            },
            Utc::now(),
        )
        .unwrap();

        let delivery = notifier.notify_overdue(&agent, &task).await;
        assert!(!delivery.email);
        assert!(delivery.in_app);

        let inbox = store
            .list_notifications(&Recipient::Agent(agent.id), None)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, OVERDUE_TITLE);
        assert_eq!(inbox[0].body, OVERDUE_BODY);
    }
}
