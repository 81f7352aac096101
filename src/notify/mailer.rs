//! Outbound email through HTTP mail relays.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

/// Posts mail to a list of relays, falling back to the next on failure.
pub struct HttpMailer {
    client: Client,
    relays: Vec<Url>,
    from: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(relays: Vec<Url>, from: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            relays,
            from,
            api_key,
        }
    }

    async fn send_via(&self, relay: &Url, mail: &Mail) -> anyhow::Result<()> {
        let mut request = self
            .client
            .post(relay.clone())
            .header("Content-Type", "application/json")
            .json(&RelayRequest {
                from: &self.from,
                to: &mail.to,
                subject: &mail.subject,
                text: &mail.text,
                html: &mail.html,
            });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("relay returned {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for relay in &self.relays {
            match self.send_via(relay, mail).await {
                Ok(()) => {
                    tracing::debug!("Sent '{}' to {} via {}", mail.subject, mail.to, relay);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Mail relay {} failed: {}", relay, e);
                    failures.push(format!("{}: {}", relay, e));
                }
            }
        }
        if failures.is_empty() {
            anyhow::bail!("no mail relay configured");
        }
        anyhow::bail!("all mail relays failed ({})", failures.join("; "))
    }
}

/// Mailer used when no relay is configured. Every send fails.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        anyhow::bail!("mail delivery is disabled, dropped '{}' to {}", mail.subject, mail.to)
    }
}

pub fn overdue_mail(to: &str, agent_name: &str, activity_id: &str) -> Mail {
    let text = format!(
        "Hello {},\n\nTask {} is overdue. Submit it immediately to avoid a penalty.",
        agent_name, activity_id
    );
    let html = format!(
        "<p>Hello {},</p><p>Task <strong>{}</strong> is overdue. Submit it immediately to avoid a penalty.</p>",
        agent_name, activity_id
    );
    Mail {
        to: to.to_string(),
        subject: "Overdue task".to_string(),
        text,
        html,
    }
}

pub fn assigned_mail(to: &str, agent_name: &str, count: usize, sheet_url: &str) -> Mail {
    let text = format!(
        "Hello {},\n\nYou have been assigned {} new task(s). Complete and submit them within 48 hours.\n\nTask sheet: {}",
        agent_name, count, sheet_url
    );
    let html = format!(
        "<p>Hello {},</p><p>You have been assigned {} new task(s). Complete and submit them within 48 hours.</p><p><a href=\"{}\">Download the task sheet</a></p>",
        agent_name, count, sheet_url
    );
    Mail {
        to: to.to_string(),
        subject: "New tasks assigned".to_string(),
        text,
        html,
    }
}
