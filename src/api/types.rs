//! Request and response bodies shared by the route modules.

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::accounts::{Agent, Client, Integration};
use crate::notify::{NotificationKind, Recipient};
use crate::store::TaskFilter;
use crate::task::{FeedbackForm, NewTask, TaskStatus};
use crate::workflow::MediaUpload;

pub const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

pub fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
}

/// Query string for task listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub status: Option<String>,
    pub state: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

fn parse_day(raw: &str, field: &str) -> Result<NaiveDate, (StatusCode, String)> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| bad_request(format!("{} must be YYYY-MM-DD", field)))
}

impl TaskQuery {
    /// Build a store filter. For agents, `assigned` also covers over-due
    /// work.
    pub fn filter(&self, for_agent: bool) -> Result<TaskFilter, (StatusCode, String)> {
        let mut filter = TaskFilter::default();

        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => {}
            Some("assigned") if for_agent => {
                filter.statuses = vec![TaskStatus::Assigned, TaskStatus::OverDue];
            }
            Some(raw) => {
                let status: TaskStatus = raw.parse().map_err(|e| bad_request(format!("{}", e)))?;
                filter.statuses.push(status);
            }
        }

        filter.state = self.state.clone().filter(|s| !s.trim().is_empty());
        filter.search = self.search.clone();
        if let Some(raw) = self.start_date.as_deref() {
            filter.created_from = Some(parse_day(raw, "startDate")?.and_time(NaiveTime::MIN).and_utc());
        }
        if let Some(raw) = self.end_date.as_deref() {
            let end = parse_day(raw, "endDate")?
                .and_hms_milli_opt(23, 59, 59, 999)
                .map(|t| t.and_utc());
            filter.created_to = end;
        }
        Ok(filter)
    }

    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);
        let total = items.len();
        let items = items
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(limit))
            .take(limit)
            .collect();
        Page {
            items,
            total,
            page,
            limit,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateTasksRequest {
    pub tasks: Vec<NewTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIdsRequest {
    #[serde(default)]
    pub task_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub comments: String,
}

/// Submission body. Media is sent inline as base64, optionally as a data URL.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub feedback: FeedbackForm,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

fn decode_media(raw: &str, field: &str) -> Result<Vec<u8>, (StatusCode, String)> {
    let data = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    STANDARD
        .decode(data.trim())
        .map_err(|e| bad_request(format!("{} is not valid base64: {}", field, e)))
}

impl SubmitRequest {
    pub fn into_parts(self) -> Result<(FeedbackForm, MediaUpload), (StatusCode, String)> {
        let images = self
            .images
            .iter()
            .enumerate()
            .map(|(i, raw)| decode_media(raw, &format!("images[{}]", i)))
            .collect::<Result<Vec<_>, _>>()?;
        let audio = self
            .audio
            .as_deref()
            .map(|raw| decode_media(raw, "audio"))
            .transpose()?;
        let video = self
            .video
            .as_deref()
            .map(|raw| decode_media(raw, "video"))
            .transpose()?;
        Ok((
            self.feedback,
            MediaUpload {
                images,
                audio,
                video,
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRequest {
    #[serde(default)]
    pub avs_endpoint: String,
    #[serde(default)]
    pub subscription_key: String,
    #[serde(default)]
    pub vendor_external_id: String,
    #[serde(default)]
    pub integration_enabled: bool,
}

impl IntegrationRequest {
    pub fn into_integration(self) -> Result<Integration, (StatusCode, String)> {
        let missing: Vec<&str> = [
            ("avsEndpoint", &self.avs_endpoint),
            ("subscriptionKey", &self.subscription_key),
            ("vendorExternalId", &self.vendor_external_id),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(bad_request(format!("{} required", missing.join(", "))));
        }
        url::Url::parse(self.avs_endpoint.trim())
            .map_err(|e| bad_request(format!("avsEndpoint is not a URL: {}", e)))?;

        Ok(Integration {
            avs_endpoint: self.avs_endpoint.trim().to_string(),
            subscription_key: self.subscription_key.trim().to_string(),
            vendor_external_id: self.vendor_external_id.trim().to_string(),
            integration_enabled: self.integration_enabled,
        })
    }
}

fn require_email(email: &str) -> Result<String, (StatusCode, String)> {
    let email = email.trim();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(bad_request("a valid email is required")),
    }
}

fn require_name(name: &str, field: &str) -> Result<String, (StatusCode, String)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(bad_request(format!("{} is required", field)));
    }
    Ok(name.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

impl CreateAgentRequest {
    pub fn into_agent(self) -> Result<Agent, (StatusCode, String)> {
        Ok(Agent::new(
            require_name(&self.full_name, "fullName")?,
            require_email(&self.email)?,
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub integration: Option<IntegrationRequest>,
}

impl CreateClientRequest {
    pub fn into_client(self) -> Result<Client, (StatusCode, String)> {
        let mut client = Client::new(
            require_name(&self.company_name, "companyName")?,
            require_email(&self.email)?,
        );
        client.integration = self
            .integration
            .map(IntegrationRequest::into_integration)
            .transpose()?;
        Ok(client)
    }
}

/// A created account with a bearer token for it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse<T> {
    pub account: T,
    pub token: Option<String>,
    pub token_expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub recipient: Recipient,
    #[serde(default = "default_kind")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

fn default_kind() -> NotificationKind {
    NotificationKind::Message
}

/// Query for the monthly client summary. Defaults to the current year and month.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub year: Option<i32>,
    pub start_month: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub kind: Option<NotificationKind>,
}
