//! Result push to client verification endpoints.
//!
//! When a client has an enabled integration, each approved or admin-rejected
//! task is posted once to the client's AVS endpoint with its media inlined as
//! base64. There is no retry; a failed push is reported to the caller and the
//! task keeps its committed state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::accounts::{Client, Integration};
use crate::blob::{BlobError, BlobStore};
use crate::task::{FeedbackView, Task, TaskStatus};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task {0} has no feedback to push")]
    MissingFeedback(String),

    #[error("media fetch failed: {0}")]
    Media(#[from] BlobError),

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending = 1,
    Success = 2,
    Failed = 3,
    Returned = 4,
}

impl Serialize for VerificationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

pub fn verification_status(task: &Task) -> VerificationStatus {
    if !task.report_is_approved {
        return VerificationStatus::Pending;
    }
    match task.status {
        TaskStatus::Completed => VerificationStatus::Success,
        TaskStatus::Incomplete => VerificationStatus::Failed,
        _ => VerificationStatus::Returned,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressMedia {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub content_base64: String,
    pub media_type: u8,
}

impl AddressMedia {
    pub fn image(bytes: &[u8]) -> Self {
        Self {
            file_name: "image.jpg",
            content_type: "image/jpeg",
            content_base64: BASE64.encode(bytes),
            media_type: 1,
        }
    }

    pub fn video(bytes: &[u8]) -> Self {
        Self {
            file_name: "video.mp4",
            content_type: "video/mp4",
            content_base64: BASE64.encode(bytes),
            media_type: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressVerificationResponse {
    pub activity_id: String,
    pub customer_name: String,
    pub address: String,
    pub visit_date: Option<DateTime<Utc>>,
    pub address_exists: bool,
    pub is_residential_address: bool,
    pub is_customer_residence: bool,
    pub is_customer_known: bool,
    pub relationship_with_person_met: String,
    pub name_of_person_met: String,
    pub ease_of_location: String,
    pub comments: String,
    pub additional_comments: String,
    pub received_date: Option<DateTime<Utc>>,
    pub met_others: bool,
    pub verification_status: VerificationStatus,
    pub address_media: Vec<AddressMedia>,
    pub report_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub vendor_id: String,
    pub address_verification_responses: Vec<AddressVerificationResponse>,
}

fn is_yes(answer: &str) -> bool {
    answer == "Yes"
}

/// Build the push body for a task. Media must already be fetched.
pub fn build_payload(
    task: &Task,
    integration: &Integration,
    media: Vec<AddressMedia>,
) -> Result<ResultPayload, DispatchError> {
    let feedback = task
        .feedback
        .as_ref()
        .ok_or_else(|| DispatchError::MissingFeedback(task.activity_id.clone()))?;
    let view = feedback.view();

    Ok(ResultPayload {
        vendor_id: integration.vendor_external_id.clone(),
        address_verification_responses: vec![AddressVerificationResponse {
            activity_id: task.activity_id.clone(),
            customer_name: task.customer_name.clone(),
            address: task.verification_address.clone(),
            visit_date: task.visit_date,
            address_exists: is_yes(view.address_existence),
            is_residential_address: is_yes(view.address_residential),
            is_customer_residence: is_yes(view.customer_resident),
            is_customer_known: is_yes(view.customer_known),
            relationship_with_person_met: view.relationship_with_customer.to_string(),
            name_of_person_met: view.name_of_person_met.to_string(),
            ease_of_location: view.ease_of_location.to_string(),
            comments: view.comments.to_string(),
            additional_comments: view.additional_comments.to_string(),
            received_date: view.received_date,
            met_others: is_yes(view.person_met_others),
            verification_status: verification_status(task),
            address_media: media,
            report_url: view.report_url.map(str::to_string),
        }],
    })
}

async fn collect_media(
    blobs: &dyn BlobStore,
    view: &FeedbackView<'_>,
) -> Result<Vec<AddressMedia>, BlobError> {
    let mut media = Vec::with_capacity(view.geotagged_images.len() + 1);
    for url in view.geotagged_images {
        media.push(AddressMedia::image(&blobs.fetch(url).await?));
    }
    if let Some(url) = view.recorded_video {
        media.push(AddressMedia::video(&blobs.fetch(url).await?));
    }
    Ok(media)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The client has no enabled integration.
    Skipped,
    Delivered { status: u16 },
}

#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, task: &Task, client: &Client) -> Result<DispatchOutcome, DispatchError>;
}

pub struct HttpResultDispatcher {
    http: HttpClient,
    blobs: Arc<dyn BlobStore>,
}

impl HttpResultDispatcher {
    pub fn new(blobs: Arc<dyn BlobStore>, timeout: Duration) -> anyhow::Result<Self> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http, blobs })
    }
}

#[async_trait]
impl ResultPublisher for HttpResultDispatcher {
    async fn publish(&self, task: &Task, client: &Client) -> Result<DispatchOutcome, DispatchError> {
        let Some(integration) = client.enabled_integration() else {
            tracing::debug!(
                "Client {} has no enabled integration, not pushing {}",
                client.id,
                task.activity_id
            );
            return Ok(DispatchOutcome::Skipped);
        };

        let media = match &task.feedback {
            Some(feedback) => collect_media(self.blobs.as_ref(), &feedback.view()).await?,
            None => Vec::new(),
        };
        let payload = build_payload(task, integration, media)?;

        let response = self
            .http
            .post(&integration.avs_endpoint)
            .header("Content-Type", "application/json")
            .header("x-vendor-id", &integration.vendor_external_id)
            .header("Ocp-Apim-Subscription-Key", &integration.subscription_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Transport(format!("request timeout: {}", e))
                } else {
                    DispatchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(
            "Pushed result for {} to {} ({})",
            task.activity_id,
            integration.avs_endpoint,
            status
        );
        Ok(DispatchOutcome::Delivered {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::LocalBlobStore;
    use crate::task::{Feedback, NewTask, RejectedFeedback};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rejected_task() -> Task {
        let mut task = Task::new(
            crate::accounts::ClientId::new(),
            NewTask {
                activity_id: "A-3".to_string(),
                customer_name: "Yemi".to_string(),
                verification_address: "7 Creek Road".to_string(),
                state: None,
                city: None,
            },
            Utc::now(),
        )
        .unwrap();
        task.status = TaskStatus::Incomplete;
        task.report_is_approved = true;
        task.feedback = Some(Feedback::Rejected(RejectedFeedback {
            comments: "No such street".to_string(),
            report_url: Some("http://files/reports/r.pdf".to_string()),
        }));
        task
    }

    fn client_with(endpoint: &str, enabled: bool) -> Client {
        let mut client = Client::new("Acme".to_string(), "ops@acme.test".to_string());
        client.integration = Some(Integration {
            avs_endpoint: endpoint.to_string(),
            subscription_key: "sub-key".to_string(),
            vendor_external_id: "vendor-9".to_string(),
            integration_enabled: enabled,
        });
        client
    }

    fn dispatcher(dir: &std::path::Path) -> HttpResultDispatcher {
        let blobs = Arc::new(LocalBlobStore::new(
            dir.to_path_buf(),
            &Url::parse("http://localhost/files").unwrap(),
        ));
        HttpResultDispatcher::new(blobs, Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn test_status_codes() {
        let mut task = rejected_task();
        assert_eq!(verification_status(&task), VerificationStatus::Failed);
        task.status = TaskStatus::Completed;
        assert_eq!(verification_status(&task), VerificationStatus::Success);
        task.status = TaskStatus::OverDue;
        assert_eq!(verification_status(&task), VerificationStatus::Returned);
        task.report_is_approved = false;
        assert_eq!(verification_status(&task), VerificationStatus::Pending);
    }

    #[test]
    fn test_payload_for_rejection() {
        let task = rejected_task();
        let client = client_with("http://unused", true);
        let payload =
            build_payload(&task, client.integration.as_ref().unwrap(), Vec::new()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        let entry = &value["addressVerificationResponses"][0];
        assert_eq!(value["vendorId"], "vendor-9");
        assert_eq!(entry["verificationStatus"], 3);
        assert_eq!(entry["addressExists"], false);
        assert_eq!(entry["comments"], "No such street");
        assert_eq!(entry["relationshipWithPersonMet"], "N/A");
        assert_eq!(entry["reportUrl"], "http://files/reports/r.pdf");
        assert_eq!(entry["addressMedia"], json!([]));
    }

    #[test]
    fn test_media_entries() {
        let image = serde_json::to_value(AddressMedia::image(b"abc")).unwrap();
        assert_eq!(
            image,
            json!({
                "fileName": "image.jpg",
                "contentType": "image/jpeg",
                "contentBase64": "YWJj",
                "mediaType": 1
            })
        );
        assert_eq!(AddressMedia::video(b"v").media_type, 2);
    }

    #[tokio::test]
    async fn test_push_sends_headers_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/avs"))
            .and(header("x-vendor-id", "vendor-9"))
            .and(header("Ocp-Apim-Subscription-Key", "sub-key"))
            .and(body_partial_json(json!({
                "addressVerificationResponses": [{"activityId": "A-3", "verificationStatus": 3}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = dispatcher(dir.path())
            .publish(&rejected_task(), &client_with(&format!("{}/avs", server.uri()), true))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered { status: 200 });
    }

    #[tokio::test]
    async fn test_disabled_integration_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = dispatcher(dir.path())
            .publish(&rejected_task(), &client_with(&server.uri(), false))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = dispatcher(dir.path())
            .publish(&rejected_task(), &client_with(&server.uri(), true))
            .await
            .unwrap_err();
        match err {
            DispatchError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
