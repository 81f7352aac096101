//! HTTP API.

mod admin;
mod agent;
pub mod auth;
mod client;
pub mod routes;
pub mod types;

pub use routes::{router, serve, AppState};

use std::str::FromStr;

use axum::http::StatusCode;

use crate::error::WorkflowError;
use crate::store::StoreError;

impl From<WorkflowError> for (StatusCode, String) {
    fn from(e: WorkflowError) -> Self {
        let status = match &e {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Unauthorized(_) => StatusCode::FORBIDDEN,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Conflict(_) => StatusCode::CONFLICT,
            WorkflowError::Downstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, e.to_string())
    }
}

impl From<StoreError> for (StatusCode, String) {
    fn from(e: StoreError) -> Self {
        WorkflowError::from(e).into()
    }
}

/// Parse an id from the path, answering 404 for malformed ids.
fn path_id<T: FromStr>(raw: &str, what: &str) -> Result<T, (StatusCode, String)> {
    raw.parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("{} {} not found", what, raw)))
}
