//! Workflow error taxonomy.

use thiserror::Error;

use crate::blob::BlobError;
use crate::dispatch::DispatchError;
use crate::store::StoreError;
use crate::task::{TaskError, Violation};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("downstream failure: {0}")]
    Downstream(String),
}

impl WorkflowError {
    pub fn validation(problems: &[String]) -> Self {
        WorkflowError::Validation(problems.join("; "))
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => WorkflowError::NotFound(what),
            StoreError::Duplicate(what) => WorkflowError::Conflict(format!("duplicate {}", what)),
            StoreError::Precondition {
                id,
                violation: Violation::Owner,
            } => WorkflowError::Unauthorized(format!("task {} is not assigned to you", id)),
            StoreError::Precondition { id, violation } => {
                WorkflowError::Conflict(format!("task {}: {}", id, violation))
            }
            StoreError::Backend(msg) => WorkflowError::Downstream(msg),
        }
    }
}

impl From<BlobError> for WorkflowError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidName(name) => {
                WorkflowError::Validation(format!("invalid file name {}", name))
            }
            other => WorkflowError::Downstream(other.to_string()),
        }
    }
}

impl From<DispatchError> for WorkflowError {
    fn from(e: DispatchError) -> Self {
        WorkflowError::Downstream(e.to_string())
    }
}

impl From<TaskError> for WorkflowError {
    fn from(e: TaskError) -> Self {
        WorkflowError::Validation(e.to_string())
    }
}
