//! # Fieldcheck
//!
//! Coordinates field address verification: clients file verification
//! requests, administrators assign them to field agents, agents visit and
//! submit reports, and approved results are pushed back to the client's
//! verification endpoint.
//!
//! ## Task Flow
//! 1. Client creates tasks (`pending`)
//! 2. Admin assigns them to an agent (`assigned`, 48h deadline)
//! 3. Agent submits (`completed`) or rejects (`incomplete`); missed deadlines
//!    are escalated to `over-due` by the daily scan
//! 4. Admin approves the report and the result is pushed to the client
//!
//! ## Modules
//! - `task`: task record, feedback and the transition rules
//! - `store`: persistence (in-memory and SQLite)
//! - `workflow`: lifecycle operations over the store
//! - `scheduler`: daily overdue scan
//! - `dispatch`: result push to client endpoints
//! - `notify`, `report`, `blob`: side-effect adapters
//! - `api`: HTTP surface

pub mod accounts;
pub mod api;
pub mod blob;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod workflow;

pub use config::Config;
pub use error::WorkflowError;
pub use workflow::Workflow;
