//! Task module - the verification task entity, its feedback report and the
//! transition rules of the task lifecycle.
//!
//! The lifecycle is expressed as data:
//! - [`Precondition`] describes what must hold for a transition to apply
//! - [`Change`] describes the mutation itself
//!
//! Stores evaluate both under a single lock or transaction, so a transition
//! either applies completely or not at all.

pub mod feedback;
pub mod task;
pub mod transition;

pub use feedback::{
    Answer, AreaProfile, Feedback, FeedbackForm, FeedbackView, GeoPoint, MediaRefs,
    RejectedFeedback, SubmittedFeedback, NOT_APPLICABLE,
};
pub use task::{NewTask, Task, TaskError, TaskId, TaskStatus};
pub use transition::{Change, LifecyclePolicy, Precondition, Violation};
