//! Core study engine shared by the study service and its embedders.
//!
//! Provides:
//! - Scheduler: due-item selection and grade-to-metadata updates
//! - Review session state machine (no I/O, ticket-gated async results)
//! - Shared types (Item, ReviewMetadata, Grade, etc.)

pub mod error;
pub mod scheduler;
pub mod session;
pub mod types;

pub use error::{Result, SessionError};
pub use scheduler::{
    apply_grade, days_passed, grade_to_loss, normalize_metadata, order_worst_first,
    review_interval_days, select_due, Scheduler,
};
pub use session::{
    GradeRequest, PendingWrite, Phase, Retry, ReviewSession, SessionSnapshot, SessionStats,
    Ticket,
};
pub use types::{Grade, Item, LastStudied, Progress, ReviewMetadata};
