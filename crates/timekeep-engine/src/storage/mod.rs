//! `SQLite` storage for timekeep.
//!
//! Provides persistence for employees, terminals, punch facts, daily
//! summaries, enrollments, leave requests and the terminal audit log.
//!
//! Functions taking a `&mut SqliteConnection` are transaction steps; callers
//! pass `&mut *tx` and own the commit.

mod db;
mod models;
mod queries;
mod queries_enrollment;
mod queries_leave;
mod queries_punches;

#[cfg(test)]
mod tests;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use queries_enrollment::EnrollmentParams;
pub use queries_leave::LeaveRequestParams;
pub use queries_punches::{NewPunch, PunchFilter, SummaryFilter};

pub(crate) use queries::{append_audit, insert_terminal_if_absent};
pub(crate) use queries_enrollment::{fetch_enrollment, replace_templates, seed_target_enrollment};
pub(crate) use queries_leave::review_leave_request;
pub(crate) use queries_punches::{
    day_punches, ensure_summary, insert_punch, mark_punch_processed, save_summary,
};
