//! Leave request queries.

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use timekeep_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{LeaveRequest, LeaveStatus, LeaveType};

/// Parameters for filing a leave request.
pub struct LeaveRequestParams<'a> {
    pub employee_id: i64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: &'a str,
}

impl Database {
    /// File a pending leave request. `days_count` is the inclusive span.
    pub async fn create_leave_request(
        &self,
        params: &LeaveRequestParams<'_>,
    ) -> Result<LeaveRequest, DatabaseError> {
        let now = unix_timestamp();
        let days_count = (params.end_date - params.start_date).num_days() + 1;

        let result = sqlx::query(
            r"
            INSERT INTO leave_requests
                (employee_id, leave_type, start_date, end_date, days_count, reason, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.employee_id)
        .bind(params.leave_type)
        .bind(params.start_date)
        .bind(params.end_date)
        .bind(days_count)
        .bind(params.reason)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_leave_request(result.last_insert_rowid()).await
    }

    /// Get a leave request by ID.
    pub async fn get_leave_request(&self, id: i64) -> Result<LeaveRequest, DatabaseError> {
        sqlx::query_as::<_, LeaveRequest>("SELECT * FROM leave_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Leave request {id}")))
    }

    /// List leave requests, optionally filtered.
    pub async fn list_leave_requests(
        &self,
        employee_id: Option<i64>,
        status: Option<LeaveStatus>,
    ) -> Result<Vec<LeaveRequest>, DatabaseError> {
        let requests = sqlx::query_as::<_, LeaveRequest>(
            r"
            SELECT * FROM leave_requests
            WHERE (?1 IS NULL OR employee_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(employee_id)
        .bind(status)
        .fetch_all(self.pool())
        .await?;

        Ok(requests)
    }

    /// Withdraw a pending request. Returns `false` if it was not pending.
    pub async fn cancel_leave_request(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE leave_requests SET status = 'cancelled', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Move a pending request to `decision`. Returns `false` when the request is
/// missing or no longer pending.
pub async fn review_leave_request(
    conn: &mut SqliteConnection,
    id: i64,
    decision: LeaveStatus,
    reviewer: &str,
    notes: &str,
) -> Result<bool, DatabaseError> {
    let now = unix_timestamp();

    let result = sqlx::query(
        r"
        UPDATE leave_requests SET
            status = ?,
            reviewed_by = ?,
            review_notes = ?,
            reviewed_at = ?,
            updated_at = ?
        WHERE id = ? AND status = 'pending'
        ",
    )
    .bind(decision)
    .bind(reviewer)
    .bind(notes)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
