//! Punch fact and daily summary queries.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqliteConnection;
use timekeep_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{DailySummary, PunchEvent, PunchRecord};

/// A punch fact about to be stored.
#[derive(Debug, Clone)]
pub struct NewPunch<'a> {
    pub employee_id: i64,
    pub terminal_id: i64,
    pub punched_at: NaiveDateTime,
    pub verify_method: i64,
    pub action_code: i64,
    pub work_code: Option<&'a str>,
    pub temperature: Option<f64>,
}

/// Filters for punch listings. `until` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct PunchFilter {
    pub from: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
    pub employee_code: Option<String>,
    pub terminal_serial: Option<String>,
    pub limit: Option<u32>,
}

/// Filters for daily summary listings. Both bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    pub employee_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

const DEFAULT_PUNCH_LIMIT: u32 = 1000;

impl Database {
    // =========================================================================
    // Punch queries
    // =========================================================================

    /// Get a punch by ID.
    pub async fn get_punch(&self, id: i64) -> Result<PunchEvent, DatabaseError> {
        sqlx::query_as::<_, PunchEvent>("SELECT * FROM punch_events WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Punch {id}")))
    }

    /// Punches of one employee on one date, in time order.
    pub async fn punches_for_day(
        &self,
        employee_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<PunchEvent>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        day_punches(&mut conn, employee_id, date).await
    }

    /// List punches, newest first.
    pub async fn list_punches(&self, filter: &PunchFilter) -> Result<Vec<PunchRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, PunchRecord>(
            r"
            SELECT p.id, e.code AS employee_code, t.serial_number AS terminal_serial,
                   p.punched_at, p.verify_method, p.action_code, p.work_code, p.processed
            FROM punch_events p
            JOIN employees e ON e.id = p.employee_id
            JOIN terminals t ON t.id = p.terminal_id
            WHERE (?1 IS NULL OR p.punched_at >= ?1)
              AND (?2 IS NULL OR p.punched_at < ?2)
              AND (?3 IS NULL OR e.code = ?3)
              AND (?4 IS NULL OR t.serial_number = ?4)
            ORDER BY p.punched_at DESC, p.id DESC
            LIMIT ?5
            ",
        )
        .bind(filter.from)
        .bind(filter.until)
        .bind(filter.employee_code.as_deref())
        .bind(filter.terminal_serial.as_deref())
        .bind(filter.limit.unwrap_or(DEFAULT_PUNCH_LIMIT))
        .fetch_all(self.pool())
        .await?;

        Ok(records)
    }

    /// Count stored punches for an employee.
    pub async fn count_punches(&self, employee_id: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM punch_events WHERE employee_id = ?")
            .bind(employee_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    // =========================================================================
    // Daily summary queries
    // =========================================================================

    /// Get the summary for one employee and date, if any punch or overlay
    /// created it.
    pub async fn get_summary(
        &self,
        employee_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        load_summary(&mut conn, employee_id, date).await
    }

    /// List summaries, oldest date first.
    pub async fn list_summaries(
        &self,
        filter: &SummaryFilter,
    ) -> Result<Vec<DailySummary>, DatabaseError> {
        let summaries = sqlx::query_as::<_, DailySummary>(
            r"
            SELECT * FROM daily_summaries
            WHERE (?1 IS NULL OR employee_id = ?1)
              AND (?2 IS NULL OR work_date >= ?2)
              AND (?3 IS NULL OR work_date <= ?3)
            ORDER BY work_date, employee_id
            ",
        )
        .bind(filter.employee_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(self.pool())
        .await?;

        Ok(summaries)
    }

    /// Store a recomputed summary outside of a punch transaction.
    pub async fn store_summary(&self, summary: &DailySummary) -> Result<DailySummary, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        save_summary(&mut conn, summary).await
    }

    /// Mark a day as approved. Returns `false` when no summary exists.
    pub async fn approve_summary(
        &self,
        employee_id: i64,
        date: NaiveDate,
        approver: &str,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "UPDATE daily_summaries SET is_approved = 1, approved_by = ?, approved_at = ?, updated_at = ? WHERE employee_id = ? AND work_date = ?",
        )
        .bind(approver)
        .bind(now)
        .bind(now)
        .bind(employee_id)
        .bind(date)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Half-open `[00:00, next day 00:00)` bounds of a date.
fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(chrono::NaiveTime::MIN);
    let end = date
        .succ_opt()
        .map_or(NaiveDateTime::MAX, |next| next.and_time(chrono::NaiveTime::MIN));
    (start, end)
}

/// Insert a punch fact unless the `(employee, terminal, timestamp)` tuple is
/// already stored. Returns the new row ID, or `None` for a duplicate.
pub async fn insert_punch(
    conn: &mut SqliteConnection,
    punch: &NewPunch<'_>,
) -> Result<Option<i64>, DatabaseError> {
    let result = sqlx::query(
        r"
        INSERT INTO punch_events
            (employee_id, terminal_id, punched_at, verify_method, action_code,
             work_code, temperature, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(employee_id, terminal_id, punched_at) DO NOTHING
        ",
    )
    .bind(punch.employee_id)
    .bind(punch.terminal_id)
    .bind(punch.punched_at)
    .bind(punch.verify_method)
    .bind(punch.action_code)
    .bind(punch.work_code)
    .bind(punch.temperature)
    .bind(unix_timestamp())
    .execute(&mut *conn)
    .await?;

    Ok((result.rows_affected() > 0).then(|| result.last_insert_rowid()))
}

/// Set the one-way processed flag on a punch.
pub async fn mark_punch_processed(conn: &mut SqliteConnection, id: i64) -> Result<(), DatabaseError> {
    sqlx::query("UPDATE punch_events SET processed = 1, processed_at = ? WHERE id = ? AND processed = 0")
        .bind(unix_timestamp())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Punches of one employee on one date, in time order.
pub async fn day_punches(
    conn: &mut SqliteConnection,
    employee_id: i64,
    date: NaiveDate,
) -> Result<Vec<PunchEvent>, DatabaseError> {
    let (start, end) = day_bounds(date);
    let punches = sqlx::query_as::<_, PunchEvent>(
        "SELECT * FROM punch_events WHERE employee_id = ? AND punched_at >= ? AND punched_at < ? ORDER BY punched_at, id",
    )
    .bind(employee_id)
    .bind(start)
    .bind(end)
    .fetch_all(&mut *conn)
    .await?;

    Ok(punches)
}

/// Create the default summary for one employee and date unless it exists,
/// then return the stored row.
///
/// Being an insert, this takes the write lock when it opens a transaction.
pub async fn ensure_summary(
    conn: &mut SqliteConnection,
    employee_id: i64,
    date: NaiveDate,
) -> Result<DailySummary, DatabaseError> {
    let now = unix_timestamp();

    sqlx::query(
        r"
        INSERT INTO daily_summaries (employee_id, work_date, status, created_at, updated_at)
        VALUES (?, ?, 'absent', ?, ?)
        ON CONFLICT(employee_id, work_date) DO NOTHING
        ",
    )
    .bind(employee_id)
    .bind(date)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    load_summary(conn, employee_id, date)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Summary {employee_id} {date}")))
}

/// Load the summary for one employee and date.
pub async fn load_summary(
    conn: &mut SqliteConnection,
    employee_id: i64,
    date: NaiveDate,
) -> Result<Option<DailySummary>, DatabaseError> {
    let summary = sqlx::query_as::<_, DailySummary>(
        "SELECT * FROM daily_summaries WHERE employee_id = ? AND work_date = ?",
    )
    .bind(employee_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(summary)
}

/// Create or overwrite the mutable fields of a summary and return the stored
/// row. Approval fields are never written here.
pub async fn save_summary(
    conn: &mut SqliteConnection,
    summary: &DailySummary,
) -> Result<DailySummary, DatabaseError> {
    let now = unix_timestamp();

    sqlx::query(
        r"
        INSERT INTO daily_summaries
            (employee_id, work_date, check_in, check_out, work_hours, late_minutes,
             early_leave_minutes, status, overlay, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(employee_id, work_date) DO UPDATE SET
            check_in = excluded.check_in,
            check_out = excluded.check_out,
            work_hours = excluded.work_hours,
            late_minutes = excluded.late_minutes,
            early_leave_minutes = excluded.early_leave_minutes,
            status = excluded.status,
            overlay = excluded.overlay,
            updated_at = excluded.updated_at
        ",
    )
    .bind(summary.employee_id)
    .bind(summary.work_date)
    .bind(summary.check_in)
    .bind(summary.check_out)
    .bind(summary.work_hours)
    .bind(summary.late_minutes)
    .bind(summary.early_leave_minutes)
    .bind(summary.status)
    .bind(summary.overlay)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    load_summary(conn, summary.employee_id, summary.work_date)
        .await?
        .ok_or_else(|| {
            DatabaseError::NotFound(format!(
                "Summary {} {}",
                summary.employee_id, summary.work_date
            ))
        })
}
