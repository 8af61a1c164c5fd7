//! Enrollment queries.

use sqlx::SqliteConnection;
use sqlx::types::Json;
use timekeep_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::Enrollment;

/// Parameters for enrolling an employee on a terminal.
pub struct EnrollmentParams<'a> {
    pub terminal_id: i64,
    pub employee_id: i64,
    pub device_user_id: &'a str,
    pub fingerprint_templates: &'a [String],
    pub face_templates: &'a [String],
    pub card_number: Option<&'a str>,
    pub privilege: i64,
    pub password_hash: Option<&'a str>,
}

impl Database {
    /// Create or replace an enrollment. The record owes a sync afterwards.
    pub async fn enroll(&self, params: &EnrollmentParams<'_>) -> Result<Enrollment, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO enrollments
                (terminal_id, employee_id, device_user_id, fingerprint_templates,
                 face_templates, card_number, privilege, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(terminal_id, employee_id) DO UPDATE SET
                device_user_id = excluded.device_user_id,
                fingerprint_templates = excluded.fingerprint_templates,
                face_templates = excluded.face_templates,
                card_number = excluded.card_number,
                privilege = excluded.privilege,
                password_hash = excluded.password_hash,
                is_synced = 0,
                synced_at = NULL,
                updated_at = excluded.updated_at
            ",
        )
        .bind(params.terminal_id)
        .bind(params.employee_id)
        .bind(params.device_user_id)
        .bind(Json(params.fingerprint_templates))
        .bind(Json(params.face_templates))
        .bind(params.card_number)
        .bind(params.privilege)
        .bind(params.password_hash)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_enrollment(params.terminal_id, params.employee_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!(
                    "Enrollment {}/{}",
                    params.terminal_id, params.employee_id
                ))
            })
    }

    /// Get the enrollment of an employee on a terminal.
    pub async fn get_enrollment(
        &self,
        terminal_id: i64,
        employee_id: i64,
    ) -> Result<Option<Enrollment>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        fetch_enrollment(&mut conn, terminal_id, employee_id).await
    }

    /// All terminals an employee is enrolled on.
    pub async fn list_enrollments_for_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<Enrollment>, DatabaseError> {
        let enrollments = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE employee_id = ? ORDER BY terminal_id",
        )
        .bind(employee_id)
        .fetch_all(self.pool())
        .await?;

        Ok(enrollments)
    }

    /// Enrollments on a terminal that still owe a push to the device.
    pub async fn list_pending_sync(&self, terminal_id: i64) -> Result<Vec<Enrollment>, DatabaseError> {
        let enrollments = sqlx::query_as::<_, Enrollment>(
            "SELECT * FROM enrollments WHERE terminal_id = ? AND is_synced = 0 ORDER BY id",
        )
        .bind(terminal_id)
        .fetch_all(self.pool())
        .await?;

        Ok(enrollments)
    }

    /// Record that the terminal received the enrollment.
    pub async fn mark_enrollment_synced(
        &self,
        terminal_id: i64,
        employee_id: i64,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "UPDATE enrollments SET is_synced = 1, synced_at = ?, updated_at = ? WHERE terminal_id = ? AND employee_id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(terminal_id)
        .bind(employee_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count enrollment rows for a terminal/employee pair.
    pub async fn count_enrollments(
        &self,
        terminal_id: i64,
        employee_id: i64,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM enrollments WHERE terminal_id = ? AND employee_id = ?",
        )
        .bind(terminal_id)
        .bind(employee_id)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }
}

/// Get the enrollment of an employee on a terminal.
pub async fn fetch_enrollment(
    conn: &mut SqliteConnection,
    terminal_id: i64,
    employee_id: i64,
) -> Result<Option<Enrollment>, DatabaseError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE terminal_id = ? AND employee_id = ?",
    )
    .bind(terminal_id)
    .bind(employee_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(enrollment)
}

/// Create the target enrollment from the source's identity fields unless the
/// target pair already exists. Returns `true` when a row was inserted.
///
/// Templates are not seeded; the caller copies them explicitly.
pub async fn seed_target_enrollment(
    conn: &mut SqliteConnection,
    source_terminal_id: i64,
    target_terminal_id: i64,
    employee_id: i64,
) -> Result<bool, DatabaseError> {
    let now = unix_timestamp();

    // The WHERE clause is required for SQLite to parse ON CONFLICT after a
    // SELECT.
    let result = sqlx::query(
        r"
        INSERT INTO enrollments
            (terminal_id, employee_id, device_user_id, card_number, privilege,
             password_hash, created_at, updated_at)
        SELECT ?, employee_id, device_user_id, card_number, privilege, password_hash, ?, ?
        FROM enrollments
        WHERE terminal_id = ? AND employee_id = ?
        ON CONFLICT(terminal_id, employee_id) DO NOTHING
        ",
    )
    .bind(target_terminal_id)
    .bind(now)
    .bind(now)
    .bind(source_terminal_id)
    .bind(employee_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite an enrollment's templates and flag it as owing a sync.
pub async fn replace_templates(
    conn: &mut SqliteConnection,
    enrollment_id: i64,
    fingerprint_templates: &[String],
    face_templates: &[String],
) -> Result<(), DatabaseError> {
    sqlx::query(
        r"
        UPDATE enrollments SET
            fingerprint_templates = ?,
            face_templates = ?,
            is_synced = 0,
            synced_at = NULL,
            updated_at = ?
        WHERE id = ?
        ",
    )
    .bind(Json(fingerprint_templates))
    .bind(Json(face_templates))
    .bind(unix_timestamp())
    .bind(enrollment_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
