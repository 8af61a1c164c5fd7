//! Employee, terminal and audit queries.

use sqlx::SqliteConnection;
use timekeep_core::db::unix_timestamp;

use super::db::{Database, DatabaseError};
use super::models::{AuditCategory, AuditEntry, Employee, Resolved, Terminal, TerminalStatus};

impl Database {
    // =========================================================================
    // Employee queries
    // =========================================================================

    /// Look up an employee by code, provisioning a stub record on a miss.
    pub async fn find_or_create_employee(
        &self,
        code: &str,
    ) -> Result<Resolved<Employee>, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        find_or_create_employee(&mut conn, code).await
    }

    /// Insert or refresh an employee from the external directory.
    ///
    /// Clears the stub flag on records provisioned from terminal punches.
    pub async fn upsert_employee(
        &self,
        code: &str,
        name: &str,
        department: Option<&str>,
    ) -> Result<Employee, DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO employees (code, name, department, is_stub, created_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                department = excluded.department,
                is_stub = 0
            ",
        )
        .bind(code)
        .bind(name)
        .bind(department)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_employee_by_code(code).await
    }

    /// Get an employee by ID.
    pub async fn get_employee(&self, id: i64) -> Result<Employee, DatabaseError> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Employee {id}")))
    }

    /// Get an employee by code.
    pub async fn get_employee_by_code(&self, code: &str) -> Result<Employee, DatabaseError> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE code = ?")
            .bind(code)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Employee {code}")))
    }

    /// List employees ordered by code.
    pub async fn list_employees(&self) -> Result<Vec<Employee>, DatabaseError> {
        let employees = sqlx::query_as::<_, Employee>("SELECT * FROM employees ORDER BY code")
            .fetch_all(self.pool())
            .await?;

        Ok(employees)
    }

    // =========================================================================
    // Terminal queries
    // =========================================================================

    /// Get a terminal by ID.
    pub async fn get_terminal(&self, id: i64) -> Result<Terminal, DatabaseError> {
        sqlx::query_as::<_, Terminal>("SELECT * FROM terminals WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Terminal {id}")))
    }

    /// Get a terminal by serial number.
    pub async fn find_terminal_by_serial(
        &self,
        serial: &str,
    ) -> Result<Option<Terminal>, DatabaseError> {
        let terminal =
            sqlx::query_as::<_, Terminal>("SELECT * FROM terminals WHERE serial_number = ?")
                .bind(serial)
                .fetch_optional(self.pool())
                .await?;

        Ok(terminal)
    }

    /// List terminals, optionally filtered by status.
    pub async fn list_terminals(
        &self,
        status_filter: Option<TerminalStatus>,
    ) -> Result<Vec<Terminal>, DatabaseError> {
        let terminals = if let Some(status) = status_filter {
            sqlx::query_as::<_, Terminal>(
                "SELECT * FROM terminals WHERE status = ? ORDER BY serial_number",
            )
            .bind(status)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, Terminal>("SELECT * FROM terminals ORDER BY serial_number")
                .fetch_all(self.pool())
                .await?
        };

        Ok(terminals)
    }

    /// Record contact from a terminal. Any contact marks it online.
    pub async fn touch_terminal(
        &self,
        id: i64,
        ip_address: Option<&str>,
        now: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            UPDATE terminals SET
                last_seen = ?,
                status = 'online',
                ip_address = COALESCE(?, ip_address)
            WHERE id = ?
            ",
        )
        .bind(now)
        .bind(ip_address)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Update terminal status.
    pub async fn update_terminal_status(
        &self,
        id: i64,
        status: TerminalStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE terminals SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Mark online terminals not seen since `cutoff` as offline.
    pub async fn mark_stale_terminals_offline(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE terminals SET status = 'offline' WHERE status = 'online' AND (last_seen IS NULL OR last_seen < ?)",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Audit queries
    // =========================================================================

    /// Append an audit entry outside of any larger unit of work.
    pub async fn append_audit(
        &self,
        terminal_id: i64,
        category: AuditCategory,
        message: &str,
        details: &serde_json::Value,
    ) -> Result<i64, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        append_audit(&mut conn, terminal_id, category, message, details).await
    }

    /// Most recent audit entries for a terminal.
    pub async fn list_audit(
        &self,
        terminal_id: i64,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT * FROM audit_log WHERE terminal_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(terminal_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }

    /// Count audit entries of a category across all terminals.
    pub async fn count_audit(&self, category: AuditCategory) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE category = ?")
            .bind(category.as_str())
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}

/// Insert-or-ignore an employee stub and return the stored row.
pub async fn find_or_create_employee(
    conn: &mut SqliteConnection,
    code: &str,
) -> Result<Resolved<Employee>, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO employees (code, name, is_stub, created_at) VALUES (?, ?, 1, ?) ON CONFLICT(code) DO NOTHING",
    )
    .bind(code)
    .bind(format!("Employee {code}"))
    .bind(unix_timestamp())
    .execute(&mut *conn)
    .await?;

    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE code = ?")
        .bind(code)
        .fetch_one(&mut *conn)
        .await?;

    Ok(if result.rows_affected() > 0 {
        Resolved::Created(employee)
    } else {
        Resolved::Existing(employee)
    })
}

/// Insert-or-ignore a terminal by serial and return the stored row.
///
/// A freshly inserted terminal starts online with `last_seen = now`.
pub async fn insert_terminal_if_absent(
    conn: &mut SqliteConnection,
    serial: &str,
    ip_address: Option<&str>,
) -> Result<Resolved<Terminal>, DatabaseError> {
    let now = unix_timestamp();

    let result = sqlx::query(
        r"
        INSERT INTO terminals (serial_number, name, ip_address, status, last_seen, created_at)
        VALUES (?, ?, ?, 'online', ?, ?)
        ON CONFLICT(serial_number) DO NOTHING
        ",
    )
    .bind(serial)
    .bind(format!("Terminal {serial}"))
    .bind(ip_address)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let terminal = sqlx::query_as::<_, Terminal>("SELECT * FROM terminals WHERE serial_number = ?")
        .bind(serial)
        .fetch_one(&mut *conn)
        .await?;

    Ok(if result.rows_affected() > 0 {
        Resolved::Created(terminal)
    } else {
        Resolved::Existing(terminal)
    })
}

/// Append an audit entry.
pub async fn append_audit(
    conn: &mut SqliteConnection,
    terminal_id: i64,
    category: AuditCategory,
    message: &str,
    details: &serde_json::Value,
) -> Result<i64, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO audit_log (terminal_id, category, message, details, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(terminal_id)
    .bind(category.as_str())
    .bind(message)
    .bind(details.to_string())
    .bind(unix_timestamp())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}
