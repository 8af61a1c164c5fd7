//! Moving an employee's enrollment from one terminal to another.
//!
//! The target enrollment, template copy and both audit entries are written
//! in a single transaction. The source enrollment is never removed.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;

use crate::error::EngineError;
use crate::observe::{EngineEvent, EngineObserver};
use crate::registry::DeviceRegistry;
use crate::storage::{
    AuditCategory, Database, DatabaseError, Employee, Enrollment, Terminal, append_audit,
    fetch_enrollment, replace_templates, seed_target_enrollment,
};

/// A request to move an employee between terminals.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub employee_code: String,
    pub source_serial: String,
    pub target_serial: String,
    pub copy_templates: bool,
    /// Administrator performing the move, recorded in the audit trail.
    pub moved_by: String,
}

/// What happened to the target enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOutcome {
    Created,
    Updated,
    /// The target already matched the source; no audit entries were written.
    Unchanged,
}

/// Result of a move.
#[derive(Debug, Clone, Serialize)]
pub struct MoveResult {
    pub employee_code: String,
    pub source_serial: String,
    pub target_serial: String,
    /// Whether this call wrote the source templates onto the target.
    pub templates_copied: bool,
    pub target: TargetOutcome,
    pub enrollment: Enrollment,
}

/// Moves enrollments between terminals.
#[derive(Clone)]
pub struct MigrationCoordinator {
    db: Database,
    registry: DeviceRegistry,
    observer: Arc<dyn EngineObserver>,
}

impl MigrationCoordinator {
    pub fn new(db: Database, registry: DeviceRegistry, observer: Arc<dyn EngineObserver>) -> Self {
        Self {
            db,
            registry,
            observer,
        }
    }

    /// Copy an employee's enrollment from the source terminal to the target.
    ///
    /// Preconditions are checked in order: distinct terminals, source
    /// terminal, target terminal, employee, source enrollment. A failure
    /// inside the transaction rolls everything back.
    pub async fn move_employee(&self, request: &MoveRequest) -> Result<MoveResult, EngineError> {
        if request.moved_by.trim().is_empty() {
            return Err(EngineError::InvalidInput("moved_by is empty".into()));
        }
        if request.source_serial == request.target_serial {
            return Err(EngineError::InvalidInput(format!(
                "source and target terminal are both {}",
                request.source_serial
            )));
        }

        let source = self
            .registry
            .require(&request.source_serial, "source terminal")
            .await?;
        let target = self
            .registry
            .require(&request.target_serial, "target terminal")
            .await?;
        let employee = match self.db.get_employee_by_code(&request.employee_code).await {
            Ok(employee) => employee,
            Err(DatabaseError::NotFound(_)) => {
                return Err(EngineError::not_found("employee", &request.employee_code));
            }
            Err(e) => return Err(e.into()),
        };
        if self.db.get_enrollment(source.id, employee.id).await?.is_none() {
            return Err(EngineError::not_found(
                "enrollment",
                format!("{}@{}", request.employee_code, request.source_serial),
            ));
        }

        let mut tx = self.db.pool().begin().await?;
        let (outcome, templates_copied, enrollment) = self
            .transfer(&mut *tx, &employee, &source, &target, request)
            .await
            .map_err(EngineError::Transaction)?;
        tx.commit().await.map_err(|e| EngineError::Transaction(e.into()))?;

        self.observer.record(&EngineEvent::EmployeeMoved {
            employee_code: employee.code.clone(),
            source: source.serial_number.clone(),
            target: target.serial_number.clone(),
            templates_copied,
            changed: outcome != TargetOutcome::Unchanged,
        });

        Ok(MoveResult {
            employee_code: employee.code,
            source_serial: source.serial_number,
            target_serial: target.serial_number,
            templates_copied,
            target: outcome,
            enrollment,
        })
    }

    async fn transfer(
        &self,
        conn: &mut SqliteConnection,
        employee: &Employee,
        source: &Terminal,
        target: &Terminal,
        request: &MoveRequest,
    ) -> Result<(TargetOutcome, bool, Enrollment), DatabaseError> {
        let created = seed_target_enrollment(conn, source.id, target.id, employee.id).await?;

        let missing = |serial: &str| {
            DatabaseError::NotFound(format!("Enrollment {}@{serial}", employee.code))
        };
        let from = fetch_enrollment(conn, source.id, employee.id)
            .await?
            .ok_or_else(|| missing(&source.serial_number))?;
        let to = fetch_enrollment(conn, target.id, employee.id)
            .await?
            .ok_or_else(|| missing(&target.serial_number))?;

        let stale = to.fingerprint_templates.0 != from.fingerprint_templates.0
            || to.face_templates.0 != from.face_templates.0;
        let copied = request.copy_templates && stale;
        if copied {
            replace_templates(
                conn,
                to.id,
                &from.fingerprint_templates.0,
                &from.face_templates.0,
            )
            .await?;
        }

        let outcome = if created {
            TargetOutcome::Created
        } else if copied {
            TargetOutcome::Updated
        } else {
            TargetOutcome::Unchanged
        };

        if outcome != TargetOutcome::Unchanged {
            let details = |side: &str, serial: &str| {
                let mut details = json!({
                    "employee_code": employee.code,
                    "moved_by": request.moved_by,
                    "templates_copied": copied,
                });
                details[side] = json!(serial);
                details
            };
            append_audit(
                conn,
                source.id,
                AuditCategory::EmployeeMoved,
                &format!(
                    "Employee {} moved to {}",
                    employee.code, target.serial_number
                ),
                &details("target", &target.serial_number),
            )
            .await?;
            append_audit(
                conn,
                target.id,
                AuditCategory::EmployeeAdded,
                &format!(
                    "Employee {} added from {}",
                    employee.code, source.serial_number
                ),
                &details("source", &source.serial_number),
            )
            .await?;
        }

        let enrollment = fetch_enrollment(conn, target.id, employee.id)
            .await?
            .ok_or_else(|| missing(&target.serial_number))?;
        Ok((outcome, copied, enrollment))
    }
}
