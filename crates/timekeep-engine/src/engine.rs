//! Wiring of the engine components over one database.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use timekeep_core::Config;

use crate::aggregate::Aggregator;
use crate::error::EngineError;
use crate::ingest::Ingestor;
use crate::leave::LeaveOverlay;
use crate::migration::MigrationCoordinator;
use crate::observe::EngineObserver;
use crate::registry::DeviceRegistry;
use crate::report::{AttendanceReport, export_attlog};
use crate::storage::{Database, DatabaseError, PunchFilter, SummaryFilter};

/// All engine components sharing one database and observer.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    registry: DeviceRegistry,
    aggregator: Aggregator,
    ingestor: Ingestor,
    leave: LeaveOverlay,
    migration: MigrationCoordinator,
}

impl Engine {
    pub fn new(db: Database, config: &Config, observer: Arc<dyn EngineObserver>) -> Self {
        let registry = DeviceRegistry::new(
            db.clone(),
            Arc::clone(&observer),
            config.terminals.offline_after_secs,
        );
        let aggregator = Aggregator::new(
            db.clone(),
            config.attendance.clone(),
            Arc::clone(&observer),
        );
        let ingestor = Ingestor::new(
            db.clone(),
            registry.clone(),
            aggregator.clone(),
            Arc::clone(&observer),
        );
        let leave = LeaveOverlay::new(db.clone(), aggregator.clone(), Arc::clone(&observer));
        let migration = MigrationCoordinator::new(db.clone(), registry.clone(), observer);

        Self {
            db,
            registry,
            aggregator,
            ingestor,
            leave,
            migration,
        }
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub const fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub const fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub const fn leave(&self) -> &LeaveOverlay {
        &self.leave
    }

    pub const fn migration(&self) -> &MigrationCoordinator {
        &self.migration
    }

    /// Attendance totals over `[from, to]`, for one employee or everyone.
    pub async fn report(
        &self,
        employee_code: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AttendanceReport, EngineError> {
        check_range(from, to)?;
        let employee_id = match employee_code {
            Some(code) => Some(match self.db.get_employee_by_code(code).await {
                Ok(employee) => employee.id,
                Err(DatabaseError::NotFound(_)) => {
                    return Err(EngineError::not_found("employee", code));
                }
                Err(e) => return Err(e.into()),
            }),
            None => None,
        };

        let summaries = self
            .db
            .list_summaries(&SummaryFilter {
                employee_id,
                from: Some(from),
                to: Some(to),
            })
            .await?;
        Ok(AttendanceReport::from_summaries(&summaries))
    }

    /// Attendance log lines for punches dated `[from, to]`.
    pub async fn export(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        terminal_serial: Option<&str>,
    ) -> Result<String, EngineError> {
        check_range(from, to)?;
        if let Some(serial) = terminal_serial {
            self.registry.require(serial, "terminal").await?;
        }

        let records = self
            .db
            .list_punches(&PunchFilter {
                from: Some(from.and_time(chrono::NaiveTime::MIN)),
                until: to
                    .checked_add_days(Days::new(1))
                    .map(|d| d.and_time(chrono::NaiveTime::MIN)),
                employee_code: None,
                terminal_serial: terminal_serial.map(str::to_string),
                limit: Some(u32::MAX),
            })
            .await?;
        Ok(export_attlog(&records))
    }
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if from > to {
        return Err(EngineError::InvalidInput(format!(
            "range starts {from} after it ends {to}"
        )));
    }
    Ok(())
}
