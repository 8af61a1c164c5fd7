//! Punch ingestion: deduplicate, persist, aggregate.
//!
//! A punch is stored, folded into its day's summary and marked processed in
//! one transaction while the employee-day lock is held. Storage uniqueness
//! on `(employee, terminal, timestamp)` decides duplicates.

pub mod attlog;

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::aggregate::Aggregator;
use crate::error::EngineError;
use crate::observe::{EngineEvent, EngineObserver};
use crate::registry::DeviceRegistry;
use crate::storage::{
    ActionCode, DailySummary, Database, DatabaseError, Employee, NewPunch, Terminal, VerifyMethod,
    insert_punch, mark_punch_processed,
};

pub use attlog::{LineError, RawPunch, parse_line};

/// One punch as reported by a terminal.
#[derive(Debug, Clone)]
pub struct PunchRequest {
    pub employee_code: String,
    pub terminal_serial: String,
    pub punched_at: NaiveDateTime,
    pub verify_method: VerifyMethod,
    pub action_code: ActionCode,
    pub work_code: Option<String>,
    pub temperature: Option<f64>,
}

impl PunchRequest {
    pub fn new(
        employee_code: impl Into<String>,
        terminal_serial: impl Into<String>,
        punched_at: NaiveDateTime,
        action_code: ActionCode,
    ) -> Self {
        Self {
            employee_code: employee_code.into(),
            terminal_serial: terminal_serial.into(),
            punched_at,
            verify_method: VerifyMethod::Fingerprint,
            action_code,
            work_code: None,
            temperature: None,
        }
    }
}

/// A newly stored punch and the summary it produced.
#[derive(Debug, Clone)]
pub struct PunchReceipt {
    pub punch_id: i64,
    pub summary: DailySummary,
}

/// Result of ingesting one punch.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created(PunchReceipt),
    /// The identical punch was stored earlier; nothing changed.
    AlreadyExists,
}

impl IngestOutcome {
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// A batch line that was not ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based position in the batch.
    pub line_no: usize,
    pub reason: String,
}

/// Counts from a batch push.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub duplicates: usize,
    pub skipped: Vec<SkippedLine>,
}

impl BatchReport {
    pub fn accepted(&self) -> usize {
        self.created + self.duplicates
    }
}

/// Accepts punches from terminals.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    registry: DeviceRegistry,
    aggregator: Aggregator,
    observer: Arc<dyn EngineObserver>,
}

impl Ingestor {
    pub fn new(
        db: Database,
        registry: DeviceRegistry,
        aggregator: Aggregator,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self {
            db,
            registry,
            aggregator,
            observer,
        }
    }

    /// Ingest one punch. A repeat of a stored punch is `AlreadyExists`.
    pub async fn ingest(&self, request: &PunchRequest) -> Result<IngestOutcome, EngineError> {
        let terminal = self
            .registry
            .resolve_or_register(&request.terminal_serial, None)
            .await?
            .into_inner();
        self.record(&terminal, request).await
    }

    /// Ingest a push body of ATTLOG lines from one terminal.
    ///
    /// Lines that fail to decode or store are skipped and reported; the rest
    /// of the batch proceeds. Only failing to resolve the terminal fails the
    /// whole call.
    pub async fn ingest_batch(
        &self,
        serial: &str,
        ip_address: Option<&str>,
        body: &str,
    ) -> Result<BatchReport, EngineError> {
        let terminal = self
            .registry
            .resolve_or_register(serial, ip_address)
            .await?
            .into_inner();

        let mut report = BatchReport::default();
        for (idx, line) in body.lines().enumerate() {
            let line_no = idx + 1;
            let result = match parse_line(line) {
                Ok(None) => continue,
                Ok(Some(raw)) => {
                    let request = PunchRequest {
                        employee_code: raw.employee_code,
                        terminal_serial: terminal.serial_number.clone(),
                        punched_at: raw.punched_at,
                        verify_method: raw.verify_method,
                        action_code: raw.action_code,
                        work_code: raw.work_code,
                        temperature: None,
                    };
                    self.record(&terminal, &request)
                        .await
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(IngestOutcome::Created(_)) => report.created += 1,
                Ok(IngestOutcome::AlreadyExists) => report.duplicates += 1,
                Err(reason) => {
                    self.observer.record(&EngineEvent::LineSkipped {
                        serial: terminal.serial_number.clone(),
                        line_no,
                        reason: reason.clone(),
                    });
                    report.skipped.push(SkippedLine { line_no, reason });
                }
            }
        }

        self.observer.record(&EngineEvent::BatchCompleted {
            serial: terminal.serial_number.clone(),
            created: report.created,
            duplicates: report.duplicates,
            skipped: report.skipped.len(),
        });
        Ok(report)
    }

    async fn record(
        &self,
        terminal: &Terminal,
        request: &PunchRequest,
    ) -> Result<IngestOutcome, EngineError> {
        let code = request.employee_code.trim();
        if code.is_empty() {
            return Err(EngineError::InvalidInput("employee code is empty".into()));
        }

        let resolved = self.db.find_or_create_employee(code).await?;
        if resolved.was_created() {
            self.observer.record(&EngineEvent::EmployeeProvisioned {
                code: code.to_string(),
            });
        }
        let employee = resolved.into_inner();

        let _guard = self
            .aggregator
            .lock_day(employee.id, request.punched_at.date())
            .await;

        let mut tx = self.db.pool().begin().await?;
        let stored = self
            .store(&mut *tx, &employee, terminal, request)
            .await
            .map_err(EngineError::Transaction)?;

        let Some(receipt) = stored else {
            tx.rollback().await?;
            self.observer.record(&EngineEvent::DuplicatePunch {
                employee_code: employee.code,
                serial: terminal.serial_number.clone(),
                punched_at: request.punched_at,
            });
            return Ok(IngestOutcome::AlreadyExists);
        };
        tx.commit().await?;

        self.observer.record(&EngineEvent::PunchRecorded {
            employee_code: employee.code,
            serial: terminal.serial_number.clone(),
            punched_at: request.punched_at,
            action_code: request.action_code.code(),
        });
        Ok(IngestOutcome::Created(receipt))
    }

    async fn store(
        &self,
        conn: &mut SqliteConnection,
        employee: &Employee,
        terminal: &Terminal,
        request: &PunchRequest,
    ) -> Result<Option<PunchReceipt>, DatabaseError> {
        let punch = NewPunch {
            employee_id: employee.id,
            terminal_id: terminal.id,
            punched_at: request.punched_at,
            verify_method: request.verify_method.code(),
            action_code: request.action_code.code(),
            work_code: request.work_code.as_deref(),
            temperature: request.temperature,
        };

        let Some(punch_id) = insert_punch(conn, &punch).await? else {
            return Ok(None);
        };
        let summary = self
            .aggregator
            .apply(conn, employee, request.punched_at.date())
            .await?;
        mark_punch_processed(conn, punch_id).await?;

        Ok(Some(PunchReceipt { punch_id, summary }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::MemoryObserver;
    use crate::storage::SummaryStatus;
    use timekeep_core::config::AttendanceConfig;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, attlog::TIMESTAMP_FORMAT).unwrap()
    }

    async fn ingestor() -> (Ingestor, Database, MemoryObserver) {
        let db = Database::open_in_memory().await.unwrap();
        let observer = MemoryObserver::new();
        let shared: Arc<dyn EngineObserver> = Arc::new(observer.clone());
        let registry = DeviceRegistry::new(db.clone(), Arc::clone(&shared), 300);
        let aggregator =
            Aggregator::new(db.clone(), AttendanceConfig::default(), Arc::clone(&shared));
        (
            Ingestor::new(db.clone(), registry, aggregator, shared),
            db,
            observer,
        )
    }

    #[tokio::test]
    async fn repeat_punch_is_already_exists() {
        let (ingestor, db, observer) = ingestor().await;
        let request = PunchRequest::new(
            "1001",
            "SN-A",
            ts("2024-01-15 08:15:00"),
            ActionCode::CheckIn,
        );

        let first = ingestor.ingest(&request).await.unwrap();
        let second = ingestor.ingest(&request).await.unwrap();

        let IngestOutcome::Created(receipt) = first else {
            panic!("first ingest should create");
        };
        assert!(matches!(second, IngestOutcome::AlreadyExists));
        assert_eq!(receipt.summary.late_minutes, 15);
        assert_eq!(receipt.summary.status, SummaryStatus::Late);
        assert!(db.get_punch(receipt.punch_id).await.unwrap().processed);

        let employee = db.get_employee_by_code("1001").await.unwrap();
        assert!(employee.is_stub);
        assert_eq!(db.count_punches(employee.id).await.unwrap(), 1);
        assert_eq!(
            observer.count(|e| matches!(e, EngineEvent::EmployeeProvisioned { .. })),
            1
        );
        assert_eq!(
            observer.count(|e| matches!(e, EngineEvent::DuplicatePunch { .. })),
            1
        );
    }

    #[tokio::test]
    async fn same_instant_on_two_terminals_is_two_punches() {
        let (ingestor, db, _) = ingestor().await;
        let at = ts("2024-01-15 07:58:00");
        for serial in ["SN-A", "SN-B"] {
            let outcome = ingestor
                .ingest(&PunchRequest::new("1001", serial, at, ActionCode::CheckIn))
                .await
                .unwrap();
            assert!(outcome.is_created());
        }

        let employee = db.get_employee_by_code("1001").await.unwrap();
        assert_eq!(db.count_punches(employee.id).await.unwrap(), 2);
        let summary = db
            .get_summary(employee.id, at.date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.check_in, Some(at));
        assert_eq!(summary.status, SummaryStatus::Present);
    }

    #[tokio::test]
    async fn empty_employee_code_is_invalid() {
        let (ingestor, _, _) = ingestor().await;
        let request = PunchRequest::new(" ", "SN-A", ts("2024-01-15 08:00:00"), ActionCode::CheckIn);
        let err = ingestor.ingest(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn batch_skips_bad_lines_and_counts_duplicates() {
        let (ingestor, db, observer) = ingestor().await;
        let body = "1001\t2024-01-15 08:05:00\t0\t1\n\
                    1001\t2024-01-15 25:61:00\t0\t1\n\
                    \n\
                    OPLOG 4\t0\t2024-01-15 08:00:00\n\
                    1001\t2024-01-15 08:05:00\t0\t1\n\
                    1001\t2024-01-15 17:10:00\t1\t1\n";

        let report = ingestor
            .ingest_batch("SN-A", Some("10.0.0.8"), body)
            .await
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line_no, 2);
        assert_eq!(report.accepted(), 3);

        let employee = db.get_employee_by_code("1001").await.unwrap();
        let summary = db
            .get_summary(employee.id, ts("2024-01-15 00:00:00").date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.check_in, Some(ts("2024-01-15 08:05:00")));
        assert_eq!(summary.check_out, Some(ts("2024-01-15 17:10:00")));
        assert!((summary.work_hours - 9.08).abs() < 1e-9);
        assert_eq!(
            observer.count(|e| matches!(e, EngineEvent::BatchCompleted { created: 2, .. })),
            1
        );
    }

    #[tokio::test]
    async fn break_punch_is_stored_but_not_folded() {
        let (ingestor, db, _) = ingestor().await;
        let at = ts("2024-01-15 12:00:00");
        let outcome = ingestor
            .ingest(&PunchRequest::new("1001", "SN-A", at, ActionCode::BreakOut))
            .await
            .unwrap();

        let IngestOutcome::Created(receipt) = outcome else {
            panic!("break punch should be stored");
        };
        assert!(receipt.summary.check_in.is_none());
        assert_eq!(receipt.summary.status, SummaryStatus::Absent);
        let punch = db.get_punch(receipt.punch_id).await.unwrap();
        assert_eq!(punch.action(), ActionCode::BreakOut);
        assert!(punch.processed);
    }
}
