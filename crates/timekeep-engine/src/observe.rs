//! Observer port for engine events.
//!
//! Components receive an [`EngineObserver`] at construction and report what
//! they did through it. [`TracingObserver`] forwards to `tracing`;
//! [`MemoryObserver`] keeps the events for inspection.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::storage::{LeaveStatus, Overlay};

/// Something an engine component did that operators may care about.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    TerminalRegistered {
        serial: String,
        ip_address: Option<String>,
    },
    LivenessUpdateFailed {
        serial: String,
        error: String,
    },
    EmployeeProvisioned {
        code: String,
    },
    PunchRecorded {
        employee_code: String,
        serial: String,
        punched_at: NaiveDateTime,
        action_code: i64,
    },
    DuplicatePunch {
        employee_code: String,
        serial: String,
        punched_at: NaiveDateTime,
    },
    LineSkipped {
        serial: String,
        line_no: usize,
        reason: String,
    },
    BatchCompleted {
        serial: String,
        created: usize,
        duplicates: usize,
        skipped: usize,
    },
    OverlayApplied {
        employee_id: i64,
        date: NaiveDate,
        overlay: Option<Overlay>,
    },
    LeaveReviewed {
        request_id: i64,
        decision: LeaveStatus,
        reviewer: String,
    },
    EmployeeMoved {
        employee_code: String,
        source: String,
        target: String,
        templates_copied: bool,
        changed: bool,
    },
    DayApproved {
        employee_id: i64,
        date: NaiveDate,
        approver: String,
    },
}

/// Sink for engine events.
pub trait EngineObserver: Send + Sync {
    fn record(&self, event: &EngineEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn record(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TerminalRegistered { serial, ip_address } => {
                info!(%serial, ip = ?ip_address, "New terminal auto-registered");
            }
            EngineEvent::LivenessUpdateFailed { serial, error } => {
                warn!(%serial, %error, "Failed to record terminal liveness");
            }
            EngineEvent::EmployeeProvisioned { code } => {
                info!(employee = %code, "Provisioned stub employee from terminal PIN");
            }
            EngineEvent::PunchRecorded {
                employee_code,
                serial,
                punched_at,
                action_code,
            } => {
                debug!(employee = %employee_code, %serial, %punched_at, action_code, "Punch recorded");
            }
            EngineEvent::DuplicatePunch {
                employee_code,
                serial,
                punched_at,
            } => {
                debug!(employee = %employee_code, %serial, %punched_at, "Duplicate punch ignored");
            }
            EngineEvent::LineSkipped {
                serial,
                line_no,
                reason,
            } => {
                warn!(%serial, line_no, %reason, "Skipped push line");
            }
            EngineEvent::BatchCompleted {
                serial,
                created,
                duplicates,
                skipped,
            } => {
                info!(%serial, created, duplicates, skipped, "Push batch processed");
            }
            EngineEvent::OverlayApplied {
                employee_id,
                date,
                overlay,
            } => {
                debug!(employee_id, %date, ?overlay, "Overlay applied");
            }
            EngineEvent::LeaveReviewed {
                request_id,
                decision,
                reviewer,
            } => {
                info!(request_id, %decision, %reviewer, "Leave request reviewed");
            }
            EngineEvent::EmployeeMoved {
                employee_code,
                source,
                target,
                templates_copied,
                changed,
            } => {
                info!(
                    employee = %employee_code,
                    %source,
                    %target,
                    templates_copied,
                    changed,
                    "Employee moved between terminals"
                );
            }
            EngineEvent::DayApproved {
                employee_id,
                date,
                approver,
            } => {
                info!(employee_id, %date, %approver, "Daily attendance approved");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryObserver {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count the recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| predicate(e)).count())
            .unwrap_or_default()
    }
}

impl EngineObserver for MemoryObserver {
    fn record(&self, event: &EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
