//! Daily aggregation: folding punches into one summary per employee-day.
//!
//! The folding and recomputation rules are pure functions over
//! [`DailySummary`]; [`Aggregator`] wires them to storage and serializes
//! work on the same employee-day.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqliteConnection;
use timekeep_core::config::{AttendanceConfig, ShiftWindow};
use tokio::sync::OwnedMutexGuard;

use crate::error::EngineError;
use crate::locks::KeyedLocks;
use crate::observe::{EngineEvent, EngineObserver};
use crate::storage::{
    ActionCode, DailySummary, Database, DatabaseError, Employee, Overlay, PunchEvent,
    SummaryStatus, day_punches, ensure_summary, mark_punch_processed, save_summary,
};

/// Lock key for one employee's summary on one date.
type DayKey = (i64, NaiveDate);

/// Fold one punch into the summary's check-in/check-out boundaries.
///
/// Check-ins keep the earliest time and check-outs the latest. Other action
/// codes leave the boundaries alone. Returns `true` if a boundary moved.
pub fn fold_punch(summary: &mut DailySummary, at: NaiveDateTime, action: ActionCode) -> bool {
    let slot = match action {
        ActionCode::CheckIn if summary.check_in.is_none_or(|current| at < current) => {
            &mut summary.check_in
        }
        ActionCode::CheckOut if summary.check_out.is_none_or(|current| at > current) => {
            &mut summary.check_out
        }
        _ => return false,
    };
    *slot = Some(at);
    true
}

/// Derive work hours, lateness, early leave and status from the recorded
/// times and overlay.
pub fn recompute(summary: &DailySummary, window: ShiftWindow) -> DailySummary {
    let mut next = summary.clone();

    next.work_hours = match (summary.check_in, summary.check_out) {
        (Some(check_in), Some(check_out)) => {
            #[allow(clippy::cast_precision_loss)]
            let hours = (check_out - check_in).num_seconds() as f64 / 3600.0;
            (hours * 100.0).round() / 100.0
        }
        _ => 0.0,
    };

    let start = summary.work_date.and_time(window.standard_start);
    let end = summary.work_date.and_time(window.standard_end);
    next.late_minutes = summary
        .check_in
        .map_or(0, |check_in| (check_in - start).num_minutes().max(0));
    next.early_leave_minutes = summary
        .check_out
        .map_or(0, |check_out| (end - check_out).num_minutes().max(0));

    next.status = match summary.overlay {
        Some(Overlay::Leave) => SummaryStatus::Leave,
        Some(Overlay::Holiday) => SummaryStatus::Holiday,
        None if summary.check_in.is_none() && summary.check_out.is_none() => {
            SummaryStatus::Absent
        }
        None if next.late_minutes > 0 => SummaryStatus::Late,
        None => SummaryStatus::Present,
    };

    next
}

/// Rebuild a summary from scratch out of the day's punches, keeping its
/// identity, overlay and approval.
///
/// The result depends only on the set of punches. Check-outs before the
/// day's earliest check-in are ignored so check-in <= check-out holds.
pub fn rebuild(base: &DailySummary, punches: &[PunchEvent], window: ShiftWindow) -> DailySummary {
    let mut summary = base.clone();
    summary.check_in = None;
    summary.check_out = None;
    for punch in punches.iter().filter(|p| p.action() == ActionCode::CheckIn) {
        fold_punch(&mut summary, punch.punched_at, ActionCode::CheckIn);
    }
    let arrived = summary.check_in;
    for punch in punches.iter().filter(|p| {
        p.action() == ActionCode::CheckOut && arrived.is_none_or(|at| p.punched_at >= at)
    }) {
        fold_punch(&mut summary, punch.punched_at, ActionCode::CheckOut);
    }
    recompute(&summary, window)
}

/// Maintains daily summaries as punches and overlays arrive.
#[derive(Clone)]
pub struct Aggregator {
    db: Database,
    policy: AttendanceConfig,
    locks: Arc<KeyedLocks<DayKey>>,
    observer: Arc<dyn EngineObserver>,
}

impl Aggregator {
    pub fn new(db: Database, policy: AttendanceConfig, observer: Arc<dyn EngineObserver>) -> Self {
        Self {
            db,
            policy,
            locks: Arc::new(KeyedLocks::new()),
            observer,
        }
    }

    pub const fn policy(&self) -> &AttendanceConfig {
        &self.policy
    }

    /// Serialize work on one employee-day. Must be taken before the
    /// transaction that touches the summary begins.
    pub async fn lock_day(&self, employee_id: i64, date: NaiveDate) -> OwnedMutexGuard<()> {
        self.locks.lock((employee_id, date)).await
    }

    /// Lock several days of one employee in ascending date order.
    pub async fn lock_days(
        &self,
        employee_id: i64,
        dates: impl IntoIterator<Item = NaiveDate>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let keys = dates.into_iter().map(|d| (employee_id, d)).collect();
        self.locks.lock_many(keys).await
    }

    /// Re-derive one day's summary from its stored punches inside the
    /// caller's transaction, after a new punch was inserted there. The
    /// caller holds the day lock.
    pub(crate) async fn apply(
        &self,
        conn: &mut SqliteConnection,
        employee: &Employee,
        date: NaiveDate,
    ) -> Result<DailySummary, DatabaseError> {
        let base = ensure_summary(conn, employee.id, date).await?;
        let punches = day_punches(conn, employee.id, date).await?;
        let window = self.policy.window_for(employee.department.as_deref());
        save_summary(conn, &rebuild(&base, &punches, window)).await
    }

    /// Set or clear the overlay of one day inside the caller's transaction,
    /// keeping recorded times. The caller holds the day lock.
    pub(crate) async fn overlay_in_tx(
        &self,
        conn: &mut SqliteConnection,
        employee: &Employee,
        date: NaiveDate,
        overlay: Option<Overlay>,
    ) -> Result<DailySummary, DatabaseError> {
        let mut summary = ensure_summary(conn, employee.id, date).await?;
        summary.overlay = overlay;
        let window = self.policy.window_for(employee.department.as_deref());
        save_summary(conn, &recompute(&summary, window)).await
    }

    /// Set or clear the overlay of one employee-day.
    pub async fn apply_overlay(
        &self,
        employee_code: &str,
        date: NaiveDate,
        overlay: Option<Overlay>,
    ) -> Result<DailySummary, EngineError> {
        let employee = self.employee(employee_code).await?;
        let _guard = self.lock_day(employee.id, date).await;

        let mut tx = self.db.pool().begin().await?;
        let summary = self
            .overlay_in_tx(&mut *tx, &employee, date, overlay)
            .await
            .map_err(EngineError::Transaction)?;
        tx.commit().await?;

        self.observer.record(&EngineEvent::OverlayApplied {
            employee_id: employee.id,
            date,
            overlay,
        });
        Ok(summary)
    }

    /// Recompute one day from its stored punches and mark them processed.
    pub async fn rebuild_day(
        &self,
        employee_code: &str,
        date: NaiveDate,
    ) -> Result<DailySummary, EngineError> {
        let employee = self.employee(employee_code).await?;
        let _guard = self.lock_day(employee.id, date).await;

        let mut tx = self.db.pool().begin().await?;
        let result: Result<DailySummary, DatabaseError> = async {
            let base = ensure_summary(&mut *tx, employee.id, date).await?;
            let punches = day_punches(&mut *tx, employee.id, date).await?;
            let window = self.policy.window_for(employee.department.as_deref());
            let summary = save_summary(&mut *tx, &rebuild(&base, &punches, window)).await?;
            for punch in punches.iter().filter(|p| !p.processed) {
                mark_punch_processed(&mut *tx, punch.id).await?;
            }
            Ok(summary)
        }
        .await;
        let summary = result.map_err(EngineError::Transaction)?;
        tx.commit().await?;

        Ok(summary)
    }

    /// Approve one employee-day.
    pub async fn approve_day(
        &self,
        employee_code: &str,
        date: NaiveDate,
        approver: &str,
    ) -> Result<DailySummary, EngineError> {
        if approver.trim().is_empty() {
            return Err(EngineError::InvalidInput("approver is empty".into()));
        }
        let employee = self.employee(employee_code).await?;
        let _guard = self.lock_day(employee.id, date).await;

        if !self.db.approve_summary(employee.id, date, approver).await? {
            return Err(EngineError::not_found(
                "daily summary",
                format!("{employee_code} {date}"),
            ));
        }

        self.observer.record(&EngineEvent::DayApproved {
            employee_id: employee.id,
            date,
            approver: approver.to_string(),
        });
        self.db
            .get_summary(employee.id, date)
            .await?
            .ok_or_else(|| EngineError::not_found("daily summary", format!("{employee_code} {date}")))
    }

    async fn employee(&self, code: &str) -> Result<Employee, EngineError> {
        match self.db.get_employee_by_code(code).await {
            Ok(employee) => Ok(employee),
            Err(DatabaseError::NotFound(_)) => Err(EngineError::not_found("employee", code)),
            Err(e) => Err(e.into()),
        }
    }
}
