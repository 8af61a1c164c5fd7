//! Leave workflow transitions and their effect on daily summaries.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::aggregate::Aggregator;
use crate::error::EngineError;
use crate::observe::{EngineEvent, EngineObserver};
use crate::storage::{
    Database, DatabaseError, LeaveRequest, LeaveRequestParams, LeaveStatus, LeaveType, Overlay,
    review_leave_request,
};

/// Applies leave approval and rejection.
#[derive(Clone)]
pub struct LeaveOverlay {
    db: Database,
    aggregator: Aggregator,
    observer: Arc<dyn EngineObserver>,
}

impl LeaveOverlay {
    pub fn new(db: Database, aggregator: Aggregator, observer: Arc<dyn EngineObserver>) -> Self {
        Self {
            db,
            aggregator,
            observer,
        }
    }

    /// File a pending leave request for an existing employee.
    pub async fn request(
        &self,
        employee_code: &str,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: &str,
    ) -> Result<LeaveRequest, EngineError> {
        if start_date > end_date {
            return Err(EngineError::InvalidInput(format!(
                "leave starts {start_date} after it ends {end_date}"
            )));
        }
        let employee = match self.db.get_employee_by_code(employee_code).await {
            Ok(employee) => employee,
            Err(DatabaseError::NotFound(_)) => {
                return Err(EngineError::not_found("employee", employee_code));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self
            .db
            .create_leave_request(&LeaveRequestParams {
                employee_id: employee.id,
                leave_type,
                start_date,
                end_date,
                reason,
            })
            .await?)
    }

    /// Approve a pending request and mark every covered day as leave.
    ///
    /// Recorded check-in and check-out times are kept.
    pub async fn approve(&self, id: i64, reviewer: &str) -> Result<LeaveRequest, EngineError> {
        let request = self.pending(id, reviewer).await?;
        let employee = self.db.get_employee(request.employee_id).await?;

        let _guards = self
            .aggregator
            .lock_days(employee.id, request.dates())
            .await;

        let mut tx = self.db.pool().begin().await?;
        let reviewed = review_leave_request(&mut *tx, id, LeaveStatus::Approved, reviewer, "")
            .await
            .map_err(EngineError::Transaction)?;
        if !reviewed {
            tx.rollback().await?;
            return Err(not_pending(id));
        }
        for date in request.dates() {
            self.aggregator
                .overlay_in_tx(&mut *tx, &employee, date, Some(Overlay::Leave))
                .await
                .map_err(EngineError::Transaction)?;
        }
        tx.commit().await?;

        for date in request.dates() {
            self.observer.record(&EngineEvent::OverlayApplied {
                employee_id: employee.id,
                date,
                overlay: Some(Overlay::Leave),
            });
        }
        self.reviewed(id, LeaveStatus::Approved, reviewer).await
    }

    /// Reject a pending request. Daily summaries are not touched.
    pub async fn reject(
        &self,
        id: i64,
        reviewer: &str,
        notes: &str,
    ) -> Result<LeaveRequest, EngineError> {
        self.pending(id, reviewer).await?;

        let mut conn = self.db.pool().acquire().await?;
        let reviewed =
            review_leave_request(&mut conn, id, LeaveStatus::Rejected, reviewer, notes).await?;
        drop(conn);
        if !reviewed {
            return Err(not_pending(id));
        }

        self.reviewed(id, LeaveStatus::Rejected, reviewer).await
    }

    /// Withdraw a pending request.
    pub async fn cancel(&self, id: i64) -> Result<LeaveRequest, EngineError> {
        self.fetch(id).await?;
        if !self.db.cancel_leave_request(id).await? {
            return Err(not_pending(id));
        }
        self.fetch(id).await
    }

    async fn fetch(&self, id: i64) -> Result<LeaveRequest, EngineError> {
        match self.db.get_leave_request(id).await {
            Ok(request) => Ok(request),
            Err(DatabaseError::NotFound(_)) => {
                Err(EngineError::not_found("leave request", id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pending(&self, id: i64, reviewer: &str) -> Result<LeaveRequest, EngineError> {
        if reviewer.trim().is_empty() {
            return Err(EngineError::InvalidInput("reviewer is empty".into()));
        }
        let request = self.fetch(id).await?;
        if request.status != LeaveStatus::Pending {
            return Err(EngineError::InvalidInput(format!(
                "leave request {id} is {}, not pending",
                request.status
            )));
        }
        Ok(request)
    }

    async fn reviewed(
        &self,
        id: i64,
        decision: LeaveStatus,
        reviewer: &str,
    ) -> Result<LeaveRequest, EngineError> {
        self.observer.record(&EngineEvent::LeaveReviewed {
            request_id: id,
            decision,
            reviewer: reviewer.to_string(),
        });
        self.fetch(id).await
    }
}

fn not_pending(id: i64) -> EngineError {
    EngineError::InvalidInput(format!("leave request {id} is no longer pending"))
}
