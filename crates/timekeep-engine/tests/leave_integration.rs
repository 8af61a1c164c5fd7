#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for the leave overlay.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use timekeep_core::Config;
use timekeep_engine::ingest::PunchRequest;
use timekeep_engine::storage::{
    ActionCode, Database, LeaveStatus, LeaveType, Overlay, SummaryFilter, SummaryStatus,
};
use timekeep_engine::{Engine, EngineEvent, MemoryObserver};

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn engine_with_db() -> (Engine, MemoryObserver) {
    let db = Database::open_in_memory().await.unwrap();
    db.upsert_employee("E1", "Ana Reyes", Some("finance"))
        .await
        .unwrap();
    let observer = MemoryObserver::new();
    let engine = Engine::new(db, &Config::default(), Arc::new(observer.clone()));
    (engine, observer)
}

#[tokio::test]
async fn approved_leave_overrides_status_and_keeps_punches() {
    let (engine, observer) = engine_with_db().await;
    engine
        .ingestor()
        .ingest(&PunchRequest::new(
            "E1",
            "SN-A",
            ts("2024-01-11 08:30:00"),
            ActionCode::CheckIn,
        ))
        .await
        .unwrap();

    let request = engine
        .leave()
        .request(
            "E1",
            LeaveType::Annual,
            date("2024-01-10"),
            date("2024-01-12"),
            "winter break",
        )
        .await
        .unwrap();
    assert_eq!(request.days_count, 3);

    let approved = engine.leave().approve(request.id, "hr-lead").await.unwrap();
    assert_eq!(approved.status, LeaveStatus::Approved);

    let summaries = engine
        .db()
        .list_summaries(&SummaryFilter {
            employee_id: Some(approved.employee_id),
            from: Some(date("2024-01-10")),
            to: Some(date("2024-01-12")),
        })
        .await
        .unwrap();
    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        assert_eq!(summary.status, SummaryStatus::Leave);
        assert_eq!(summary.overlay, Some(Overlay::Leave));
    }
    assert_eq!(summaries[1].check_in, Some(ts("2024-01-11 08:30:00")));
    assert_eq!(summaries[1].late_minutes, 30);
    assert!(summaries[0].check_in.is_none());

    assert_eq!(
        observer.count(|e| matches!(e, EngineEvent::OverlayApplied { .. })),
        3
    );
}

#[tokio::test]
async fn punch_after_approval_keeps_leave_status() {
    let (engine, _) = engine_with_db().await;
    let request = engine
        .leave()
        .request("E1", LeaveType::Sick, date("2024-01-10"), date("2024-01-10"), "")
        .await
        .unwrap();
    engine.leave().approve(request.id, "hr").await.unwrap();

    let outcome = engine
        .ingestor()
        .ingest(&PunchRequest::new(
            "E1",
            "SN-A",
            ts("2024-01-10 09:10:00"),
            ActionCode::CheckIn,
        ))
        .await
        .unwrap();

    let timekeep_engine::ingest::IngestOutcome::Created(receipt) = outcome else {
        panic!("punch should be stored");
    };
    assert_eq!(receipt.summary.status, SummaryStatus::Leave);
    assert_eq!(receipt.summary.check_in, Some(ts("2024-01-10 09:10:00")));
}

#[tokio::test]
async fn rejected_leave_has_no_side_effects() {
    let (engine, _) = engine_with_db().await;
    let request = engine
        .leave()
        .request("E1", LeaveType::Personal, date("2024-01-10"), date("2024-01-12"), "")
        .await
        .unwrap();

    let rejected = engine
        .leave()
        .reject(request.id, "hr", "quarter close")
        .await
        .unwrap();
    assert_eq!(rejected.status, LeaveStatus::Rejected);
    assert_eq!(rejected.reviewed_by.as_deref(), Some("hr"));

    let summaries = engine
        .db()
        .list_summaries(&SummaryFilter::default())
        .await
        .unwrap();
    assert!(summaries.is_empty());

    let err = engine.leave().approve(request.id, "hr").await.unwrap_err();
    assert_eq!(err.kind(), timekeep_engine::ErrorKind::InvalidInput);
}

#[tokio::test]
async fn holiday_overlay_can_be_cleared() {
    let (engine, _) = engine_with_db().await;
    engine
        .ingestor()
        .ingest(&PunchRequest::new(
            "E1",
            "SN-A",
            ts("2024-01-01 08:10:00"),
            ActionCode::CheckIn,
        ))
        .await
        .unwrap();

    let holiday = engine
        .aggregator()
        .apply_overlay("E1", date("2024-01-01"), Some(Overlay::Holiday))
        .await
        .unwrap();
    assert_eq!(holiday.status, SummaryStatus::Holiday);

    let cleared = engine
        .aggregator()
        .apply_overlay("E1", date("2024-01-01"), None)
        .await
        .unwrap();
    assert_eq!(cleared.status, SummaryStatus::Late);
    assert_eq!(cleared.late_minutes, 10);
}
