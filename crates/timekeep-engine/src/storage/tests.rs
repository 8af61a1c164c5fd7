//! Storage layer tests for timekeep.

use chrono::{NaiveDate, NaiveDateTime};
use timekeep_core::db::unix_timestamp;

use super::db::Database;
use super::models::{
    AuditCategory, DailySummary, LeaveStatus, LeaveType, Overlay, SummaryStatus, TerminalStatus,
};
use super::queries::find_or_create_employee;
use super::queries_enrollment::EnrollmentParams;
use super::queries_leave::LeaveRequestParams;
use super::queries_punches::{NewPunch, PunchFilter, SummaryFilter};
use super::{
    ensure_summary, insert_punch, insert_terminal_if_absent, replace_templates,
    review_leave_request, save_summary, seed_target_enrollment,
};

async fn test_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Seed one terminal and one employee, returning their IDs.
async fn seed(db: &Database, serial: &str, code: &str) -> (i64, i64) {
    let mut conn = db.pool().acquire().await.unwrap();
    let terminal = insert_terminal_if_absent(&mut conn, serial, None)
        .await
        .unwrap()
        .into_inner();
    let employee = find_or_create_employee(&mut conn, code)
        .await
        .unwrap()
        .into_inner();
    (terminal.id, employee.id)
}

fn punch(employee_id: i64, terminal_id: i64, at: &str) -> NewPunch<'static> {
    NewPunch {
        employee_id,
        terminal_id,
        punched_at: ts(at),
        verify_method: 1,
        action_code: 0,
        work_code: None,
        temperature: None,
    }
}

// === Employee tests ===

#[tokio::test]
async fn employee_stub_is_created_once() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();

    let first = find_or_create_employee(&mut conn, "1001").await.unwrap();
    let second = find_or_create_employee(&mut conn, "1001").await.unwrap();
    drop(conn);

    assert!(first.was_created());
    assert!(!second.was_created());
    assert_eq!(first.get().id, second.get().id);
    assert!(first.get().is_stub);
    assert_eq!(first.get().name, "Employee 1001");
}

#[tokio::test]
async fn upsert_employee_clears_stub_flag() {
    let db = test_db().await;
    db.find_or_create_employee("1001").await.unwrap();

    let employee = db
        .upsert_employee("1001", "Dana Whitfield", Some("warehouse"))
        .await
        .unwrap();

    assert!(!employee.is_stub);
    assert_eq!(employee.name, "Dana Whitfield");
    assert_eq!(employee.department.as_deref(), Some("warehouse"));
    assert_eq!(db.list_employees().await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_employee_is_not_found() {
    let db = test_db().await;
    assert!(db.get_employee_by_code("nobody").await.is_err());
    assert!(db.get_employee(42).await.is_err());
}

// === Terminal tests ===

#[tokio::test]
async fn terminal_insert_is_idempotent_by_serial() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();

    let first = insert_terminal_if_absent(&mut conn, "SN-A", Some("10.0.0.5"))
        .await
        .unwrap();
    let second = insert_terminal_if_absent(&mut conn, "SN-A", Some("10.0.0.9"))
        .await
        .unwrap();
    drop(conn);

    assert!(first.was_created());
    assert!(!second.was_created());
    let terminal = second.into_inner();
    assert_eq!(terminal.ip_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(terminal.status, TerminalStatus::Online);
    assert_eq!(db.list_terminals(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn touch_sets_online_from_any_status() {
    let db = test_db().await;
    let (tid, _) = seed(&db, "SN-A", "1").await;

    db.update_terminal_status(tid, TerminalStatus::Maintenance)
        .await
        .unwrap();
    db.touch_terminal(tid, Some("10.1.1.1"), unix_timestamp())
        .await
        .unwrap();

    let terminal = db.get_terminal(tid).await.unwrap();
    assert_eq!(terminal.status, TerminalStatus::Online);
    assert_eq!(terminal.ip_address.as_deref(), Some("10.1.1.1"));

    db.update_terminal_status(tid, TerminalStatus::Offline)
        .await
        .unwrap();
    db.touch_terminal(tid, None, unix_timestamp()).await.unwrap();
    let terminal = db.get_terminal(tid).await.unwrap();
    assert_eq!(terminal.status, TerminalStatus::Online);
    assert_eq!(terminal.ip_address.as_deref(), Some("10.1.1.1"));
}

#[tokio::test]
async fn stale_terminals_go_offline() {
    let db = test_db().await;
    let (stale, _) = seed(&db, "SN-OLD", "1").await;
    let (fresh, _) = seed(&db, "SN-NEW", "2").await;

    let now = unix_timestamp();
    db.touch_terminal(stale, None, now - 3600).await.unwrap();
    db.touch_terminal(fresh, None, now).await.unwrap();

    let changed = db.mark_stale_terminals_offline(now - 300).await.unwrap();
    assert_eq!(changed, 1);

    let offline = db
        .list_terminals(Some(TerminalStatus::Offline))
        .await
        .unwrap();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].serial_number, "SN-OLD");
}

// === Audit tests ===

#[tokio::test]
async fn audit_entries_are_listed_newest_first() {
    let db = test_db().await;
    let (tid, _) = seed(&db, "SN-A", "1").await;

    db.append_audit(tid, AuditCategory::Ping, "first", &serde_json::json!({}))
        .await
        .unwrap();
    db.append_audit(
        tid,
        AuditCategory::StatusChange,
        "second",
        &serde_json::json!({"status": "offline"}),
    )
    .await
    .unwrap();

    let entries = db.list_audit(tid, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "second");
    assert_eq!(entries[0].details.0["status"], "offline");
    assert_eq!(db.count_audit(AuditCategory::Ping).await.unwrap(), 1);
}

// === Punch tests ===

#[tokio::test]
async fn duplicate_punch_is_ignored() {
    let db = test_db().await;
    let (tid, eid) = seed(&db, "SN-A", "1001").await;
    let mut conn = db.pool().acquire().await.unwrap();

    let first = insert_punch(&mut conn, &punch(eid, tid, "2024-01-15 08:15:00"))
        .await
        .unwrap();
    let again = insert_punch(&mut conn, &punch(eid, tid, "2024-01-15 08:15:00"))
        .await
        .unwrap();
    drop(conn);

    assert!(first.is_some());
    assert!(again.is_none());
    assert_eq!(db.count_punches(eid).await.unwrap(), 1);
}

#[tokio::test]
async fn punches_for_day_stay_within_the_date() {
    let db = test_db().await;
    let (tid, eid) = seed(&db, "SN-A", "1001").await;
    let mut conn = db.pool().acquire().await.unwrap();
    for at in [
        "2024-01-14 23:59:59",
        "2024-01-15 00:00:00",
        "2024-01-15 17:30:00",
        "2024-01-16 00:00:00",
    ] {
        insert_punch(&mut conn, &punch(eid, tid, at)).await.unwrap();
    }
    drop(conn);

    let punches = db.punches_for_day(eid, date("2024-01-15")).await.unwrap();
    assert_eq!(punches.len(), 2);
    assert_eq!(punches[0].punched_at, ts("2024-01-15 00:00:00"));
    assert!(!punches[0].processed);
}

#[tokio::test]
async fn list_punches_applies_filters() {
    let db = test_db().await;
    let (tid_a, e1) = seed(&db, "SN-A", "1001").await;
    let (tid_b, e2) = seed(&db, "SN-B", "1002").await;
    let mut conn = db.pool().acquire().await.unwrap();
    insert_punch(&mut conn, &punch(e1, tid_a, "2024-01-15 08:00:00"))
        .await
        .unwrap();
    insert_punch(&mut conn, &punch(e1, tid_a, "2024-01-16 08:00:00"))
        .await
        .unwrap();
    insert_punch(&mut conn, &punch(e2, tid_b, "2024-01-15 09:00:00"))
        .await
        .unwrap();
    drop(conn);

    let all = db.list_punches(&PunchFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].punched_at, ts("2024-01-16 08:00:00"));

    let by_terminal = db
        .list_punches(&PunchFilter {
            terminal_serial: Some("SN-B".into()),
            ..PunchFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_terminal.len(), 1);
    assert_eq!(by_terminal[0].employee_code, "1002");

    let one_day = db
        .list_punches(&PunchFilter {
            from: Some(ts("2024-01-15 00:00:00")),
            until: Some(ts("2024-01-16 00:00:00")),
            employee_code: Some("1001".into()),
            ..PunchFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(one_day.len(), 1);
}

// === Summary tests ===

#[tokio::test]
async fn summary_upsert_keeps_one_row_per_day() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;
    let day = date("2024-01-15");

    let mut summary = DailySummary::new(eid, day);
    summary.check_in = Some(ts("2024-01-15 08:15:00"));
    summary.status = SummaryStatus::Late;
    summary.late_minutes = 15;

    let mut conn = db.pool().acquire().await.unwrap();
    let stored = save_summary(&mut conn, &summary).await.unwrap();

    summary.check_out = Some(ts("2024-01-15 17:00:00"));
    summary.overlay = Some(Overlay::Leave);
    summary.status = SummaryStatus::Leave;
    let updated = save_summary(&mut conn, &summary).await.unwrap();
    drop(conn);

    assert_eq!(stored.id, updated.id);
    assert_eq!(updated.check_in, Some(ts("2024-01-15 08:15:00")));
    assert_eq!(updated.check_out, Some(ts("2024-01-15 17:00:00")));
    assert_eq!(updated.status, SummaryStatus::Leave);

    let all = db
        .list_summaries(&SummaryFilter {
            employee_id: Some(eid),
            ..SummaryFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn ensure_summary_creates_absent_default_once() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;
    let day = date("2024-01-15");

    let mut conn = db.pool().acquire().await.unwrap();
    let created = ensure_summary(&mut conn, eid, day).await.unwrap();
    let again = ensure_summary(&mut conn, eid, day).await.unwrap();
    drop(conn);

    assert_eq!(created.id, again.id);
    assert_eq!(created.status, SummaryStatus::Absent);
    assert!(created.check_in.is_none());
    assert!(db.get_summary(eid, day).await.unwrap().is_some());
}

#[tokio::test]
async fn approval_survives_recomputation() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;
    let day = date("2024-01-15");

    assert!(!db.approve_summary(eid, day, "hr").await.unwrap());

    let mut summary = DailySummary::new(eid, day);
    summary.check_in = Some(ts("2024-01-15 07:55:00"));
    summary.status = SummaryStatus::Present;
    db.store_summary(&summary).await.unwrap();

    assert!(db.approve_summary(eid, day, "hr").await.unwrap());

    summary.check_out = Some(ts("2024-01-15 17:05:00"));
    let stored = db.store_summary(&summary).await.unwrap();
    assert!(stored.is_approved);
    assert_eq!(stored.approved_by.as_deref(), Some("hr"));
}

// === Enrollment tests ===

#[tokio::test]
async fn enroll_resets_sync_flag() {
    let db = test_db().await;
    let (tid, eid) = seed(&db, "SN-A", "1001").await;
    let fp = vec!["fp-0".to_string()];
    let params = EnrollmentParams {
        terminal_id: tid,
        employee_id: eid,
        device_user_id: "1001",
        fingerprint_templates: &fp,
        face_templates: &[],
        card_number: None,
        privilege: 0,
        password_hash: None,
    };

    db.enroll(&params).await.unwrap();
    assert!(db.mark_enrollment_synced(tid, eid).await.unwrap());
    assert!(db.list_pending_sync(tid).await.unwrap().is_empty());

    let again = db.enroll(&params).await.unwrap();
    assert!(!again.is_synced);
    assert_eq!(db.list_pending_sync(tid).await.unwrap().len(), 1);
    assert_eq!(db.count_enrollments(tid, eid).await.unwrap(), 1);
}

#[tokio::test]
async fn seed_target_enrollment_is_idempotent() {
    let db = test_db().await;
    let (source, eid) = seed(&db, "SN-A", "1001").await;
    let (target, _) = seed(&db, "SN-B", "1001").await;
    let fp = vec!["fp-0".to_string(), "fp-1".to_string()];
    db.enroll(&EnrollmentParams {
        terminal_id: source,
        employee_id: eid,
        device_user_id: "1001",
        fingerprint_templates: &fp,
        face_templates: &[],
        card_number: Some("CARD-77"),
        privilege: 0,
        password_hash: None,
    })
    .await
    .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    assert!(
        seed_target_enrollment(&mut conn, source, target, eid)
            .await
            .unwrap()
    );
    assert!(
        !seed_target_enrollment(&mut conn, source, target, eid)
            .await
            .unwrap()
    );
    drop(conn);

    let seeded = db.get_enrollment(target, eid).await.unwrap().unwrap();
    assert_eq!(seeded.card_number.as_deref(), Some("CARD-77"));
    assert!(seeded.fingerprint_templates.0.is_empty());
    assert_eq!(db.count_enrollments(target, eid).await.unwrap(), 1);
}

#[tokio::test]
async fn seed_without_source_inserts_nothing() {
    let db = test_db().await;
    let (source, eid) = seed(&db, "SN-A", "1001").await;
    let (target, _) = seed(&db, "SN-B", "1001").await;

    let mut conn = db.pool().acquire().await.unwrap();
    let inserted = seed_target_enrollment(&mut conn, source, target, eid)
        .await
        .unwrap();
    drop(conn);

    assert!(!inserted);
    assert_eq!(db.count_enrollments(target, eid).await.unwrap(), 0);
}

#[tokio::test]
async fn replace_templates_marks_unsynced() {
    let db = test_db().await;
    let (tid, eid) = seed(&db, "SN-A", "1001").await;
    let enrollment = db
        .enroll(&EnrollmentParams {
            terminal_id: tid,
            employee_id: eid,
            device_user_id: "1001",
            fingerprint_templates: &[],
            face_templates: &[],
            card_number: None,
            privilege: 0,
            password_hash: None,
        })
        .await
        .unwrap();
    db.mark_enrollment_synced(tid, eid).await.unwrap();

    let face = vec!["face-0".to_string()];
    let mut conn = db.pool().acquire().await.unwrap();
    replace_templates(&mut conn, enrollment.id, &[], &face)
        .await
        .unwrap();
    drop(conn);

    let stored = db.get_enrollment(tid, eid).await.unwrap().unwrap();
    assert_eq!(stored.face_templates.0, face);
    assert!(!stored.is_synced);
    assert!(stored.synced_at.is_none());
}

// === Leave request tests ===

#[tokio::test]
async fn leave_request_counts_inclusive_days() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;

    let request = db
        .create_leave_request(&LeaveRequestParams {
            employee_id: eid,
            leave_type: LeaveType::Annual,
            start_date: date("2024-01-10"),
            end_date: date("2024-01-12"),
            reason: "family trip",
        })
        .await
        .unwrap();

    assert_eq!(request.days_count, 3);
    assert_eq!(request.status, LeaveStatus::Pending);
    assert!(db.get_leave_request(request.id + 100).await.is_err());
}

#[tokio::test]
async fn review_only_moves_pending_requests() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;
    let request = db
        .create_leave_request(&LeaveRequestParams {
            employee_id: eid,
            leave_type: LeaveType::Sick,
            start_date: date("2024-02-01"),
            end_date: date("2024-02-01"),
            reason: "",
        })
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let first = review_leave_request(&mut conn, request.id, LeaveStatus::Rejected, "hr", "no cover")
        .await
        .unwrap();
    let second = review_leave_request(&mut conn, request.id, LeaveStatus::Approved, "hr", "")
        .await
        .unwrap();
    drop(conn);

    assert!(first);
    assert!(!second);
    let stored = db.get_leave_request(request.id).await.unwrap();
    assert_eq!(stored.status, LeaveStatus::Rejected);
    assert_eq!(stored.review_notes, "no cover");
    assert!(!db.cancel_leave_request(request.id).await.unwrap());
}

#[tokio::test]
async fn list_leave_requests_filters_by_status() {
    let db = test_db().await;
    let (_, eid) = seed(&db, "SN-A", "1001").await;
    for start in ["2024-03-01", "2024-03-05"] {
        db.create_leave_request(&LeaveRequestParams {
            employee_id: eid,
            leave_type: LeaveType::Personal,
            start_date: date(start),
            end_date: date(start),
            reason: "",
        })
        .await
        .unwrap();
    }
    let pending = db
        .list_leave_requests(Some(eid), Some(LeaveStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    assert!(db.cancel_leave_request(pending[0].id).await.unwrap());
    let cancelled = db
        .list_leave_requests(None, Some(LeaveStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}
