//! Database models for timekeep storage.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Outcome of an upsert-by-identity lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    /// The record was already stored.
    Existing(T),
    /// The record was inserted by this call.
    Created(T),
}

impl<T> Resolved<T> {
    pub const fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Existing(v) | Self::Created(v) => v,
        }
    }

    pub const fn get(&self) -> &T {
        match self {
            Self::Existing(v) | Self::Created(v) => v,
        }
    }
}

/// Employee record. Stubs are provisioned from unknown terminal PINs.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub department: Option<String>,
    pub is_stub: bool,
    pub created_at: i64,
}

/// Terminal operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TerminalStatus {
    Online,
    Offline,
    Maintenance,
}

impl TerminalStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TerminalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(format!("unknown terminal status: {other}")),
        }
    }
}

/// Terminal (biometric/card reader) record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Terminal {
    pub id: i64,
    pub serial_number: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub status: TerminalStatus,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

/// How the terminal identified the employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyMethod {
    Password,
    Fingerprint,
    Card,
    Face,
    Iris,
    Palm,
    Other(i64),
}

impl VerifyMethod {
    pub const fn code(self) -> i64 {
        match self {
            Self::Password => 0,
            Self::Fingerprint => 1,
            Self::Card => 2,
            Self::Face => 3,
            Self::Iris => 4,
            Self::Palm => 15,
            Self::Other(n) => n,
        }
    }
}

impl From<i64> for VerifyMethod {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Password,
            1 => Self::Fingerprint,
            2 => Self::Card,
            3 => Self::Face,
            4 => Self::Iris,
            15 => Self::Palm,
            n => Self::Other(n),
        }
    }
}

/// Punch state reported by the terminal.
///
/// Only check-in and check-out move the daily boundaries; break and overtime
/// punches are stored for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionCode {
    CheckIn,
    CheckOut,
    BreakOut,
    BreakIn,
    OvertimeIn,
    OvertimeOut,
    Other(i64),
}

impl ActionCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::CheckIn => 0,
            Self::CheckOut => 1,
            Self::BreakOut => 2,
            Self::BreakIn => 3,
            Self::OvertimeIn => 4,
            Self::OvertimeOut => 5,
            Self::Other(n) => n,
        }
    }
}

impl From<i64> for ActionCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::CheckIn,
            1 => Self::CheckOut,
            2 => Self::BreakOut,
            3 => Self::BreakIn,
            4 => Self::OvertimeIn,
            5 => Self::OvertimeOut,
            n => Self::Other(n),
        }
    }
}

/// Stored punch fact. Never updated except for the one-way `processed` flag.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PunchEvent {
    pub id: i64,
    pub employee_id: i64,
    pub terminal_id: i64,
    pub punched_at: NaiveDateTime,
    pub verify_method: i64,
    pub action_code: i64,
    pub work_code: Option<String>,
    pub temperature: Option<f64>,
    pub processed: bool,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

impl PunchEvent {
    pub fn action(&self) -> ActionCode {
        ActionCode::from(self.action_code)
    }

    pub fn verify(&self) -> VerifyMethod {
        VerifyMethod::from(self.verify_method)
    }
}

/// Punch joined with the employee code and terminal serial, for listings and
/// exports.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PunchRecord {
    pub id: i64,
    pub employee_code: String,
    pub terminal_serial: String,
    pub punched_at: NaiveDateTime,
    pub verify_method: i64,
    pub action_code: i64,
    pub work_code: Option<String>,
    pub processed: bool,
}

/// Derived daily status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SummaryStatus {
    Present,
    Late,
    Absent,
    Leave,
    Holiday,
}

impl SummaryStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
            Self::Leave => "leave",
            Self::Holiday => "holiday",
        }
    }
}

impl std::fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status override applied on top of the recorded times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Overlay {
    Leave,
    Holiday,
}

/// One employee's attendance for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailySummary {
    pub id: i64,
    pub employee_id: i64,
    pub work_date: NaiveDate,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub work_hours: f64,
    pub late_minutes: i64,
    pub early_leave_minutes: i64,
    pub status: SummaryStatus,
    pub overlay: Option<Overlay>,
    pub is_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DailySummary {
    /// A not-yet-stored summary with no punches folded in.
    pub const fn new(employee_id: i64, work_date: NaiveDate) -> Self {
        Self {
            id: 0,
            employee_id,
            work_date,
            check_in: None,
            check_out: None,
            work_hours: 0.0,
            late_minutes: 0,
            early_leave_minutes: 0,
            status: SummaryStatus::Absent,
            overlay: None,
            is_approved: false,
            approved_by: None,
            approved_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Employee registered on a terminal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub terminal_id: i64,
    pub employee_id: i64,
    pub device_user_id: String,
    pub fingerprint_templates: Json<Vec<String>>,
    pub face_templates: Json<Vec<String>>,
    pub card_number: Option<String>,
    pub privilege: i64,
    pub password_hash: Option<String>,
    pub is_synced: bool,
    pub synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Kind of leave requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Personal,
    Emergency,
    Other,
}

impl std::str::FromStr for LeaveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "annual" => Ok(Self::Annual),
            "sick" => Ok(Self::Sick),
            "personal" => Ok(Self::Personal),
            "emergency" => Ok(Self::Emergency),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown leave type: {other}")),
        }
    }
}

/// Leave request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leave request record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveRequest {
    pub id: i64,
    pub employee_id: i64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_count: i64,
    pub reason: String,
    pub status: LeaveStatus,
    pub reviewed_by: Option<String>,
    pub review_notes: String,
    pub reviewed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LeaveRequest {
    /// Every calendar date covered by the request, in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end_date;
        self.start_date.iter_days().take_while(move |d| *d <= end)
    }
}

/// Audit log categories written by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    Registration,
    Ping,
    StatusChange,
    EmployeeMoved,
    EmployeeAdded,
}

impl AuditCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Ping => "ping",
            Self::StatusChange => "status_change",
            Self::EmployeeMoved => "employee_moved",
            Self::EmployeeAdded => "employee_added",
        }
    }
}

impl std::fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only terminal audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub terminal_id: i64,
    pub category: String,
    pub message: String,
    pub details: Json<serde_json::Value>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_survive_conversion() {
        for code in [0, 1, 2, 3, 4, 5, 9] {
            assert_eq!(ActionCode::from(code).code(), code);
        }
        for code in [0, 1, 2, 3, 4, 15, 7] {
            assert_eq!(VerifyMethod::from(code).code(), code);
        }
        assert_eq!(ActionCode::from(9), ActionCode::Other(9));
        assert_eq!(VerifyMethod::from(15), VerifyMethod::Palm);
    }

    #[test]
    fn leave_dates_are_inclusive() {
        let request = LeaveRequest {
            id: 1,
            employee_id: 1,
            leave_type: LeaveType::Annual,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            days_count: 3,
            reason: String::new(),
            status: LeaveStatus::Pending,
            reviewed_by: None,
            review_notes: String::new(),
            reviewed_at: None,
            created_at: 0,
            updated_at: 0,
        };
        let dates: Vec<_> = request.dates().map(|d| d.to_string()).collect();
        assert_eq!(dates, ["2024-01-30", "2024-01-31", "2024-02-01"]);
    }

    #[test]
    fn resolved_reports_creation() {
        let created = Resolved::Created(3);
        assert!(created.was_created());
        assert_eq!(*created.get(), 3);
        assert_eq!(Resolved::Existing(4).into_inner(), 4);
    }
}
