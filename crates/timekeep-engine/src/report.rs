//! Read-side reductions over stored summaries and punches.

use serde::Serialize;

use crate::ingest::attlog::format_line;
use crate::storage::{DailySummary, PunchRecord, SummaryStatus};

/// Day counts and totals over a set of daily summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceReport {
    pub total_days: usize,
    pub present_days: usize,
    pub late_days: usize,
    pub absent_days: usize,
    pub leave_days: usize,
    pub holiday_days: usize,
    pub total_late_minutes: i64,
    pub total_early_leave_minutes: i64,
    pub total_work_hours: f64,
}

impl AttendanceReport {
    pub fn from_summaries(summaries: &[DailySummary]) -> Self {
        let mut report = Self {
            total_days: summaries.len(),
            ..Self::default()
        };
        for summary in summaries {
            match summary.status {
                SummaryStatus::Present => report.present_days += 1,
                SummaryStatus::Late => report.late_days += 1,
                SummaryStatus::Absent => report.absent_days += 1,
                SummaryStatus::Leave => report.leave_days += 1,
                SummaryStatus::Holiday => report.holiday_days += 1,
            }
            report.total_late_minutes += summary.late_minutes;
            report.total_early_leave_minutes += summary.early_leave_minutes;
            report.total_work_hours += summary.work_hours;
        }
        report.total_work_hours = (report.total_work_hours * 100.0).round() / 100.0;
        report
    }

    /// Days the employee showed up, late or not.
    pub const fn attended_days(&self) -> usize {
        self.present_days + self.late_days
    }
}

/// Render punches as an attendance log, oldest first.
pub fn export_attlog(records: &[PunchRecord]) -> String {
    let mut ordered: Vec<&PunchRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.punched_at, r.id));

    let mut out = String::new();
    for record in ordered {
        out.push_str(&format_line(record));
        out.push('\n');
    }
    out
}
