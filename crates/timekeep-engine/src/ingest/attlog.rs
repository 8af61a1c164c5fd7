//! Decoder for the terminal ATTLOG push format.
//!
//! One record per line, tab separated:
//! `[ATTLOG\t]PIN\tYYYY-MM-DD HH:MM:SS[\tSTATE[\tVERIFY[\tWORKCODE[\t...]]]]`.
//! Records of other tables share the upload channel and are ignored.

use chrono::NaiveDateTime;

use crate::storage::{ActionCode, PunchRecord, VerifyMethod};

/// Timestamp layout used on the wire and in exported logs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Table tags that arrive on the same channel but carry no punches.
const IGNORED_TABLES: &[&str] = &[
    "OPLOG", "USER", "FP", "FACE", "BIOPHOTO", "USERPIC", "ATTPHOTO",
];

/// One punch decoded from a push line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPunch {
    pub employee_code: String,
    pub punched_at: NaiveDateTime,
    pub action_code: ActionCode,
    pub verify_method: VerifyMethod,
    pub work_code: Option<String>,
}

/// Why a push line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("empty employee PIN")]
    EmptyPin,

    #[error("unparsable timestamp: {0:?}")]
    Timestamp(String),

    #[error("invalid {field} code: {value:?}")]
    InvalidCode { field: &'static str, value: String },
}

/// Parse a wire timestamp.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, LineError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| LineError::Timestamp(s.trim().to_string()))
}

fn parse_code(field: &'static str, value: Option<&str>, default: i64) -> Result<i64, LineError> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| LineError::InvalidCode {
            field,
            value: v.to_string(),
        }),
    }
}

/// `OPLOG`, `USER PIN=1`, ... but not a PIN that merely starts with a tag.
fn is_ignored_table(field: &str) -> bool {
    IGNORED_TABLES.iter().any(|t| {
        field
            .strip_prefix(t)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

/// Decode one line. Returns `Ok(None)` for blank lines and records that are
/// not attendance punches.
pub fn parse_line(line: &str) -> Result<Option<RawPunch>, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let mut fields = line.split('\t').peekable();
    match fields.peek().copied().map(str::trim) {
        Some("ATTLOG") => {
            fields.next();
        }
        Some(tag) if is_ignored_table(tag) => return Ok(None),
        _ => {}
    }

    let pin = fields.next().ok_or(LineError::MissingField("PIN"))?.trim();
    if pin.is_empty() {
        return Err(LineError::EmptyPin);
    }
    let punched_at = parse_timestamp(fields.next().ok_or(LineError::MissingField("timestamp"))?)?;
    let action_code = parse_code("state", fields.next(), ActionCode::CheckIn.code())?;
    let verify_method = parse_code("verify", fields.next(), VerifyMethod::Fingerprint.code())?;
    let work_code = fields
        .next()
        .map(str::trim)
        .filter(|w| !w.is_empty() && *w != "0")
        .map(str::to_string);

    Ok(Some(RawPunch {
        employee_code: pin.to_string(),
        punched_at,
        action_code: action_code.into(),
        verify_method: verify_method.into(),
        work_code,
    }))
}

/// Render a stored punch as an attendance log line.
pub fn format_line(record: &PunchRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        record.employee_code,
        record.punched_at.format(TIMESTAMP_FORMAT),
        record.action_code,
        record.verify_method,
        record.work_code.as_deref().unwrap_or("0"),
    )
}
