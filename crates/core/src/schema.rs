//! Column schema and row-level parsing for the experiment sources.

use chrono::{DateTime, NaiveDateTime};
use validator::Validate;

use crate::error::{Error, LoadErrorCode, Result};
use crate::events::{ProcessStep, Variation};
use crate::limits::WEB_LOG_TIMESTAMP_FORMAT;
use crate::records::{Assignment, Demographics, RawAssignment, RawWebEvent, WebActivity, WebEvent};

pub const CLIENT_ID: &str = "client_id";
pub const CLNT_AGE: &str = "clnt_age";
pub const BAL: &str = "bal";
pub const VISIT_ID: &str = "visit_id";
pub const PROCESS_STEP: &str = "process_step";
pub const DATE_TIME: &str = "date_time";
pub const VARIATION: &str = "Variation";

/// Columns the demographics file must carry.
pub const DEMOGRAPHIC_COLUMNS: &[&str] = &[
    CLIENT_ID,
    "clnt_tenure_yr",
    "clnt_tenure_mnth",
    CLNT_AGE,
    "gendr",
    "num_accts",
    BAL,
    "logons_6_mnth",
];

/// Columns each web-log partition must carry.
pub const WEB_EVENT_COLUMNS: &[&str] = &[CLIENT_ID, VISIT_ID, PROCESS_STEP, DATE_TIME];

/// Columns the assignment file must carry.
pub const ASSIGNMENT_COLUMNS: &[&str] = &[CLIENT_ID, VARIATION];

/// Header of the persisted merged dataset.
pub const OUTPUT_COLUMNS: &[&str] = &[
    CLIENT_ID,
    "clnt_tenure_yr",
    "clnt_tenure_mnth",
    CLNT_AGE,
    "gendr",
    "num_accts",
    BAL,
    "calls_6_mnth",
    "logons_6_mnth",
    "total_tenure_months",
    "client_status",
    "age_group",
    "visit_visitor_id",
    VISIT_ID,
    PROCESS_STEP,
    DATE_TIME,
    VARIATION,
    "step_index",
    "prev_step_index",
    "is_back_track",
    "time_spent",
];

/// Fails with LOAD_002 naming the first required column absent from `headers`.
pub fn require_columns<'a, I>(source: &str, headers: I, required: &[&str]) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    for column in required {
        if !present.contains(column) {
            return Err(Error::load(
                LoadErrorCode::MissingColumn,
                format!("{}: missing column '{}'", source, column),
            ));
        }
    }
    Ok(())
}

/// Canonical string form of a client id.
///
/// Integral float spellings such as `"123.0"` collapse to `"123"` so that ids
/// read as numbers in one file join with ids read as text in another.
pub fn normalize_client_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.') {
        let integral = !whole.is_empty()
            && whole.bytes().all(|b| b.is_ascii_digit())
            && fraction.bytes().all(|b| b == b'0');
        if integral {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

/// Parses a web-log timestamp.
///
/// Accepts the log layout (`2017-04-17 15:27:07`), the same with fractional
/// seconds, and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, WEB_LOG_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.naive_utc()))
        .map_err(|_| Error::InvalidTimestamp(trimmed.to_string()))
}

/// Formats a timestamp in the web-log layout; sub-second parts are kept.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

/// Validates a demographics row and normalizes its client id.
pub fn validate_demographics(mut row: Demographics) -> Result<Demographics> {
    row.client_id = normalize_client_id(&row.client_id);
    row.gendr = row
        .gendr
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty());
    row.validate()
        .map_err(|e| Error::validation(format!("client {}: {}", row.client_id, e)))?;
    Ok(row)
}

/// Parses a raw web-log row.
pub fn parse_web_event(raw: RawWebEvent) -> Result<WebEvent> {
    let client_id = normalize_client_id(&raw.client_id);
    if client_id.is_empty() {
        return Err(Error::validation("web event without client_id"));
    }
    let visit_id = raw.visit_id.trim().to_string();
    if visit_id.is_empty() {
        return Err(Error::validation(format!(
            "web event of client {} without visit_id",
            client_id
        )));
    }

    let process_step: ProcessStep = raw.process_step.parse()?;
    let date_time = parse_timestamp(&raw.date_time)?;

    Ok(WebEvent {
        client_id,
        activity: WebActivity {
            visit_visitor_id: raw
                .visit_visitor_id
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            visit_id,
            process_step,
            date_time,
        },
    })
}

/// Parses a raw assignment row.
pub fn parse_assignment(raw: RawAssignment) -> Result<Assignment> {
    let client_id = normalize_client_id(&raw.client_id);
    if client_id.is_empty() {
        return Err(Error::validation("assignment without client_id"));
    }
    let variation = match raw.variation.as_deref() {
        Some(cell) => Variation::parse_optional(cell)?,
        None => None,
    };
    Ok(Assignment {
        client_id,
        variation,
    })
}
