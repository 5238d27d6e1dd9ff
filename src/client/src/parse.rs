//! Field-level parsers for table cells and JSON fields.
//!
//! Every fallible parser names the field it was decoding so schema errors
//! point at the exact cell. The two documented best-effort decodes
//! (malformed text encoding, malformed base64 payload) degrade to
//! replacement values instead of failing.

use std::fmt::Display;
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::error::Error;

/// The fixed display timezone. All timestamps handed to callers are
/// normalized to Moscow time regardless of the server timezone.
pub fn display_tz() -> FixedOffset {
    // +03:00 never fails FixedOffset's range check.
    FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| unreachable!())
}

/// Timestamp formats seen in rendered tables.
const DATETIME_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

pub fn datetime(field: &'static str, raw: &str) -> Result<NaiveDateTime, Error> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| Error::parse(field, raw))
}

/// Interpret a naive table timestamp in the server timezone and convert it
/// to the display timezone.
pub fn local_datetime(
    field: &'static str,
    raw: &str,
    server_tz: FixedOffset,
) -> Result<DateTime<FixedOffset>, Error> {
    let naive = datetime(field, raw)?;
    let in_server_tz = server_tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::parse(field, raw))?;
    Ok(in_server_tz.with_timezone(&display_tz()))
}

pub fn int<T>(field: &'static str, raw: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|_| Error::parse(field, raw))
}

/// Empty cells mean "not set"; anything else must be a number.
pub fn opt_int(field: &'static str, raw: &str) -> Result<Option<i32>, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    int(field, raw).map(Some)
}

/// Run ids are occasionally rendered with a trailing marker (`123#`).
pub fn run_id(field: &'static str, raw: &str) -> Result<u64, Error> {
    int(field, raw.trim().trim_end_matches('#'))
}

/// Repair text the server serialized in the wrong encoding.
///
/// A mojibake name arrives as one char per raw byte; reassembling those
/// bytes and decoding them as UTF-8 recovers the original. Text that is
/// already proper Unicode (any char above U+00FF) is returned untouched,
/// and invalid byte sequences are replaced rather than rejected.
pub fn fix_encoding(raw: &str) -> String {
    if raw.is_ascii() || raw.chars().any(|c| c as u32 > 0xFF) {
        return raw.to_string();
    }
    let bytes: Vec<u8> = raw.chars().map(|c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Base64-decode an embedded payload, degrading to a placeholder when the
/// transport encoding is malformed.
pub fn base64_text(data: &str, placeholder: &str) -> String {
    match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => placeholder.to_string(),
    }
}

/// Presence/absence marker coercion for JSON flags: missing, `null`, `false`,
/// `0` and `""` are unset, everything else is set.
pub fn presence_flag(value: Option<&serde_json::Value>) -> bool {
    use serde_json::Value;
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(_) => true,
    }
}
