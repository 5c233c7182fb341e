//! Date attribute conversion.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::schema::{numeric, DateFormat};

/// Read a stored date: unix timestamps (numbers or numeric strings),
/// `YYYY-MM-DD`, the schema's pattern, or RFC 3339.
pub(crate) fn as_date_time(value: &Value, format: &DateFormat) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(secs) => from_timestamp(secs as f64),
            None => n.as_f64().ok_or_else(|| format!("{n} is not a timestamp")).and_then(from_timestamp),
        },
        Value::String(s) => parse_str(s.trim(), format),
        other => Err(format!("{other} is not a date")),
    }
}

fn parse_str(s: &str, format: &DateFormat) -> Result<DateTime<Utc>, String> {
    if let Some(secs) = numeric(s) {
        return from_timestamp(secs);
    }

    if is_standard_date(s) {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string())?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| format!("{s} has no midnight"))?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    if let DateFormat::Pattern(pattern) = format {
        if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
            return Ok(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("cannot parse [{s}]: {e}"))
}

fn is_standard_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn from_timestamp(secs: f64) -> Result<DateTime<Utc>, String> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
        .single()
        .ok_or_else(|| format!("{secs} is out of range"))
}

/// Storage form of a date under the schema's format.
pub(crate) fn format_date(date: &DateTime<Utc>, format: &DateFormat) -> Result<Value, String> {
    match format {
        DateFormat::Unix => Ok(Value::from(date.timestamp())),
        DateFormat::Pattern(pattern) => {
            let mut out = String::new();
            write!(out, "{}", date.format(pattern)).map_err(|_| format!("invalid date pattern [{pattern}]"))?;
            Ok(Value::String(out))
        }
    }
}
