//! Normalization of textual warehouse cells into typed values.
//!
//! The JSON result format transports every cell as a string; the column's
//! declared type decides how it is interpreted. Cells that do not parse as
//! their declared type are passed through as strings.

use super::{ColumnDescriptor, Value};
use chrono::{DateTime, FixedOffset, NaiveTime, SecondsFormat};

const SECONDS_PER_DAY: i64 = 86_400;

/// Offset bias used by `timestamp_tz` cells.
const TZ_OFFSET_BIAS_MINUTES: i32 = 1_440;

/// Converts one raw cell according to its column metadata.
pub fn convert_cell(raw: Option<&str>, column: &ColumnDescriptor) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };

    let converted = match column.data_type.to_lowercase().as_str() {
        "fixed" => convert_fixed(raw, column.scale.unwrap_or(0)),
        "real" => raw.parse::<f64>().ok().map(Value::Float),
        "boolean" => convert_bool(raw),
        "date" => convert_date(raw),
        "time" => convert_time(raw),
        "timestamp_ntz" => parse_epoch(raw)
            .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
            .map(|dt| {
                Value::String(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }),
        "timestamp_ltz" => parse_epoch(raw)
            .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        "timestamp_tz" => convert_timestamp_tz(raw),
        "variant" | "object" | "array" => serde_json::from_str(raw).ok().map(Value::Json),
        _ => None,
    };

    converted.unwrap_or_else(|| Value::String(raw.to_string()))
}

fn convert_fixed(raw: &str, scale: i64) -> Option<Value> {
    if scale == 0 {
        raw.parse::<i64>().ok().map(Value::Int)
    } else {
        raw.parse::<f64>().ok().map(Value::Float)
    }
}

fn convert_bool(raw: &str) -> Option<Value> {
    match raw.to_lowercase().as_str() {
        "1" | "true" => Some(Value::Bool(true)),
        "0" | "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn convert_date(raw: &str) -> Option<Value> {
    let days: i64 = raw.parse().ok()?;
    let dt = DateTime::from_timestamp(days.checked_mul(SECONDS_PER_DAY)?, 0)?;
    Some(Value::String(dt.date_naive().to_string()))
}

fn convert_time(raw: &str) -> Option<Value> {
    let (secs, nanos) = parse_epoch(raw)?;
    let secs = u32::try_from(secs).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
    Some(Value::String(time.to_string()))
}

fn convert_timestamp_tz(raw: &str) -> Option<Value> {
    let (epoch, offset) = raw.split_once(' ')?;
    let (secs, nanos) = parse_epoch(epoch)?;
    let offset_minutes = offset.trim().parse::<i32>().ok()? - TZ_OFFSET_BIAS_MINUTES;
    let offset = FixedOffset::east_opt(offset_minutes * 60)?;
    let dt = DateTime::from_timestamp(secs, nanos)?.with_timezone(&offset);
    Some(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)))
}

/// Splits `seconds[.fraction]` into whole seconds and nanoseconds.
///
/// Negative values keep a non-negative nanosecond part, so `-1.5` becomes
/// `(-2, 500_000_000)`.
fn parse_epoch(raw: &str) -> Option<(i64, u32)> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let negative = whole.starts_with('-');
    let mut secs: i64 = whole.parse().ok()?;

    if fraction.is_empty() {
        return Some((secs, 0));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
    let mut nanos: u32 = digits.parse().ok()?;

    if negative && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }
    Some((secs, nanos))
}
