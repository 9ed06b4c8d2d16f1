use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::Result;

/// Field paths probed for a publish timestamp, highest priority first.
const TIMESTAMP_FIELDS: &[&[&str]] = &[
    &["timestamp"],
    &["generatedAt"],
    &["time"],
    &["meta", "timestamp"],
];

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn decode_payload(body: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(body)?)
}

/// Epoch milliseconds of the first timestamp field that is present and
/// parses to a finite positive number.
pub fn extract_timestamp(payload: &Value) -> Option<f64> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(timestamp_value)
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(payload, |node, field| node.as_object()?.get(*field))
}

fn timestamp_value(candidate: &Value) -> Option<f64> {
    let millis = match candidate {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let text = text.trim();
            parse_calendar(text).or_else(|| text.parse::<f64>().ok())?
        }
        _ => return None,
    };
    (millis.is_finite() && millis > 0.0).then_some(millis)
}

fn parse_calendar(text: &str) -> Option<f64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis() as f64);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.timestamp_millis() as f64);
    }
    // Zone-less forms are read as UTC.
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc().timestamp_millis() as f64);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis() as f64)
}
