//! Timestamp normalization.
//!
//! Legacy exports use a mix of ISO-8601 spellings: space separators, `Z`/`z`
//! suffixes, `+02:00`, `+0200` and `+02` offsets, or no zone at all. Every
//! accepted form is converted to a UTC `YYYY-MM-DDTHH:MM:SSZ` string.

use crate::error::{MigrationError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Timestamp fields in lookup priority order
pub const MESSAGE_TIMESTAMP_KEYS: &[&str] = &[
    "timestamp",
    "ts",
    "time",
    "created_at",
    "export_ts_hint",
    "occurred_at",
];

pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y%m%dT%H%M%S",
];

pub fn format_canonical(instant: &DateTime<Utc>) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Normalize the first present timestamp field of a message.
///
/// Messages without a timestamp get `fallback`, or the current instant.
pub fn normalize_timestamp(
    message: &Map<String, Value>,
    fallback: Option<DateTime<Utc>>,
) -> Result<String> {
    let raw = MESSAGE_TIMESTAMP_KEYS
        .iter()
        .find_map(|key| message.get(*key).and_then(present_text));

    let Some(raw) = raw else {
        return Ok(format_canonical(&fallback.unwrap_or_else(Utc::now)));
    };

    let instant = parse_timestamp(&raw).ok_or_else(|| {
        MigrationError::migration(format!(
            "Invalid timestamp '{}' (expected ISO-8601 format)",
            raw
        ))
    })?;
    let canonical = format_canonical(&instant);

    let original = raw.trim();
    if let Some(stem) = original.strip_suffix('z').or_else(|| original.strip_suffix('Z')) {
        let upcased = format!("{}Z", stem);
        if upcased == canonical {
            return Ok(upcased);
        }
    }

    Ok(canonical)
}

/// Parse an ISO-8601 style timestamp into UTC. Values without a zone are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return None;
    }

    let (body, mut offset) = match cleaned
        .strip_suffix('Z')
        .or_else(|| cleaned.strip_suffix('z'))
    {
        Some(body) => (body, Some(FixedOffset::east_opt(0)?)),
        None => (cleaned, None),
    };

    let mut body = body.to_string();
    if !body.contains('T') {
        if let Some(pos) = body.find(' ') {
            body.replace_range(pos..pos + 1, "T");
        }
    }

    if offset.is_none() {
        if let Some(split) = find_offset_start(&body) {
            offset = Some(parse_offset(&body[split..])?);
            body.truncate(split);
        }
    }

    let naive = parse_naive(body.trim_end())?;
    let instant = match offset {
        Some(offset) => offset.from_local_datetime(&naive).single()?.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    };
    Some(instant)
}

/// Index of a `+`/`-` offset sign inside the time portion, if any
fn find_offset_start(body: &str) -> Option<usize> {
    let time_start = body.find('T')? + 1;
    body[time_start..]
        .rfind(['+', '-'])
        .map(|idx| time_start + idx)
}

/// Parse `+HH`, `+HHMM`, `+HH:MM`, `+HHMMSS` or `+HH:MM:SS`
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let mut chars = raw.chars();
    let sign = match chars.next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };

    let digits: String = chars.filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<i32>().ok();
    let (hours, minutes, seconds) = match digits.len() {
        2 => (field(0..2)?, 0, 0),
        4 => (field(0..2)?, field(2..4)?, 0),
        6 => (field(0..2)?, field(2..4)?, field(4..6)?),
        _ => return None,
    };

    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))
}

fn parse_naive(body: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(body, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(body, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Text of a timestamp field when it counts as present.
///
/// `null`, `false`, `0`, and empty strings or containers are treated as absent.
fn present_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> Result<String> {
        let message = json!({ "timestamp": value });
        normalize_timestamp(message.as_object().unwrap(), None)
    }

    #[test]
    fn test_preserves_existing_z_suffix() {
        assert_eq!(
            normalize(json!("2023-05-05T12:34:56Z")).unwrap(),
            "2023-05-05T12:34:56Z"
        );
    }

    #[test]
    fn test_lowercase_z_is_upcased() {
        assert_eq!(
            normalize(json!("2023-05-05T12:34:56z")).unwrap(),
            "2023-05-05T12:34:56Z"
        );
    }

    #[test]
    fn test_space_separated_z_timestamp() {
        assert_eq!(
            normalize(json!("2023-05-05 15:00:00Z")).unwrap(),
            "2023-05-05T15:00:00Z"
        );
    }

    #[test]
    fn test_offsets_are_converted_to_utc() {
        for value in [
            "2023-05-05T12:34:56+02:00",
            "2023-05-05T12:34:56+0200",
            "2023-05-05T12:34:56+02",
            "2023-05-05 12:34:56+02:00",
            "2023-05-05T12:34:56.250+02:00",
        ] {
            assert_eq!(normalize(json!(value)).unwrap(), "2023-05-05T10:34:56Z", "{value}");
        }
    }

    #[test]
    fn test_negative_offset_crosses_midnight() {
        assert_eq!(
            normalize(json!("2023-12-31T22:30:00-05:30")).unwrap(),
            "2024-01-01T04:00:00Z"
        );
    }

    #[test]
    fn test_naive_timestamp_assumed_utc() {
        assert_eq!(
            normalize(json!("2023-05-05T12:34:56")).unwrap(),
            "2023-05-05T12:34:56Z"
        );
        assert_eq!(normalize(json!("2023-05-05")).unwrap(), "2023-05-05T00:00:00Z");
    }

    #[test]
    fn test_fractional_z_is_truncated_to_seconds() {
        assert_eq!(
            normalize(json!("2023-05-05T12:34:56.789Z")).unwrap(),
            "2023-05-05T12:34:56Z"
        );
    }

    #[test]
    fn test_invalid_timestamp_names_value() {
        let err = normalize(json!("not-a-date")).unwrap_err();
        assert!(matches!(err, MigrationError::Migration(_)));
        assert!(err.to_string().contains("'not-a-date'"));

        assert!(normalize(json!("2023-05-05T12:34:56+2")).is_err());
        assert!(normalize(json!(1_700_000_000)).is_err());
    }

    #[test]
    fn test_alias_priority_and_blank_values() {
        let message = json!({
            "timestamp": "",
            "ts": null,
            "time": "2024-02-02T02:02:02Z",
            "created_at": "2020-01-01T00:00:00Z"
        });
        assert_eq!(
            normalize_timestamp(message.as_object().unwrap(), None).unwrap(),
            "2024-02-02T02:02:02Z"
        );
    }

    #[test]
    fn test_missing_timestamp_uses_fallback() {
        let anchor = Utc.with_ymd_and_hms(2022, 1, 2, 3, 4, 5).unwrap();
        let message = json!({"content": "hi"});
        assert_eq!(
            normalize_timestamp(message.as_object().unwrap(), Some(anchor)).unwrap(),
            "2022-01-02T03:04:05Z"
        );

        let now = normalize_timestamp(message.as_object().unwrap(), None).unwrap();
        assert!(now.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&now).is_ok());
    }

    #[test]
    fn test_parse_timestamp_instant_matches_offset_input() {
        let parsed = parse_timestamp("2023-05-05T12:34:56-0130").unwrap();
        let expected = DateTime::parse_from_rfc3339("2023-05-05T12:34:56-01:30").unwrap();
        assert_eq!(parsed, expected.with_timezone(&Utc));
    }
}
