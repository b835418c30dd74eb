use crate::state::{PersistedState, STATE_SCHEMA_VERSION, StreamCursor};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Deserialize)]
struct RawState {
    version: Option<u32>,
    updated_at: Option<String>,
    pull_requests: Option<RawCursor>,
    releases: Option<RawCursor>,
}

#[derive(Debug, Deserialize)]
struct RawCursor {
    last_seen_at: Option<String>,
    processed_ids: Option<Vec<Value>>,
}

/// Decodes a state document. Errors are plain messages; the caller attaches
/// the file path.
pub fn decode(raw: &str) -> Result<PersistedState, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err("state must be a JSON object".to_string());
    }
    let parsed: RawState =
        serde_json::from_value(value).map_err(|e| format!("unexpected layout: {e}"))?;

    // Hand-written files may omit the version.
    let version = parsed.version.unwrap_or(STATE_SCHEMA_VERSION);
    if version != STATE_SCHEMA_VERSION {
        return Err(format!(
            "unsupported version {version}; expected version = {STATE_SCHEMA_VERSION}"
        ));
    }

    let updated_at = parsed
        .updated_at
        .as_deref()
        .map(|raw| parse_timestamp(raw, "updated_at"))
        .transpose()?;

    Ok(PersistedState {
        version,
        updated_at,
        pull_requests: decode_cursor(parsed.pull_requests, "pull_requests")?,
        releases: decode_cursor(parsed.releases, "releases")?,
    })
}

pub fn encode(state: &PersistedState) -> serde_json::Result<String> {
    let mut raw = serde_json::to_string_pretty(state)?;
    raw.push('\n');
    Ok(raw)
}

fn decode_cursor(raw: Option<RawCursor>, section: &str) -> Result<StreamCursor, String> {
    let Some(raw) = raw else {
        return Ok(StreamCursor::default());
    };
    let last_seen_at = raw
        .last_seen_at
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_timestamp(s, &format!("{section}.last_seen_at")))
        .transpose()?;
    let mut processed_ids = BTreeSet::new();
    for value in raw.processed_ids.unwrap_or_default() {
        processed_ids.insert(decode_id(&value).ok_or_else(|| {
            format!("{section}.processed_ids must contain integers, found {value}")
        })?);
    }
    Ok(StreamCursor {
        last_seen_at,
        processed_ids,
    })
}

fn decode_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("{field} is not an RFC 3339 timestamp ({raw:?}): {e}"))
}
