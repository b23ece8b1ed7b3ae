//! Parsing the gateway CLI's status output.
//!
//! The CLI's output format is not stable across its own versions: newer
//! builds print JSON, older ones free text, and a crashed invocation prints
//! nothing. The parser tries machine-readable signals first and only falls
//! back to text heuristics when no JSON is present at all.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::GatewayStatus;

static LISTENING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Listening:\s*\d{1,3}(?:\.\d{1,3}){3}:\d+")
        .expect("constant regex pattern is valid")
});

static REACHABLE_TRUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""reachable"\s*:\s*true"#).expect("constant regex pattern is valid")
});

static OK_TRUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""ok"\s*:\s*true"#).expect("constant regex pattern is valid")
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[a-zA-Z][a-zA-Z0-9+.-]*://[^\s"'<>]+"#)
        .expect("constant regex pattern is valid")
});

static DASHBOARD_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)Dashboard:\s*([a-zA-Z][a-zA-Z0-9+.-]*://[^\s"'<>]+)"#)
        .expect("constant regex pattern is valid")
});

/// Parse raw CLI output into a status, in strict precedence order:
/// embedded JSON with a `running` field, then the two known nested shapes,
/// then text heuristics. Returns `None` when the output is JSON but matches
/// no known shape, so the caller can try its next status source instead of
/// degrading structured output to string matching.
pub fn parse_status(raw: &str) -> Option<GatewayStatus> {
    if let Some(value) = extract_json_object(raw) {
        return parse_structured(&value);
    }
    Some(parse_heuristics(raw))
}

/// Parse the substring between the first `{` and the last `}` as JSON.
pub(super) fn extract_json_object(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn parse_structured(value: &Value) -> Option<GatewayStatus> {
    if let Some(running) = value.get("running").and_then(Value::as_bool) {
        return Some(GatewayStatus {
            running,
            url: running
                .then(|| value.get("url").and_then(Value::as_str))
                .flatten()
                .map(normalize_endpoint),
            pid: value
                .get("pid")
                .and_then(Value::as_u64)
                .and_then(|p| u32::try_from(p).ok()),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    // Older CLI builds nest the signal under "gateway" or "rpc".
    if let Some(gateway) = value.get("gateway") {
        if let Some(reachable) = gateway.get("reachable").and_then(Value::as_bool) {
            return Some(GatewayStatus {
                running: reachable,
                url: reachable
                    .then(|| gateway.get("url").and_then(Value::as_str))
                    .flatten()
                    .map(normalize_endpoint),
                pid: None,
                error: gateway
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    if let Some(rpc) = value.get("rpc") {
        if let Some(ok) = rpc.get("ok").and_then(Value::as_bool) {
            return Some(GatewayStatus {
                running: ok,
                url: ok
                    .then(|| rpc.get("url").and_then(Value::as_str))
                    .flatten()
                    .map(normalize_endpoint),
                pid: None,
                error: None,
            });
        }
    }

    None
}

fn parse_heuristics(raw: &str) -> GatewayStatus {
    let trimmed = raw.trim();

    let running = trimmed.to_lowercase().contains("rpc probe: ok")
        || LISTENING_PATTERN.is_match(trimmed)
        || REACHABLE_TRUE_PATTERN.is_match(trimmed)
        || OK_TRUE_PATTERN.is_match(trimmed);

    if !running {
        let error = (!trimmed.is_empty()).then(|| trimmed.to_string());
        return GatewayStatus::stopped(error);
    }

    let url = DASHBOARD_URL_PATTERN
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| URL_PATTERN.find(trimmed).map(|m| m.as_str()))
        .map(normalize_endpoint);

    GatewayStatus {
        running: true,
        url,
        pid: None,
        error: None,
    }
}

/// Rewrite raw-socket schemes to their browsable equivalents: `ws://`
/// becomes `http://` and `wss://` becomes `https://`, with a `/` appended
/// to a bare authority. Other schemes pass through unchanged.
fn normalize_endpoint(url: &str) -> String {
    let rewritten = if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        return url.to_string();
    };

    let has_path = rewritten
        .split_once("://")
        .is_some_and(|(_, rest)| rest.contains('/'));
    if has_path {
        rewritten
    } else {
        format!("{rewritten}/")
    }
}
