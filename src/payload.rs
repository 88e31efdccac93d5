use crate::constants::{DATA_PREFIX, DONE_SENTINEL, FRAGMENT_FIELDS, LOG_PREVIEW_CHARS};
use serde_json::Value;

/// Classification of one line from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Ignorable,
    Sentinel,
    Fragment(String),
}

/// Classifies a single line.
///
/// Payload encoding can change from line to line: a JSON object carrying
/// `text`, `content` or `message`, a bare JSON string, or plain text.
/// Anything that fails to decode is passed through verbatim.
pub fn extract(line: &str) -> LineKind {
    if line.trim().is_empty() {
        return LineKind::Ignorable;
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return LineKind::Ignorable;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);

    if payload.trim() == DONE_SENTINEL {
        return LineKind::Sentinel;
    }

    LineKind::Fragment(decode_payload(payload))
}

fn decode_payload(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(text)) => text,
        Ok(Value::Object(map)) => {
            let field = FRAGMENT_FIELDS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str));
            match field {
                Some(text) => text.to_string(),
                None => payload.to_string(),
            }
        }
        Ok(_) => payload.to_string(),
        Err(e) => {
            tracing::trace!(
                "[☁️  -> ⚙️ ] Non-JSON payload ({}), using literal text: {}",
                e,
                crate::str_utils::preview(payload, LOG_PREVIEW_CHARS)
            );
            payload.to_string()
        }
    }
}
