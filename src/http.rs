use reqwest::{header::HeaderMap, StatusCode};
use serde_json::Value;

use crate::{
    errors::{APIError, Error},
    REQUEST_ID_HEADER,
};

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    for name in [REQUEST_ID_HEADER, "X-Request-Id"] {
        if let Some(value) = headers.get(name) {
            if let Ok(s) = value.to_str() {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Pulls a human-readable message out of a fal error body.
///
/// fal answers with `{"detail": "..."}`, with validation lists of the form
/// `{"detail": [{"loc": [...], "msg": "..."}]}`, or with `error`/`message` keys.
fn message_from_body(value: &Value) -> Option<String> {
    match value.get("detail") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg").and_then(|v| v.as_str())?;
                    let loc = item
                        .get("loc")
                        .and_then(|v| v.as_array())
                        .map(|parts| {
                            parts
                                .iter()
                                .map(|p| match p {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        })
                        .filter(|s| !s.is_empty());
                    Some(match loc {
                        Some(loc) => format!("{loc}: {msg}"),
                        None => msg.to_string(),
                    })
                })
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    if let Some(err) = value.get("error") {
        if let Some(s) = err.as_str() {
            return Some(s.to_string());
        }
        if let Some(s) = err.get("message").and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    value
        .get("message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub(crate) fn parse_api_error_parts(status: StatusCode, headers: &HeaderMap, body: String) -> Error {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.is_empty() {
        return APIError {
            status: status_code,
            message: status_text,
            request_id,
            raw_body: None,
        }
        .into();
    }

    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| message_from_body(&value))
        .unwrap_or_else(|| body.clone());

    APIError {
        status: status_code,
        message,
        request_id,
        raw_body: Some(body),
    }
    .into()
}
