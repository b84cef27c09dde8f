//! Response classification
//!
//! Maps an HTTP status, headers and body onto an [`OutcomeKind`]. Bodies are
//! checked against a small closed set of known answer shapes; anything that
//! does not match one of them is a failure, never a success.

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::domain::OutcomeKind;

/// Detail recorded when a 2xx response carries no usable answer
pub const EMPTY_CONTENT_DETAIL: &str = "Response lacks meaningful content";

const RATE_LIMIT_VOCABULARY: &[&str] = &["rate limit", "ratelimit", "rate-limit", "quota", "too many requests"];

const AUTH_VOCABULARY: &[&str] = &["not authorized", "unauthorized", "access denied", "forbidden", "permission"];

/// Classify a completed HTTP exchange
pub fn classify(status: u16, headers: &HeaderMap, body: &str) -> OutcomeKind {
    let retry_hint = headers.contains_key("retry-after");

    if is_success_status(status) {
        if has_answer(body) {
            return OutcomeKind::Success;
        }
        // A throttled upstream sometimes answers 200 with an empty completion
        return if retry_hint { OutcomeKind::RateLimited } else { OutcomeKind::Failure };
    }

    let message = error_message(body).to_lowercase();

    if status == 429 || status >= 500 || retry_hint || mentions_any(&message, RATE_LIMIT_VOCABULARY) {
        return OutcomeKind::RateLimited;
    }

    if status == 401 || status == 403 || mentions_any(&message, AUTH_VOCABULARY) {
        return OutcomeKind::AuthError;
    }

    OutcomeKind::Failure
}

pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

fn mentions_any(message: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|word| message.contains(word))
}

/// Extract the upstream error message from a non-2xx body
///
/// Prefers `error.message` (or a bare string `error`, or top-level `message`)
/// from a JSON body; falls back to the raw text.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => {
            let from_json = json
                .pointer("/error/message")
                .and_then(Value::as_str)
                .or_else(|| json.get("error").and_then(Value::as_str))
                .or_else(|| json.get("message").and_then(Value::as_str));
            from_json.map(str::to_string).unwrap_or_else(|| body.trim().to_string())
        }
        Err(_) => body.trim().to_string(),
    }
}

/// True when the body holds a non-blank textual answer in a known shape
pub fn has_answer(body: &str) -> bool {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    answer_text(&json).is_some_and(|text| !text.trim().is_empty())
}

/// The answer text from the first recognised shape present in the body
fn answer_text(json: &Value) -> Option<&str> {
    if let Some(choice) = json.get("choices").and_then(Value::as_array).and_then(|c| c.first()) {
        if let Some(content) = choice.pointer("/message/content").and_then(Value::as_str) {
            return Some(content);
        }
        if let Some(content) = choice.pointer("/delta/content").and_then(Value::as_str) {
            return Some(content);
        }
    }
    json.get("content")
        .and_then(Value::as_str)
        .or_else(|| json.get("text").and_then(Value::as_str))
}
