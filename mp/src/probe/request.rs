//! Probe request shapes
//!
//! Targets disagree on parameter names: some families take
//! `max_completion_tokens` instead of `max_tokens`, and some reject
//! `temperature`. The initial shape is picked from identifier markers; when
//! the upstream still rejects it, the error text drives a single reduced retry.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::debug;

const MAX_TOKENS: &str = "max_tokens";
const MAX_COMPLETION_TOKENS: &str = "max_completion_tokens";
const TEMPERATURE: &str = "temperature";

/// Matches "unsupported parameter: 'x'", "'x' is not supported", "x is unsupported" and similar
static UNSUPPORTED_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:unsupported\s+(?:parameter|value)\s*:?\s*['"`]?(?P<a>[a-z_]+))|(?:['"`]?(?P<b>[a-z_]+)['"`]?\s+(?:is\s+)?(?:not\s+supported|unsupported|does\s+not\s+support))"#,
    )
    .expect("static regex")
});

/// Which response-size cap parameter a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenParam {
    MaxTokens,
    MaxCompletionTokens,
    Omitted,
}

impl TokenParam {
    fn name(self) -> Option<&'static str> {
        match self {
            Self::MaxTokens => Some(MAX_TOKENS),
            Self::MaxCompletionTokens => Some(MAX_COMPLETION_TOKENS),
            Self::Omitted => None,
        }
    }
}

/// Parameter set for one probe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestShape {
    pub token_param: TokenParam,
    pub temperature: bool,
}

impl RequestShape {
    /// Initial shape for a target, from identifier family markers
    ///
    /// Identifiers containing any marker use `max_completion_tokens` and
    /// omit `temperature`.
    pub fn for_target(target: &str, completion_token_markers: &[String]) -> Self {
        let uses_completion_tokens = completion_token_markers.iter().any(|m| target.contains(m.as_str()));
        debug!(%target, uses_completion_tokens, "RequestShape::for_target: called");
        if uses_completion_tokens {
            Self {
                token_param: TokenParam::MaxCompletionTokens,
                temperature: false,
            }
        } else {
            Self {
                token_param: TokenParam::MaxTokens,
                temperature: true,
            }
        }
    }

    /// JSON request body
    pub fn body(&self, target: &str, prompt: &str, max_tokens: u32) -> Value {
        let mut body = json!({
            "model": target,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(name) = self.token_param.name() {
            body[name] = json!(max_tokens);
        }
        if self.temperature {
            body[TEMPERATURE] = json!(0);
        }
        body
    }

    /// Reduced shape for a retry after a parameter-shape rejection
    ///
    /// An error naming both token parameters always yields a
    /// `max_completion_tokens` retry. Otherwise returns `None` when the error
    /// does not describe a parameter mismatch, or when the inferred shape
    /// would be identical to this one.
    pub fn adjusted_for(&self, error: &str) -> Option<Self> {
        if !is_shape_mismatch(error) {
            return None;
        }

        let names_both = mentions_param(error, MAX_TOKENS) && error.contains(MAX_COMPLETION_TOKENS);
        if names_both {
            let adjusted = Self {
                token_param: TokenParam::MaxCompletionTokens,
                temperature: false,
            };
            debug!(?adjusted, "RequestShape::adjusted_for: both token parameters named");
            return Some(adjusted);
        }

        let token_param = if rejected_params(error).iter().any(|p| Some(p.as_str()) == self.token_param.name()) {
            TokenParam::Omitted
        } else {
            self.token_param
        };

        let adjusted = Self {
            token_param,
            temperature: false,
        };
        debug!(?adjusted, "RequestShape::adjusted_for: inferred shape");
        (adjusted != *self).then_some(adjusted)
    }
}

/// True when an error message describes a rejected request parameter
pub fn is_shape_mismatch(error: &str) -> bool {
    if mentions_param(error, MAX_TOKENS) && error.contains(MAX_COMPLETION_TOKENS) {
        return true;
    }
    let lower = error.to_lowercase();
    let unsupported = lower.contains("not support") || lower.contains("unsupported");
    unsupported
        && (lower.contains(TEMPERATURE)
            || mentions_param(&lower, MAX_TOKENS)
            || lower.contains(MAX_COMPLETION_TOKENS)
            || !rejected_params(error).is_empty())
}

/// `max_tokens` as a standalone word, not as the tail of `max_completion_tokens`
fn mentions_param(error: &str, param: &str) -> bool {
    error.match_indices(param).any(|(idx, _)| {
        let before = error[..idx].chars().next_back();
        !before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Parameter names the error explicitly calls unsupported
fn rejected_params(error: &str) -> Vec<String> {
    UNSUPPORTED_PARAM
        .captures_iter(error)
        .filter_map(|caps| caps.name("a").or_else(|| caps.name("b")))
        .map(|m| m.as_str().to_lowercase())
        .filter(|name| name.contains('_') || name == TEMPERATURE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["/o1".to_string(), "/gpt-5".to_string()]
    }

    #[test]
    fn test_default_shape() {
        let shape = RequestShape::for_target("openai/gpt-4o", &markers());
        assert_eq!(shape.token_param, TokenParam::MaxTokens);
        assert!(shape.temperature);

        let body = shape.body("openai/gpt-4o", "What is 2+2?", 10);
        assert_eq!(body["model"], "openai/gpt-4o");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["temperature"], 0);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_family_marker_shape() {
        let shape = RequestShape::for_target("openai/o1-mini", &markers());
        assert_eq!(shape.token_param, TokenParam::MaxCompletionTokens);
        assert!(!shape.temperature);

        let body = shape.body("openai/o1-mini", "p", 10);
        assert_eq!(body["max_completion_tokens"], 10);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_both_token_params_switch_to_completion_tokens() {
        let shape = RequestShape::for_target("openai/gpt-4.1", &markers());
        let error = "Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead.";
        let retry = shape.adjusted_for(error).unwrap();
        assert_eq!(retry.token_param, TokenParam::MaxCompletionTokens);
        assert!(!retry.temperature);
    }

    #[test]
    fn test_both_token_params_keep_completion_tokens() {
        let shape = RequestShape::for_target("openai/o1-mini", &markers());
        let error = "Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead.";
        let retry = shape.adjusted_for(error).unwrap();
        assert_eq!(retry.token_param, TokenParam::MaxCompletionTokens);
        assert!(retry.body("openai/o1-mini", "p", 10).get("max_tokens").is_none());
    }

    #[test]
    fn test_temperature_rejection_drops_temperature() {
        let shape = RequestShape::for_target("deepseek/deepseek-r1", &markers());
        let error = "Unsupported value: 'temperature' does not support 0 with this model.";
        let retry = shape.adjusted_for(error).unwrap();
        assert_eq!(retry.token_param, TokenParam::MaxTokens);
        assert!(!retry.temperature);
    }

    #[test]
    fn test_rejected_token_param_is_omitted() {
        let shape = RequestShape::for_target("xai/grok-3", &markers());
        let error = "Unsupported parameter: 'max_tokens'";
        let retry = shape.adjusted_for(error).unwrap();
        assert_eq!(retry.token_param, TokenParam::Omitted);
        assert!(retry.body("xai/grok-3", "p", 10).get("max_tokens").is_none());
    }

    #[test]
    fn test_unrelated_error_is_not_mismatch() {
        let shape = RequestShape::for_target("openai/gpt-4o", &markers());
        assert!(shape.adjusted_for("Unknown model: openai/gpt-4o").is_none());
        assert!(shape.adjusted_for("").is_none());
        assert!(!is_shape_mismatch("Rate limit exceeded"));
    }

    #[test]
    fn test_identical_shape_is_not_retried() {
        let shape = RequestShape::for_target("openai/o1", &markers());
        // Already sending no temperature with completion tokens
        assert!(shape.adjusted_for("temperature is not supported").is_none());
    }

    #[test]
    fn test_max_tokens_word_boundary() {
        assert!(!mentions_param("use max_completion_tokens", MAX_TOKENS));
        assert!(mentions_param("max_tokens is too large", MAX_TOKENS));
        assert!(mentions_param("'max_tokens'", MAX_TOKENS));
    }
}
