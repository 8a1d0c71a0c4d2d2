use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} tag '{value}'")]
pub struct ParseTagError {
    kind: &'static str,
    value: String,
}

impl ParseTagError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

const MESSAGE_KEYS: [&str; 3] = ["detail", "error", "message"];

/// Turns a structured error body into the text shown to the user.
///
/// Returns `None` when the body carries nothing worth surfacing, in which
/// case callers fall back to their own per-operation message.
pub fn describe_error_body(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            for key in MESSAGE_KEYS {
                if let Some(Value::String(text)) = map.get(key) {
                    if !text.trim().is_empty() {
                        return Some(text.clone());
                    }
                }
            }
            if map.is_empty() {
                None
            } else {
                Some(body.to_string())
            }
        }
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) if !items.is_empty() => Some(body.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefers_detail_then_error_then_message() {
        assert_eq!(
            describe_error_body(&json!({"detail": "Not found.", "error": "x"})).as_deref(),
            Some("Not found.")
        );
        assert_eq!(
            describe_error_body(&json!({"error": "Failed to generate protocol: boom"})).as_deref(),
            Some("Failed to generate protocol: boom")
        );
    }

    #[test]
    fn field_errors_are_rendered_verbatim() {
        let body = json!({"prompt": ["Prompt must be at least 10 characters long."]});
        assert_eq!(
            describe_error_body(&body).as_deref(),
            Some(r#"{"prompt":["Prompt must be at least 10 characters long."]}"#)
        );
    }

    #[test]
    fn empty_bodies_have_no_description() {
        assert_eq!(describe_error_body(&json!({})), None);
        assert_eq!(describe_error_body(&json!(null)), None);
        assert_eq!(describe_error_body(&json!("  ")), None);
    }
}
