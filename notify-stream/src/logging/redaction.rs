//! Redaction of bearer values and sensitive payload fields.
//!
//! The stream transport carries the credential as a `token` query parameter,
//! so every URL is passed through [`redact_url`] before it is logged. Domain
//! payloads are logged through a [`RedactionEngine`], which only clones the
//! parts of a value it actually changes.

use super::constants::{
    DEFAULT_REDACTION_REPLACEMENT, DEFAULT_SENSITIVE_FIELDS, SENSITIVE_QUERY_PARAMS,
};
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOKEN_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    let names = SENSITIVE_QUERY_PARAMS.join("|");
    Regex::new(&format!(r"(?i)([?&](?:{names})=)[^&#\s]*"))
        .expect("token parameter pattern is valid")
});

/// Replaces the value of any credential query parameter in `url`.
///
/// Returns the input unchanged (borrowed) when nothing matched.
pub fn redact_url(url: &str) -> Cow<'_, str> {
    TOKEN_PARAM.replace_all(url, format!("${{1}}{DEFAULT_REDACTION_REPLACEMENT}"))
}

/// Redacts sensitive fields from JSON values.
///
/// Field names are lowercased once at construction.
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    sensitive_fields_lower: HashSet<String>,
    replacement: String,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS.iter().copied())
    }
}

impl RedactionEngine {
    /// Creates an engine for the given field names.
    pub fn new<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            sensitive_fields_lower: fields.into_iter().map(str::to_lowercase).collect(),
            replacement: DEFAULT_REDACTION_REPLACEMENT.to_string(),
        }
    }

    /// Adds a field name to redact.
    #[must_use]
    pub fn with_field(mut self, field: &str) -> Self {
        self.sensitive_fields_lower.insert(field.to_lowercase());
        self
    }

    /// Redacts sensitive fields from a JSON value.
    pub fn redact<'a>(&self, value: &'a Value) -> Cow<'a, Value> {
        match self.redact_internal(value) {
            Some(redacted) => Cow::Owned(redacted),
            None => Cow::Borrowed(value),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key_lower = key.to_lowercase();
        self.sensitive_fields_lower
            .iter()
            .any(|field| key_lower.contains(field.as_str()))
    }

    // None when nothing below `value` needed redaction.
    fn redact_internal(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Object(map) => {
                let mut changed = false;
                let redacted = map
                    .iter()
                    .map(|(key, val)| {
                        if self.is_sensitive(key) {
                            changed = true;
                            (key.clone(), Value::String(self.replacement.clone()))
                        } else if let Some(inner) = self.redact_internal(val) {
                            changed = true;
                            (key.clone(), inner)
                        } else {
                            (key.clone(), val.clone())
                        }
                    })
                    .collect::<serde_json::Map<_, _>>();
                changed.then_some(Value::Object(redacted))
            }
            Value::Array(items) => {
                let mut changed = false;
                let redacted = items
                    .iter()
                    .map(|val| match self.redact_internal(val) {
                        Some(inner) => {
                            changed = true;
                            inner
                        }
                        None => val.clone(),
                    })
                    .collect::<Vec<_>>();
                changed.then_some(Value::Array(redacted))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_url_scrubs_token_parameter() {
        let url = "https://api.example.org/api/v1/notifications/stream?token=eyJhbGciOi.abc.def";
        assert_eq!(
            redact_url(url),
            "https://api.example.org/api/v1/notifications/stream?token=[REDACTED]"
        );
    }

    #[test]
    fn test_redact_url_keeps_other_parameters() {
        let url = "http://localhost/stream?x=1&access_token=secret&y=2#frag";
        assert_eq!(
            redact_url(url),
            "http://localhost/stream?x=1&access_token=[REDACTED]&y=2#frag"
        );
    }

    #[test]
    fn test_redact_url_borrows_when_clean() {
        let url = "http://localhost/health";
        assert!(matches!(redact_url(url), Cow::Borrowed(_)));
    }

    #[test]
    fn test_redaction_engine_nested() {
        let engine = RedactionEngine::default();
        let value = json!({
            "title": "New follower",
            "actor": { "name": "sam", "email": "sam@example.org" },
            "items": [{ "accessToken": "abc" }, { "kind": "post" }]
        });

        let redacted = engine.redact(&value);
        assert_eq!(redacted["title"], "New follower");
        assert_eq!(redacted["actor"]["name"], "sam");
        assert_eq!(redacted["actor"]["email"], "[REDACTED]");
        assert_eq!(redacted["items"][0]["accessToken"], "[REDACTED]");
        assert_eq!(redacted["items"][1]["kind"], "post");
    }

    #[test]
    fn test_redaction_engine_borrows_when_clean() {
        let engine = RedactionEngine::new(["secret"]).with_field("pin");
        let value = json!({ "unread_count": 3, "kind": "comment" });
        assert!(matches!(engine.redact(&value), Cow::Borrowed(_)));
    }
}
