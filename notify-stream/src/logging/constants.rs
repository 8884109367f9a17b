//! Defaults for the logging module.

/// Replacement string for redacted values.
pub const DEFAULT_REDACTION_REPLACEMENT: &str = "[REDACTED]";

/// JSON field names redacted from logged payloads.
///
/// Matching is case-insensitive and uses substring matching, so `accessToken`
/// is caught by `token`.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "authorization",
    "credential",
    "bearer",
    "email",
    "phone",
];

/// Query parameters whose values are scrubbed from logged URLs.
pub const SENSITIVE_QUERY_PARAMS: &[&str] =
    &["token", "access_token", "id_token", "refresh_token"];
