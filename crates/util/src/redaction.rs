//! Secret redaction for anything that may end up in logs or on stdout.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// Each pattern captures the text to keep in group 1 and the secret in group 2.
static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(bearer\s+)([A-Za-z0-9\-_.~+/=]+)",
        r"(?i)([?&]sig=)([^&\s]+)",
        r"(?i)(AccountKey=)([^;\s]+)",
        r#"(?i)("?(?:client_secret|password|access_token|admin_password)"?\s*[:=]\s*"?)([^"\s,}]+)"#,
        r"(?i)([A-Z0-9_]*(?:TOKEN|SECRET|PASSWORD)=)(\S+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Replaces values that look like credentials with `[REDACTED]`, keeping the
/// key or header name so the output stays readable.
///
/// ```rust
/// use imagesmith_util::redact_sensitive;
///
/// assert_eq!(redact_sensitive("Authorization: Bearer eyJ0eXAi"), "Authorization: Bearer [REDACTED]");
/// assert_eq!(redact_sensitive("AZURE_ACCESS_TOKEN=abc"), "AZURE_ACCESS_TOKEN=[REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    REDACT_PATTERNS.iter().fold(input.to_string(), |text, pattern| {
        pattern
            .replace_all(&text, |captures: &regex::Captures| {
                let keep = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                format!("{keep}{REDACTED}")
            })
            .into_owned()
    })
}
