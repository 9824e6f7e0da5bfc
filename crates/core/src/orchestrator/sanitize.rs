//! Error message scrubbing before persistence.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Longest error message stored on a report, in characters.
pub const MAX_ERROR_CHARS: usize = 500;

const REDACTED: &str = "[REDACTED]";

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").unwrap());

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(x-api-key|api[_-]?key|access[_-]?token|token|password|passwd|secret|signature)(["']?\s*[=:]\s*["']?)[^\s&"',;]+"#,
    )
    .unwrap()
});

static URL_USERINFO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z][a-z0-9+.-]*://)[^/\s@]+@").unwrap());

static SECRET_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsk-[A-Za-z0-9_-]{8,}").unwrap());

/// Redact credentials from an error message, flatten it to one line and
/// truncate it to [`MAX_ERROR_CHARS`].
pub fn sanitize_error(message: &str) -> String {
    let flat = message.split_whitespace().collect::<Vec<_>>().join(" ");

    let redacted = BEARER.replace_all(&flat, format!("Bearer {}", REDACTED).as_str());
    let redacted = KEY_VALUE.replace_all(&redacted, format!("${{1}}${{2}}{}", REDACTED).as_str());
    let redacted = URL_USERINFO.replace_all(&redacted, format!("${{1}}{}@", REDACTED).as_str());
    let redacted = SECRET_KEY.replace_all(&redacted, format!("sk-{}", REDACTED).as_str());

    truncate(&redacted, MAX_ERROR_CHARS)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
