//! Shared utility functions used across multiple modules.

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Convert a timestamp to Unix milliseconds for storage.
pub fn to_unix_ms(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp.
///
/// Out-of-range values clamp to the Unix epoch.
pub fn from_unix_ms(value: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Shell-style glob match (`*`, `?`, `[...]`) against a whole file name.
///
/// Invalid patterns never match.
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let mut expression = String::with_capacity(pattern.len() * 2 + 2);
    expression.push('^');
    let mut in_class = false;
    for ch in pattern.chars() {
        match ch {
            '*' if !in_class => expression.push_str(".*"),
            '?' if !in_class => expression.push('.'),
            '[' if !in_class => {
                in_class = true;
                expression.push('[');
            }
            ']' if in_class => {
                in_class = false;
                expression.push(']');
            }
            '!' if in_class && expression.ends_with('[') => expression.push('^'),
            '\\' | '^' | '$' | '.' | '|' | '+' | '(' | ')' | '{' | '}' if !in_class => {
                expression.push('\\');
                expression.push(ch);
            }
            _ => expression.push(ch),
        }
    }
    expression.push('$');

    Regex::new(&expression).is_ok_and(|re| re.is_match(name))
}

/// File name extension in lowercase, without the dot.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.trim().rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
