//! Title templates.
//!
//! Placeholders look like `{{ item.name }}` and resolve dotted paths into a
//! JSON context. Unknown paths render as an empty string.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("Invalid regex")
    })
}

/// Render `template` against `context`.
pub fn render(template: &str, context: &Value) -> String {
    placeholder_pattern()
        .replace_all(template, |captures: &Captures<'_>| {
            lookup(context, &captures[1]).map_or_else(String::new, scalar_text)
        })
        .trim()
        .to_string()
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
