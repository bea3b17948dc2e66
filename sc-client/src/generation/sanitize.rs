//! Turning raw model replies into parseable JSON.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

lazy_static! {
    /// A fence marker and an optional language tag, ended by a newline or by
    /// the JSON opener it runs into. The opener is captured so it can be kept.
    static ref FENCE: Regex = Regex::new(r"```(?:[\w+-]+[ \t]*(?:\r?\n|([\[{]))|json|\r?\n)?")
        .expect("fence pattern is valid");
}

/// Strip code fences and `//` line comments from a model reply.
///
/// Whatever precedes a comment marker on its line is kept untouched, and a
/// `//` inside a JSON string is not a comment. Leading whitespace is trimmed,
/// as is trailing whitespace that spans a line break. The result is a fixed
/// point: cleaning it again changes nothing.
pub fn clean_json(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    while cleaned.contains("```") {
        cleaned = FENCE.replace_all(&cleaned, "${1}").into_owned();
    }

    let without_comments: String = cleaned
        .split_inclusive('\n')
        .map(|segment| {
            let (body, newline) = match segment.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (segment, ""),
            };
            match strip_line_comment(body) {
                Some(kept) => format!("{kept}{newline}"),
                None => segment.to_string(),
            }
        })
        .collect();

    trim_layout(&without_comments).to_string()
}

/// The part of `line` before a `//` that sits outside any string literal.
fn strip_line_comment(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            return Some(&line[..i]);
        }
    }
    None
}

fn trim_layout(text: &str) -> &str {
    let text = text.trim_start();
    let body = text.trim_end();
    if text[body.len()..].contains('\n') {
        body
    } else {
        text
    }
}

/// Parse `text` as JSON, falling back to `default` when it is not valid.
pub fn safe_parse<T: DeserializeOwned>(text: &str, default: T) -> T {
    serde_json::from_str(text).unwrap_or(default)
}

/// Clean a raw reply and parse it, or `None` if nothing usable came back.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = clean_json(raw);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Reply is not the expected JSON ({}): {}", e, cleaned);
            None
        }
    }
}
