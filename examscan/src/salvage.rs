//! Recovery of JSON from model output that may be fenced, truncated or
//! carry unescaped LaTeX.
//!
//! The parser never fails loudly: anything that cannot be recovered yields
//! `None`, which callers treat as an empty batch.

use serde_json::Value;

/// Recovers the largest valid JSON value from `raw`.
///
/// # Arguments
///
/// * `raw` - Raw response text from the extraction model.
///
/// # Returns
///
/// The parsed value, or `None` when nothing could be salvaged.
pub fn salvage(raw: &str) -> Option<Value> {
    let body = strip_code_fences(raw.trim());
    let object_start = body.find('{');
    let array_start = body.find('[');

    let value = match (object_start, array_start) {
        (Some(o), Some(a)) if a < o => {
            // chatter before a bare array: the first `{` is only its first element
            match salvage_from(&body[o..]) {
                Some(value) if is_batch_object(&value) => Some(value),
                first => salvage_from(&body[a..]).or(first),
            }
        }
        (Some(o), _) => salvage_from(&body[o..]),
        (None, Some(a)) => salvage_from(&body[a..]),
        (None, None) => None,
    };

    if value.is_none() {
        tracing::error!("JSON salvage failed entirely ({} bytes)", raw.len());
    }
    value
}

fn is_batch_object(value: &Value) -> bool {
    value.get("questions").is_some()
}

fn salvage_from(body: &str) -> Option<Value> {
    if let Some(value) = scan_candidates(body) {
        return Some(value);
    }

    tracing::warn!("Standard salvage failed, retrying with aggressive backslash escaping");
    let repaired = escape_backslashes(body);
    let value = scan_candidates(&repaired)?;
    tracing::info!("Salvaged JSON after escaping backslashes");
    Some(value)
}

fn strip_code_fences(s: &str) -> &str {
    let s = s.strip_prefix("```json").unwrap_or(s);
    let s = s.strip_prefix("```JSON").unwrap_or(s);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Tries the whole text first, then every prefix ending at a closing
/// bracket, from the longest down.
fn scan_candidates(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let ends: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| *c == '}' || *c == ']')
        .map(|(i, _)| i)
        .collect();

    for &end in ends.iter().rev() {
        let Some(candidate) = close_prefix(&text[..=end]) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if end + 1 < text.len() {
                tracing::debug!("Salvaged JSON prefix of {} / {} bytes", end + 1, text.len());
            }
            return Some(value);
        }
    }
    None
}

/// Walks `prefix`, escaping raw control characters inside strings, and
/// appends the closers of every container still open at its end.
///
/// Returns `None` when the prefix ends inside a string or closes a container
/// it never opened.
fn close_prefix(prefix: &str) -> Option<String> {
    let mut out = String::with_capacity(prefix.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_str = false;
    let mut esc = false;

    for ch in prefix.chars() {
        if in_str {
            if esc {
                esc = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    esc = true;
                    out.push(ch);
                }
                '"' => {
                    in_str = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match ch {
            '"' => in_str = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
            }
            _ => {}
        }
        out.push(ch);
    }

    if in_str {
        return None;
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

/// Doubles every backslash, then restores the escapes JSON itself needs
/// (`\"`, `\n`, `\r`, `\t`).
fn escape_backslashes(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace("\\\\\"", "\\\"")
        .replace("\\\\n", "\\n")
        .replace("\\\\r", "\\r")
        .replace("\\\\t", "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_salvage_plain_json() {
        let value = salvage(r#"{"questions": []}"#).unwrap();
        assert_eq!(value, json!({"questions": []}));
    }

    #[test]
    fn test_salvage_strips_fences_and_chatter() {
        let raw = "```json\n{\"questions\":[{\"id\":\"Q1\"}]}\n```";
        assert_eq!(salvage(raw).unwrap(), json!({"questions": [{"id": "Q1"}]}));

        let raw = "Here is the result: {\"a\": 1} hope it helps";
        assert_eq!(salvage(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_salvage_truncated_batch() {
        let raw = r#"{"questions":[{"id":"Q1","text":"a"},{"id":"Q2","tex"#;
        let value = salvage(raw).unwrap();
        assert_eq!(value, json!({"questions": [{"id": "Q1", "text": "a"}]}));
    }

    #[test]
    fn test_salvage_truncated_inside_nested_object() {
        let raw = r#"{"questions":[{"id":"Q1","visualBoundingBox":{"x":1},"text":"unfinished"#;
        let value = salvage(raw).unwrap();
        assert_eq!(value["questions"][0]["visualBoundingBox"], json!({"x": 1}));
    }

    #[test]
    fn test_salvage_raw_newline_in_string() {
        let raw = "{\"text\": \"line one\nline two\"}";
        assert_eq!(salvage(raw).unwrap(), json!({"text": "line one\nline two"}));
    }

    #[test]
    fn test_salvage_unescaped_latex() {
        let raw = r#"{"text": "$\sqrt{2} + \alpha$"}"#;
        let value = salvage(raw).unwrap();
        assert_eq!(value["text"], json!(r"$\sqrt{2} + \alpha$"));
    }

    #[test]
    fn test_salvage_bare_array() {
        let raw = r#"[{"id":"Q1"},{"id":"Q2"}]"#;
        assert_eq!(salvage(raw).unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_salvage_bare_array_after_chatter() {
        let raw = r#"Here they are: [{"id":"Q1","text":"a"},{"id":"Q2","text":"b"}]"#;
        let value = salvage(raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["id"], json!("Q2"));

        let raw = r#"Questions [1-2] follow: {"questions":[{"id":"Q1"}]}"#;
        assert_eq!(salvage(raw).unwrap(), json!({"questions": [{"id": "Q1"}]}));
    }

    #[test]
    fn test_salvage_failures() {
        assert_eq!(salvage(""), None);
        assert_eq!(salvage("no json here"), None);
        assert_eq!(salvage("{\"text\": \"never closed"), None);
    }
}
