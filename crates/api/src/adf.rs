//! Plain text <-> Atlassian Document Format conversion for rich-text fields.
//!
//! API v2 takes and returns plain strings; v3 wraps text in an ADF `doc`.
//! Reads accept either shape so a client can talk to both.

use serde_json::{json, Value};

use crate::ApiVersion;

/// Encode `text` for the given API version. Each line becomes its own ADF
/// paragraph.
pub fn encode(text: &str, version: ApiVersion) -> Value {
    match version {
        ApiVersion::V2 => Value::String(text.to_string()),
        ApiVersion::V3 => {
            let content: Vec<Value> = if text.is_empty() {
                Vec::new()
            } else {
                text.split('\n')
                    .map(|line| {
                        if line.is_empty() {
                            json!({ "type": "paragraph", "content": [] })
                        } else {
                            json!({
                                "type": "paragraph",
                                "content": [{ "type": "text", "text": line }]
                            })
                        }
                    })
                    .collect()
            };

            json!({ "type": "doc", "version": 1, "content": content })
        }
    }
}

/// Flatten a rich-text value into plain text. Returns `None` for null.
pub fn decode(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => {
            let blocks = value
                .get("content")
                .and_then(Value::as_array)
                .map(|blocks| blocks.iter().map(block_text).collect::<Vec<_>>())
                .unwrap_or_default();
            Some(blocks.join("\n"))
        }
        other => Some(other.to_string()),
    }
}

fn block_text(node: &Value) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Value, out: &mut String) {
    match node.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("hardBreak") => out.push('\n'),
        _ => {
            if let Some(children) = node.get("content").and_then(Value::as_array) {
                for child in children {
                    collect_text(child, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_is_plain_string() {
        assert_eq!(encode("hello", ApiVersion::V2), json!("hello"));
    }

    #[test]
    fn test_v3_wraps_paragraphs() {
        let doc = encode("first\nsecond", ApiVersion::V3);
        assert_eq!(doc["type"], "doc");
        assert_eq!(doc["content"].as_array().unwrap().len(), 2);
        assert_eq!(doc["content"][1]["content"][0]["text"], "second");
    }

    #[test]
    fn test_v3_empty_text_has_no_paragraphs() {
        let doc = encode("", ApiVersion::V3);
        assert!(doc["content"].as_array().unwrap().is_empty());
        assert_eq!(decode(&doc).as_deref(), Some(""));
    }

    #[test]
    fn test_decode_multiline_document() {
        let doc = encode("line one\n\nline three", ApiVersion::V3);
        assert_eq!(decode(&doc).as_deref(), Some("line one\n\nline three"));
    }

    #[test]
    fn test_decode_nested_marks_and_breaks() {
        let doc = json!({
            "type": "doc",
            "version": 1,
            "content": [{
                "type": "paragraph",
                "content": [
                    { "type": "text", "text": "bold", "marks": [{ "type": "strong" }] },
                    { "type": "hardBreak" },
                    { "type": "text", "text": "plain" }
                ]
            }]
        });
        assert_eq!(decode(&doc).as_deref(), Some("bold\nplain"));
    }

    #[test]
    fn test_decode_null_and_string() {
        assert_eq!(decode(&Value::Null), None);
        assert_eq!(decode(&json!("text")).as_deref(), Some("text"));
    }
}
