use serde_json::Value;

use crate::error::ExtractionError;

/// Rewrites Python-repr style output into JSON: tuples become arrays and
/// single quotes become double quotes.
///
/// Lossy by construction: parentheses or apostrophes inside names are
/// rewritten too. The result is not guaranteed to parse.
pub fn repair(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '(' => '[',
            ')' => ']',
            '\'' => '"',
            other => other,
        })
        .collect()
}

/// Locates a JSON value inside chatty model output.
pub fn extract_json_from_text(s: &str) -> Option<Value> {
    let t = s.trim().trim_matches(|c: char| c == '\u{feff}');

    if let Ok(v) = serde_json::from_str::<Value>(t) {
        return Some(v);
    }

    if let (Some(i), Some(j)) = (t.find('{'), t.rfind('}')) {
        if i < j {
            if let Ok(v) = serde_json::from_str::<Value>(&t[i..=j]) {
                return Some(v);
            }
        }
    }

    for fence in ["```json", "```"] {
        if let Some(start) = t.find(fence) {
            let body = &t[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Ok(v) = serde_json::from_str::<Value>(&body[..end]) {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// Parses completion text, falling back to the repaired form only when the
/// raw text holds no JSON.
pub fn parse_content(content: &str) -> Result<Value, ExtractionError> {
    if let Some(value) = extract_json_from_text(content) {
        return Ok(value);
    }
    let repaired = repair(content);
    extract_json_from_text(&repaired).ok_or_else(|| {
        ExtractionError::UnparsableContent(format!(
            "aucun JSON valide, même après réparation: {}",
            truncate(&repaired, 200)
        ))
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
