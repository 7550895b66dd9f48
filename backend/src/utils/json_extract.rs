//! Pulls a JSON value out of free-form LLM text.
//!
//! Models rarely return pure JSON: they wrap it in prose, fence it in
//! ```` ```json ```` blocks, or trail commentary after a valid object. This
//! tries three extraction strategies, in order, and is shared by every
//! provider rather than duplicated per-provider.

use regex::Regex;
use serde_json::Value;

/// Extract and parse the first JSON value found in `content`.
///
/// Tries, in order: a fenced ` ```json ` block, a generic fenced block
/// (only if the content looks like it starts with JSON), then a
/// string-aware balanced-bracket scan. Falls back to parsing the raw
/// content if none of those patterns match.
pub fn parse_json_response(content: &str) -> Result<Value, serde_json::Error> {
    let extracted = extract_json_content(content);
    serde_json::from_str(&extracted)
}

pub fn extract_json_content(content: &str) -> String {
    let trimmed = content.trim();

    if let Some(json) = extract_fenced(trimmed, true) {
        return json;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(json) = extract_fenced(trimmed, false) {
            return json;
        }
    }
    if let Some(json) = extract_balanced(trimmed) {
        return json;
    }

    trimmed.to_string()
}

fn extract_fenced(content: &str, json_tagged: bool) -> Option<String> {
    let pattern = if json_tagged {
        r"```json\s*([\s\S]*?)\s*```"
    } else {
        r"```\s*([\s\S]*?)\s*```"
    };
    let re = Regex::new(pattern).expect("static regex is valid");
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// String- and escape-aware balanced-bracket scan. Tries `{...}` first,
/// then `[...]`, returning the first complete top-level structure found.
fn extract_balanced(content: &str) -> Option<String> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(found) = scan_balanced(content, open, close) {
            return Some(found);
        }
    }
    None
}

fn scan_balanced(content: &str, open: char, close: char) -> Option<String> {
    let chars: Vec<char> = content.chars().collect();
    let start_idx = chars.iter().position(|&c| c == open)?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate().skip(start_idx) {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let substr: String = chars[start_idx..=i].iter().collect();
                    return Some(substr);
                }
            }
            _ => {}
        }
    }

    None
}
