//! Pulls a JSON object out of free-form AI output and repairs it when the
//! model's answer was cut off mid-object.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::{AnalysisError, Result};

lazy_static! {
    static ref RE_TRAILING_COMMA: Regex = Regex::new(r",\s*([}\]])").unwrap();
}

/// Extract the outermost `{ ... }` block from `text` and decode it.
pub fn extract(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let unfenced = strip_code_fences(text);
    let slice = json_block(&unfenced).ok_or(AnalysisError::NoJsonBlock)?;

    // Well-formed input is returned untouched; the comma cleanup below is a
    // text rewrite and must not run over valid string contents.
    if let Ok(value) = serde_json::from_str::<Value>(slice) {
        return Ok(value);
    }

    let cleaned = RE_TRAILING_COMMA.replace_all(slice, "$1").into_owned();
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => Ok(value),
        Err(original) => {
            tracing::warn!("Initial JSON decode failed ({}), attempting repair", original);
            let repaired = repair_json(&cleaned);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    tracing::info!("Truncated JSON repaired successfully");
                    Ok(value)
                }
                Err(_) => {
                    tracing::error!("JSON repair failed. Extracted block:\n{}", cleaned);
                    Err(AnalysisError::UnrepairableJson {
                        source: original,
                        extracted: cleaned,
                    })
                }
            }
        }
    }
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// First `{` through last `}`, if both exist in that order.
fn json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Close whatever a truncated JSON text left open: a dangling string, then
/// brackets, then braces.
pub fn repair_json(json: &str) -> String {
    let mut repaired = json.trim().to_string();
    if repaired.ends_with(',') || repaired.ends_with(':') {
        repaired.pop();
        repaired = repaired.trim_end().to_string();
    }

    let mut open_braces: i32 = 0;
    let mut open_brackets: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in repaired.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open_braces += 1,
            '}' => open_braces -= 1,
            '[' => open_brackets += 1,
            ']' => open_brackets -= 1,
            _ => {}
        }
    }

    if in_string {
        if escaped {
            // Drop a lone trailing backslash so the closing quote is not escaped.
            repaired.pop();
        }
        repaired.push('"');
    }
    for _ in 0..open_brackets.max(0) {
        repaired.push(']');
    }
    for _ in 0..open_braces.max(0) {
        repaired.push('}');
    }
    repaired
}
