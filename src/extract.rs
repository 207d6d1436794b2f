//! Recovery of a JSON object from free-form model output.
//!
//! Models are told to answer with bare JSON but regularly wrap it in prose or
//! markdown fences.  Recovery runs in stages and stops at the first success:
//!
//! 1. the whole (trimmed) text parsed strictly, accepted only if it is an
//!    object;
//! 2. the greedy span from the first `{` to the last `}`;
//! 3. the first balanced object starting at the first `{`, found by tracking
//!    brace depth outside of string literals.
//!
//! Only the first `{` is ever used as an object start.  Prose that contains a
//! stray brace before the payload therefore defeats recovery; this is known
//! and covered by a test.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::RelayError;

static GREEDY_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("static regex compiles"));

pub fn recover_json(content: &str) -> Result<Value, RelayError> {
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(content) {
        return Ok(v);
    }
    let greedy = GREEDY_OBJECT.find(content).ok_or(RelayError::Extraction)?;
    if let Ok(v) = serde_json::from_str::<Value>(greedy.as_str()) {
        return Ok(v);
    }
    let balanced = first_balanced_object(content).ok_or(RelayError::Extraction)?;
    serde_json::from_str::<Value>(balanced).map_err(|_| RelayError::Extraction)
}

/// Slice of `text` from its first `{` to the matching `}`.  Braces inside
/// double-quoted strings are ignored; backslash escapes inside strings are
/// honoured.  Returns `None` when the object never closes.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
