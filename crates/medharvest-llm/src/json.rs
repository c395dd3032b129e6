//! Lenient recovery of a JSON object from model output.
//!
//! Models wrap answers in prose or markdown fences often enough that a
//! strict parse alone loses usable completions. Three attempts, in order:
//! the trimmed text, the body of a ```json fence, then the first
//! brace-delimited span (one level of nesting).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref FENCED: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
    static ref BRACED: Regex = Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap();
}

/// Which attempt produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRecovery {
    Strict,
    Fenced,
    Braced,
}

impl JsonRecovery {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, JsonRecovery::Strict)
    }
}

/// Returns the first JSON *object* found, or `None` if every attempt fails.
pub fn parse_json_object(text: &str) -> Option<(Map<String, Value>, JsonRecovery)> {
    let trimmed = text.trim();
    if let Some(obj) = as_object(trimmed) {
        return Some((obj, JsonRecovery::Strict));
    }

    if let Some(obj) = FENCED
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| as_object(m.as_str()))
    {
        return Some((obj, JsonRecovery::Fenced));
    }

    BRACED
        .find(trimmed)
        .and_then(|m| as_object(m.as_str()))
        .map(|obj| (obj, JsonRecovery::Braced))
}

fn as_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_object() {
        let (obj, how) = parse_json_object("  {\"models\": \"CNN\"}\n").unwrap();
        assert_eq!(how, JsonRecovery::Strict);
        assert_eq!(obj["models"], "CNN");
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here is the result:\n```json\n{\"metrics\": \"AUC\"}\n```\nDone.";
        let (obj, how) = parse_json_object(text).unwrap();
        assert_eq!(how, JsonRecovery::Fenced);
        assert!(how.is_fallback());
        assert_eq!(obj["metrics"], "AUC");
    }

    #[test]
    fn test_unlabelled_fence() {
        let (_, how) = parse_json_object("```\n{\"a\": \"b\"}\n```").unwrap();
        assert_eq!(how, JsonRecovery::Fenced);
    }

    #[test]
    fn test_braced_span_in_prose() {
        let text = "Sure! {\"what_done\": \"x\", \"nested\": {\"k\": 1}} hope this helps";
        let (obj, how) = parse_json_object(text).unwrap();
        assert_eq!(how, JsonRecovery::Braced);
        assert_eq!(obj["what_done"], "x");
    }

    #[test]
    fn test_non_object_json_rejected() {
        assert!(parse_json_object("[1, 2, 3]").is_none());
        assert!(parse_json_object("\"just a string\"").is_none());
    }

    #[test]
    fn test_garbage_yields_none() {
        assert!(parse_json_object("").is_none());
        assert!(parse_json_object("I could not find any AI content.").is_none());
        assert!(parse_json_object("{not: valid json}").is_none());
    }
}
