//! Repair and validation of the model's raw text output.
//!
//! The model is asked for strict JSON but sometimes wraps it in a markdown
//! fence, truncates it mid-object, or leaves a trailing comma. Repair is a
//! fixed sequence of transformations with a re-parse after each step, and
//! it is idempotent: already-valid JSON passes through untouched.
//!
//! Pure string-in, value-out; no I/O anywhere in this module.

use serde_json::Value;

use crate::error::AiError;
use crate::schema::GradingFeedback;

/// Result of attempting to parse model output as structured data.
///
/// Repair is a designed branch, not an exception handler: callers match on
/// the outcome instead of catching a parse error to decide what to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Parsed as-is.
    Parsed(Value),
    /// Did not parse, but a repair step changes the text; worth repairing.
    NeedsRepair,
    /// Did not parse and no repair step applies.
    Invalid,
}

/// Classifies raw model output without repairing it.
pub fn parse_structured(text: &str) -> ParseOutcome {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return ParseOutcome::Parsed(value);
    }
    if repair(text) != text {
        ParseOutcome::NeedsRepair
    } else {
        ParseOutcome::Invalid
    }
}

/// Applies the repair sequence, stopping at the first step after which the
/// text parses. Returns the (possibly still unparseable) repaired text.
///
/// Idempotent: `repair(repair(x)) == repair(x)` for any input.
pub fn repair(text: &str) -> String {
    let mut current = text.trim().to_string();
    if parses(&current) {
        return current;
    }

    current = strip_code_fences(&current);
    if parses(&current) {
        return current;
    }

    current = close_unbalanced_braces(&current);
    if parses(&current) {
        return current;
    }

    current = strip_trailing_commas(&current);
    current
}

/// Parses raw output, repairing if needed, or fails definitively.
pub fn parse_with_repair(text: &str) -> Result<Value, AiError> {
    match parse_structured(text) {
        ParseOutcome::Parsed(value) => Ok(value),
        ParseOutcome::NeedsRepair => {
            let repaired = repair(text);
            serde_json::from_str::<Value>(&repaired).map_err(|e| {
                AiError::MalformedResponse(format!("unparseable after repair: {}", e))
            })
        }
        ParseOutcome::Invalid => Err(AiError::MalformedResponse(
            "output is not JSON and no repair applies".into(),
        )),
    }
}

/// Validates a parsed object against the feedback schema.
///
/// Distinct from parse failure: the object is well-formed JSON but
/// semantically unusable as grading feedback.
pub fn validate_feedback(value: &Value) -> Result<GradingFeedback, AiError> {
    let feedback: GradingFeedback = serde_json::from_value(value.clone())
        .map_err(|e| AiError::SchemaValidation(format!("missing or mistyped field: {}", e)))?;

    if feedback.summary.trim().is_empty() {
        return Err(AiError::SchemaValidation("summary is empty".into()));
    }
    if !(0.0..=100.0).contains(&feedback.score) {
        return Err(AiError::SchemaValidation(format!(
            "score {} outside 0..=100",
            feedback.score
        )));
    }
    if feedback.strengths.is_empty() && feedback.improvements.is_empty() {
        return Err(AiError::SchemaValidation(
            "both strengths and improvements are empty".into(),
        ));
    }
    for criterion in &feedback.criterion_scores {
        if !(0.0..=100.0).contains(&criterion.score) {
            return Err(AiError::SchemaValidation(format!(
                "criterion '{}' score {} outside 0..=100",
                criterion.name, criterion.score
            )));
        }
    }

    Ok(feedback)
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Strips a leading/trailing markdown code fence with an optional language tag.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language tag (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Appends the closing braces/brackets a truncated object is missing.
///
/// Counting is string-aware so braces inside string values are ignored.
fn close_unbalanced_braces(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_string {
        return text.to_string();
    }

    let mut repaired = text.trim_end().to_string();
    // Truncation mid-string: terminate the string before closing containers.
    if in_string {
        if escaped {
            repaired.push('\\');
        }
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

/// Removes commas immediately preceding a closing `}` or `]`.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '}' | ']' if !in_string => {
                // Drop a comma (and interleaved whitespace) right before the closer.
                while let Some(last) = out.chars().last() {
                    if last.is_whitespace() {
                        out.pop();
                    } else if last == ',' {
                        out.pop();
                        break;
                    } else {
                        break;
                    }
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_is_untouched() {
        let input = r#"{"score": 85, "summary": "ok"}"#;
        assert_eq!(repair(input), input);
        assert!(matches!(parse_structured(input), ParseOutcome::Parsed(_)));
    }

    #[test]
    fn repair_is_idempotent() {
        let inputs = [
            r#"{"score": 85, "summary": "ok"}"#,
            r#"```json
{"score": 85}
```"#,
            r#"{"score": 85,"#,
            r#"{"a": [1, 2,]}"#,
            r#"{"summary": "trunca"#,
            "not json at all",
        ];
        for input in inputs {
            let once = repair(input);
            assert_eq!(repair(&once), once, "repair not idempotent for {:?}", input);
        }
    }

    #[test]
    fn strips_markdown_fences() {
        let input = "```json\n{\"score\": 85}\n```";
        let value = parse_with_repair(input).unwrap();
        assert_eq!(value["score"], json!(85));
    }

    #[test]
    fn closes_truncated_objects() {
        // Truncated output: one open brace unclosed, trailing comma left behind.
        let value = parse_with_repair(r#"{"score": 85,"#).unwrap();
        assert_eq!(value["score"], json!(85));
    }

    #[test]
    fn closes_truncation_inside_a_string() {
        let value = parse_with_repair(r#"{"summary": "the submission is corr"#).unwrap();
        assert_eq!(value["summary"], json!("the submission is corr"));
    }

    #[test]
    fn closes_nested_truncation() {
        let value = parse_with_repair(r#"{"outer": {"inner": [1, 2"#).unwrap();
        assert_eq!(value["outer"]["inner"], json!([1, 2]));
    }

    #[test]
    fn strips_trailing_commas_in_arrays_and_objects() {
        let value = parse_with_repair(r#"{"a": [1, 2,], "b": {"c": 3,},}"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2], "b": {"c": 3}}));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let value = parse_with_repair(r#"{"code": "fn main() {","#).unwrap();
        assert_eq!(value["code"], json!("fn main() {"));
    }

    #[test]
    fn hopeless_input_is_invalid() {
        assert_eq!(parse_structured("the model refused"), ParseOutcome::Invalid);
        assert!(matches!(
            parse_with_repair("the model refused"),
            Err(AiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn validates_complete_feedback() {
        let value = json!({
            "summary": "Correct arithmetic.",
            "score": 90,
            "strengths": ["right answer"],
            "improvements": []
        });
        let feedback = validate_feedback(&value).unwrap();
        assert_eq!(feedback.score, 90.0);
        assert_eq!(feedback.strengths, vec!["right answer"]);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let value = json!({
            "summary": "ok",
            "score": 140,
            "strengths": ["x"],
            "improvements": []
        });
        assert!(matches!(
            validate_feedback(&value),
            Err(AiError::SchemaValidation(_))
        ));
    }

    #[test]
    fn rejects_missing_summary() {
        let value = json!({ "score": 50, "strengths": ["x"] });
        assert!(matches!(
            validate_feedback(&value),
            Err(AiError::SchemaValidation(_))
        ));
    }

    #[test]
    fn rejects_empty_strength_and_improvement_lists() {
        let value = json!({
            "summary": "ok",
            "score": 50,
            "strengths": [],
            "improvements": []
        });
        assert!(matches!(
            validate_feedback(&value),
            Err(AiError::SchemaValidation(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_criterion_scores() {
        let value = json!({
            "summary": "ok",
            "score": 50,
            "strengths": ["x"],
            "improvements": [],
            "criterion_scores": [{"name": "style", "score": -3, "comment": ""}]
        });
        assert!(matches!(
            validate_feedback(&value),
            Err(AiError::SchemaValidation(_))
        ));
    }
}
