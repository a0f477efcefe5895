//! The structured feedback shape the model is constrained to produce.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Validated grading feedback as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingFeedback {
    /// Overall summary of the submission.
    pub summary: String,
    /// Overall score in 0..=100.
    pub score: f64,
    /// What the submission did well.
    #[serde(default)]
    pub strengths: Vec<String>,
    /// What needs work.
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Concrete next steps.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Per-rubric-criterion breakdown.
    #[serde(default)]
    pub criterion_scores: Vec<CriterionScore>,
}

/// Score for one rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub score: f64,
    #[serde(default)]
    pub comment: String,
}

/// The response schema attached to every generation request, in the
/// provider's OpenAPI-subset format ("respond only in this JSON shape").
pub fn feedback_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "score": { "type": "NUMBER" },
            "strengths": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            },
            "improvements": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            },
            "suggestions": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            },
            "criterion_scores": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "score": { "type": "NUMBER" },
                        "comment": { "type": "STRING" }
                    },
                    "required": ["name", "score"]
                }
            }
        },
        "required": ["summary", "score", "strengths", "improvements"]
    })
}
