//! Guardrail policy labeling answers by trust level.

use serde::Serialize;

/// Confidence below which an answer is flagged as unreliable.
pub const CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Answer returned when retrieval produced no passages.
pub const NO_CONTEXT_ANSWER: &str = "Not found in document - no relevant information available.";

/// Outcome attached to every answer as response metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "guardrail", rename_all = "snake_case")]
pub enum GuardrailOutcome {
    /// Retrieval returned nothing; the model was not consulted.
    NoContextFound,
    /// The answer scored below [`CONFIDENCE_THRESHOLD`].
    LowConfidence {
        /// Unrounded score that triggered the flag.
        original_confidence: f64,
    },
    /// The answer is returned as generated.
    Passed,
}

impl GuardrailOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoContextFound => "no_context_found",
            Self::LowConfidence { .. } => "low_confidence",
            Self::Passed => "passed",
        }
    }
}

/// Answer text after the guardrail has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedAnswer {
    /// Possibly rewritten answer.
    pub answer: String,
    /// Confidence reported to the caller.
    pub confidence: f64,
    /// Policy decision.
    pub outcome: GuardrailOutcome,
}

/// Result for a question whose retrieval returned no passages.
pub fn no_context() -> GuardedAnswer {
    GuardedAnswer {
        answer: NO_CONTEXT_ANSWER.to_string(),
        confidence: 0.0,
        outcome: GuardrailOutcome::NoContextFound,
    }
}

/// Label `answer` by `confidence`, prefixing a warning when it falls below the threshold.
pub fn apply(answer: String, confidence: f64) -> GuardedAnswer {
    if confidence < CONFIDENCE_THRESHOLD {
        GuardedAnswer {
            answer: format!(
                "[Low confidence] {answer}\n\nNote: This answer may not be reliable. \
                 Please verify with the source document."
            ),
            confidence,
            outcome: GuardrailOutcome::LowConfidence {
                original_confidence: confidence,
            },
        }
    } else {
        GuardedAnswer {
            answer,
            confidence,
            outcome: GuardrailOutcome::Passed,
        }
    }
}
