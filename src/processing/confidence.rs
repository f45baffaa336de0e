//! Blended confidence score for generated answers.

use crate::processing::ScoredPassage;
use std::collections::HashSet;

/// Retrieval quality assumed when the index does not expose similarity scores.
pub const DEFAULT_RETRIEVAL_QUALITY: f64 = 0.8;

const RETRIEVAL_WEIGHT: f64 = 0.4;
const COMPLETENESS_WEIGHT: f64 = 0.3;
const OVERLAP_WEIGHT: f64 = 0.3;
const UNCERTAINTY_PENALTY: f64 = 0.3;

const UNCERTAINTY_PHRASES: [&str; 5] = [
    "not found",
    "unclear",
    "don't know",
    "cannot find",
    "no information",
];

/// Score how much an answer can be trusted, in `[0, 1]`.
///
/// Combines retrieval quality, answer length and the share of question words present in the
/// retrieved text, minus a penalty when the answer itself expresses uncertainty. An empty
/// passage list always scores `0.0`.
pub fn score(passages: &[ScoredPassage], answer: &str, question: &str) -> f64 {
    if passages.is_empty() {
        return 0.0;
    }

    let blended = retrieval_quality(passages) * RETRIEVAL_WEIGHT
        + completeness(answer) * COMPLETENESS_WEIGHT
        + keyword_overlap(passages, question) * OVERLAP_WEIGHT;

    let answer_lower = answer.to_lowercase();
    let penalty = if UNCERTAINTY_PHRASES
        .iter()
        .any(|phrase| answer_lower.contains(phrase))
    {
        UNCERTAINTY_PENALTY
    } else {
        0.0
    };

    (blended - penalty).clamp(0.0, 1.0)
}

fn retrieval_quality(passages: &[ScoredPassage]) -> f64 {
    let scores: Option<Vec<f64>> = passages
        .iter()
        .map(|scored| scored.score.map(f64::from))
        .collect();
    match scores {
        Some(scores) if !scores.is_empty() => scores.iter().sum::<f64>() / scores.len() as f64,
        _ => DEFAULT_RETRIEVAL_QUALITY,
    }
}

fn completeness(answer: &str) -> f64 {
    let length = answer.chars().count();
    if length <= 10 {
        0.0
    } else {
        (length as f64 / 100.0).min(1.0)
    }
}

fn keyword_overlap(passages: &[ScoredPassage], question: &str) -> f64 {
    let question_lower = question.to_lowercase();
    let keywords: HashSet<&str> = question_lower.split_whitespace().collect();
    let source = passages
        .iter()
        .map(|scored| scored.passage.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let matched = keywords
        .iter()
        .filter(|keyword| source.contains(*keyword))
        .count();
    matched as f64 / keywords.len().max(1) as f64
}
