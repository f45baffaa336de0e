use crate::processing::GuardrailOutcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing service activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_uploaded: AtomicU64,
    passages_indexed: AtomicU64,
    questions_passed: AtomicU64,
    questions_low_confidence: AtomicU64,
    questions_no_context: AtomicU64,
    extractions: AtomicU64,
    extraction_fallbacks: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed upload and the number of passages produced for it.
    pub fn record_upload(&self, passage_count: u64) {
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
        self.passages_indexed
            .fetch_add(passage_count, Ordering::Relaxed);
    }

    /// Record an answered question by guardrail outcome.
    pub fn record_question(&self, outcome: &GuardrailOutcome) {
        let counter = match outcome {
            GuardrailOutcome::Passed => &self.questions_passed,
            GuardrailOutcome::LowConfidence { .. } => &self.questions_low_confidence,
            GuardrailOutcome::NoContextFound => &self.questions_no_context,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an extraction; `fell_back` marks an all-null result caused by a failure.
    pub fn record_extraction(&self, fell_back: bool) {
        self.extractions.fetch_add(1, Ordering::Relaxed);
        if fell_back {
            self.extraction_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            passages_indexed: self.passages_indexed.load(Ordering::Relaxed),
            questions_passed: self.questions_passed.load(Ordering::Relaxed),
            questions_low_confidence: self.questions_low_confidence.load(Ordering::Relaxed),
            questions_no_context: self.questions_no_context.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
            extraction_fallbacks: self.extraction_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents successfully indexed since startup.
    pub documents_uploaded: u64,
    /// Total passages produced across all indexed documents.
    pub passages_indexed: u64,
    /// Questions whose answer passed the guardrail.
    pub questions_passed: u64,
    /// Questions answered below the confidence threshold.
    pub questions_low_confidence: u64,
    /// Questions for which retrieval returned nothing.
    pub questions_no_context: u64,
    /// Extraction requests served.
    pub extractions: u64,
    /// Extractions that returned the all-null record because of a failure.
    pub extraction_fallbacks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_uploads_and_passages() {
        let metrics = ServiceMetrics::new();
        metrics.record_upload(2);
        metrics.record_upload(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_uploaded, 2);
        assert_eq!(snapshot.passages_indexed, 5);
    }

    #[test]
    fn questions_are_bucketed_by_outcome() {
        let metrics = ServiceMetrics::new();
        metrics.record_question(&GuardrailOutcome::Passed);
        metrics.record_question(&GuardrailOutcome::Passed);
        metrics.record_question(&GuardrailOutcome::LowConfidence {
            original_confidence: 0.1,
        });
        metrics.record_question(&GuardrailOutcome::NoContextFound);
        metrics.record_extraction(false);
        metrics.record_extraction(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_passed, 2);
        assert_eq!(snapshot.questions_low_confidence, 1);
        assert_eq!(snapshot.questions_no_context, 1);
        assert_eq!(snapshot.extractions, 2);
        assert_eq!(snapshot.extraction_fallbacks, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(ServiceMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
