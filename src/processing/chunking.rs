//! Recursive character chunking tuned for logistics paperwork.
//!
//! Rate confirmations and bills of lading are short, field-dense documents, so passages are
//! small (500 characters) to keep retrieval precise, with a 100-character overlap so a field
//! label and its value are rarely separated by a boundary.
//!
//! Splitting works in two phases:
//!
//! - Break the text into pieces of at most `chunk_size - overlap` characters, trying the
//!   separators in priority order (paragraph, line, sentence punctuation, comma, space) and
//!   hard-splitting by character only when none of them applies.
//! - Greedily merge adjacent pieces back up to the same budget, then extend every passage
//!   after the first backwards by `overlap` characters.
//!
//! Passages are exact slices of their segment, so removing the overlap and concatenating them
//! reproduces the input.

use crate::loader::RawDocument;
use std::ops::Range;

use super::types::{ChunkingError, Passage};

/// Maximum passage length in characters.
pub const CHUNK_SIZE: usize = 500;
/// Characters shared between consecutive passages.
pub const CHUNK_OVERLAP: usize = 100;

/// Separators tried from highest to lowest priority; the empty string means hard split.
const SEPARATORS: [&str; 8] = ["\n\n", "\n", ".", "!", "?", ",", " ", ""];

/// Splits raw documents into overlapping passages.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            overlap: CHUNK_OVERLAP,
        }
    }
}

impl TextChunker {
    /// Build a chunker with a custom size and overlap, both in characters.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ChunkingError::InvalidChunkSize {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Chunk every segment of `document`, numbering passages across the whole document.
    ///
    /// Segments containing only whitespace produce no passages.
    pub fn split_document(&self, document: &RawDocument) -> Vec<Passage> {
        let mut passages = Vec::new();
        for segment in &document.segments {
            if segment.text.trim().is_empty() {
                continue;
            }
            for span in self.split_spans(&segment.text) {
                passages.push(Passage {
                    document: document.source.clone(),
                    segment: segment.index,
                    position: passages.len(),
                    start: span.start,
                    end: span.end,
                    text: segment.text[span].to_string(),
                });
            }
        }
        passages
    }

    /// Compute passage byte ranges over `text`.
    ///
    /// Ranges are ordered, each ends where the next one's fresh text begins, and consecutive
    /// ranges share `overlap` characters unless the text before the boundary is shorter.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= self.chunk_size {
            return vec![0..text.len()];
        }

        let budget = self.chunk_size - self.overlap;
        let mut pieces = Vec::new();
        split_pieces(text, 0, &SEPARATORS, budget, &mut pieces);

        merge_pieces(text, pieces, budget)
            .into_iter()
            .enumerate()
            .map(|(idx, base)| {
                if idx == 0 {
                    base
                } else {
                    back_off(text, base.start, self.overlap)..base.end
                }
            })
            .collect()
    }
}

/// Recursively cut `text` into contiguous pieces of at most `budget` characters.
fn split_pieces(
    text: &str,
    offset: usize,
    separators: &[&str],
    budget: usize,
    out: &mut Vec<Range<usize>>,
) {
    if text.is_empty() {
        return;
    }
    if text.chars().count() <= budget {
        out.push(offset..offset + text.len());
        return;
    }

    let Some(position) = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
    else {
        hard_split(text, offset, budget, out);
        return;
    };

    let separator = separators[position];
    if separator.is_empty() {
        hard_split(text, offset, budget, out);
        return;
    }

    let finer = &separators[position + 1..];
    let mut cursor = 0;
    for piece in text.split_inclusive(separator) {
        split_pieces(piece, offset + cursor, finer, budget, out);
        cursor += piece.len();
    }
}

fn hard_split(text: &str, offset: usize, budget: usize, out: &mut Vec<Range<usize>>) {
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == budget {
            out.push(offset + start..offset + idx);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    out.push(offset + start..offset + text.len());
}

/// Greedily join adjacent pieces while the combined length stays within `budget`.
fn merge_pieces(text: &str, pieces: Vec<Range<usize>>, budget: usize) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;

    for piece in pieces {
        let len = text[piece.clone()].chars().count();
        current = match current {
            Some((range, total)) if total + len <= budget => Some((range.start..piece.end, total + len)),
            Some((range, _)) => {
                merged.push(range);
                Some((piece, len))
            }
            None => Some((piece, len)),
        };
    }
    if let Some((range, _)) = current {
        merged.push(range);
    }
    merged
}

/// Byte index `chars` characters before `from`, clamped to the start of `text`.
fn back_off(text: &str, from: usize, chars: usize) -> usize {
    text[..from]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RawSegment;

    fn reconstruct(text: &str, spans: &[Range<usize>]) -> String {
        let mut rebuilt = String::new();
        let mut covered = 0;
        for span in spans {
            assert!(span.start <= covered, "gap before {span:?}");
            rebuilt.push_str(&text[covered..span.end]);
            covered = span.end;
        }
        rebuilt
    }

    fn logistics_text() -> String {
        let mut text = String::new();
        for load in 0..12 {
            text.push_str(&format!(
                "Load {load}: Shipper ACME Corp, 100 Main St, Dallas TX. Consignee Beta LLC, \
                 Phoenix AZ. Pickup 2024-03-0{} 08:00, delivery within two days! Equipment: \
                 53' dry van; weight 42,000 lbs. Rate $1,{load}00 USD, all-in.\n",
                load % 9 + 1
            ));
            if load % 3 == 2 {
                text.push('\n');
            }
        }
        text
    }

    #[test]
    fn short_text_is_single_passage() {
        let chunker = TextChunker::default();
        let text = "Shipment ID: LD53657. Carrier: Swift Transportation.";
        assert_eq!(chunker.split_spans(text), vec![0..text.len()]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(TextChunker::default().split_spans("").is_empty());
    }

    #[test]
    fn passages_respect_size_limit() {
        let chunker = TextChunker::default();
        let text = logistics_text();
        let spans = chunker.split_spans(&text);
        assert!(spans.len() > 1);
        for span in &spans {
            assert!(text[span.clone()].chars().count() <= CHUNK_SIZE);
        }
    }

    #[test]
    fn removing_overlap_reconstructs_input() {
        let chunker = TextChunker::default();
        let inputs = [
            logistics_text(),
            "x".repeat(1_337),
            "Ünïcödé wörds äre splït bÿ chäracters, nöt bÿtes. ".repeat(40),
            format!("{}\n\n{}", "word ".repeat(150), "a".repeat(900)),
        ];
        for text in inputs {
            let spans = chunker.split_spans(&text);
            assert_eq!(reconstruct(&text, &spans), text);
            for span in &spans {
                assert!(text[span.clone()].chars().count() <= CHUNK_SIZE);
            }
        }
    }

    #[test]
    fn consecutive_passages_share_overlap() {
        let chunker = TextChunker::default();
        let text = logistics_text();
        let spans = chunker.split_spans(&text);
        for pair in spans.windows(2) {
            let shared = &text[pair[1].start..pair[0].end];
            assert_eq!(shared.chars().count(), CHUNK_OVERLAP);
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let chunker = TextChunker::default();
        let paragraph = format!("{}.", "freight ".repeat(40).trim_end());
        let text = [paragraph.as_str(); 4].join("\n\n");
        let spans = chunker.split_spans(&text);
        for pair in spans.windows(2) {
            let fresh_start = pair[0].end;
            assert!(text[..fresh_start].ends_with("\n\n"));
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_hard_split() {
        let chunker = TextChunker::new(10, 2).expect("valid chunker");
        let spans = chunker.split_spans("abcdefghijklmnopqrstuvwxyz");
        let texts: Vec<&str> = spans
            .iter()
            .map(|span| &"abcdefghijklmnopqrstuvwxyz"[span.clone()])
            .collect();
        assert_eq!(texts, vec!["abcdefgh", "ghijklmnop", "opqrstuvwx", "wxyz"]);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            TextChunker::new(100, 100),
            Err(ChunkingError::InvalidChunkSize { .. })
        ));
        assert!(TextChunker::new(0, 0).is_err());
    }

    #[test]
    fn document_passages_carry_position_metadata() {
        let document = RawDocument {
            source: "rc.pdf".into(),
            segments: vec![
                RawSegment {
                    index: 0,
                    text: "Page one. ".repeat(80),
                },
                RawSegment {
                    index: 1,
                    text: "   ".into(),
                },
                RawSegment {
                    index: 2,
                    text: "Carrier: Swift".into(),
                },
            ],
        };
        let passages = TextChunker::default().split_document(&document);

        assert!(passages.len() >= 3);
        for (idx, passage) in passages.iter().enumerate() {
            assert_eq!(passage.position, idx);
            assert_eq!(passage.document, "rc.pdf");
            let source = &document.segments[passage.segment].text;
            assert_eq!(&source[passage.start..passage.end], passage.text);
        }
        let last = passages.last().expect("passages");
        assert_eq!(last.segment, 2);
        assert_eq!(last.text, "Carrier: Swift");
        assert!(passages.iter().all(|passage| passage.segment != 1));
    }
}
