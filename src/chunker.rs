//! Overlap-aware text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a configured
//! `max_chars` limit. Splitting prefers paragraph boundaries (`\n\n`), then
//! line boundaries, then spaces, and finally falls back to raw character
//! slicing for text with no usable boundaries. Consecutive chunks share at
//! least `overlap_chars` characters so context survives chunk boundaries.
//!
//! Chunking the same text with the same configuration always yields an
//! identical sequence — ingestion relies on this (together with each chunk's
//! SHA-256 hash) for idempotent re-ingestion detection.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Boundary preference order; raw character slicing is the implicit last
/// resort once all separators are exhausted.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
    min_chars: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        // The slicing stride is max_chars - overlap_chars, so the overlap is
        // clamped below max_chars even when the config skipped validation.
        let max_chars = config.max_chars.max(1);
        Self {
            max_chars,
            overlap_chars: config.overlap_chars.min(max_chars - 1),
            min_chars: config.min_chars.max(1),
        }
    }

    /// Split a document's text into ordered chunks.
    ///
    /// Indices are contiguous from 0 and never renumbered afterwards. No
    /// chunk is ever empty.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyContent`] if the input, after trimming, is empty or
    /// shorter than the configured minimum.
    pub fn split(&self, document_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let trimmed = text.trim();
        if trimmed.len() < self.min_chars {
            return Err(RagError::EmptyContent);
        }

        let pieces = self.split_level(trimmed, &SEPARATORS);
        let total = pieces.len();

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| make_chunk(document_id, i, &piece, total))
            .collect())
    }

    /// Split `text` on the first separator, recursing into oversized parts
    /// with the remaining separators, and merge the results.
    fn split_level(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if text.len() <= self.max_chars {
            return vec![text.to_string()];
        }

        let (sep, rest) = match separators.split_first() {
            Some(x) => x,
            None => return self.slice_chars(text),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for part in text.split(sep) {
            if part.trim().is_empty() {
                continue;
            }
            if part.len() <= self.max_chars {
                pending.push(part);
            } else {
                if !pending.is_empty() {
                    chunks.extend(self.merge_parts(&pending, sep));
                    pending.clear();
                }
                chunks.extend(self.split_level(part, rest));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge_parts(&pending, sep));
        }

        chunks
    }

    /// Greedily pack parts into chunks of at most `max_chars`, retaining a
    /// tail of at least `overlap_chars` between consecutive chunks.
    fn merge_parts(&self, parts: &[&str], sep: &str) -> Vec<String> {
        let sep_len = sep.len();
        let mut chunks: Vec<String> = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut window_len = 0usize;

        for part in parts {
            let projected = if window.is_empty() {
                part.len()
            } else {
                window_len + sep_len + part.len()
            };

            if projected > self.max_chars && !window.is_empty() {
                chunks.push(join_parts(&window, sep));

                // Drop from the front until the incoming part fits, keeping
                // at least overlap_chars of tail where possible.
                while let Some(front) = window.front() {
                    let front_cost = if window.len() == 1 {
                        front.len()
                    } else {
                        front.len() + sep_len
                    };
                    let remaining = window_len - front_cost;
                    let fits = window_len + sep_len + part.len() <= self.max_chars;
                    if !fits || remaining >= self.overlap_chars {
                        window.pop_front();
                        window_len = remaining;
                    } else {
                        break;
                    }
                }
            }

            window_len += if window.is_empty() {
                part.len()
            } else {
                sep_len + part.len()
            };
            window.push_back(part);
        }

        if !window.is_empty() {
            chunks.push(join_parts(&window, sep));
        }

        chunks
    }

    /// Last-resort raw slicing for text without any usable boundary, with a
    /// fixed stride of `max_chars - overlap_chars` so consecutive slices
    /// share exactly `overlap_chars` characters.
    fn slice_chars(&self, text: &str) -> Vec<String> {
        let stride = self.max_chars - self.overlap_chars;
        let mut out = Vec::new();
        let mut start = 0usize;

        while start < text.len() {
            let end = snap_to_char_boundary(text, (start + self.max_chars).min(text.len()));
            out.push(text[start..end].to_string());
            if end >= text.len() {
                break;
            }
            let mut next = snap_to_char_boundary(text, start + stride);
            if next <= start {
                // Multibyte char wider than the stride; force progress.
                next = text[start..]
                    .char_indices()
                    .nth(1)
                    .map(|(i, _)| start + i)
                    .unwrap_or(text.len());
            }
            start = next;
        }

        out
    }
}

fn join_parts(window: &VecDeque<&str>, sep: &str) -> String {
    let mut out = String::new();
    for (i, part) in window.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part);
    }
    out
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document_id: &str, index: usize, text: &str, total: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
        chunk_count: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap_chars: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_chars,
            overlap_chars,
            min_chars: 1,
        })
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunker(1000, 200).split("doc1", "Hello, world!").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].chunk_count, 1);
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = chunker(1000, 200).split("doc1", "").unwrap_err();
        assert!(matches!(err, RagError::EmptyContent));
    }

    #[test]
    fn test_whitespace_only_rejected() {
        let err = chunker(1000, 200).split("doc1", "  \n\n \t ").unwrap_err();
        assert!(matches!(err, RagError::EmptyContent));
    }

    #[test]
    fn test_min_chars_rejects_short_input() {
        let c = Chunker::new(&ChunkingConfig {
            max_chars: 1000,
            overlap_chars: 200,
            min_chars: 10,
        });
        assert!(matches!(
            c.split("doc1", "short"),
            Err(RagError::EmptyContent)
        ));
    }

    #[test]
    fn test_paragraphs_preferred() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = chunker(30, 0).split("doc1", text).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "First paragraph here.");
        assert_eq!(chunks[2].text, "Third paragraph here.");
    }

    #[test]
    fn test_indices_contiguous_and_counted() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i} with some filler text."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunker(120, 20).split("doc1", &text).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.chunk_count, chunks.len());
            assert!(!c.text.is_empty());
            assert!(c.text.len() <= 120, "chunk {} too long: {}", i, c.text.len());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha section.\n\nBeta section.\n\nGamma section.\n\nDelta section.";
        let a = chunker(25, 5).split("doc1", text).unwrap();
        let b = chunker(25, 5).split("doc1", text).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.chunk_index, y.chunk_index);
        }
    }

    #[test]
    fn test_char_slicing_shares_exact_overlap() {
        // No paragraph, line, or space boundaries anywhere.
        let text = "x".repeat(3000);
        let chunks = chunker(1000, 200).split("doc1", &text).unwrap();
        assert_eq!(chunks.len(), 4);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(c.text.len() <= 1000);
        }
        for pair in chunks.windows(2) {
            let tail = &pair[0].text[pair[0].text.len() - 200..];
            let head = &pair[1].text[..200];
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_word_merge_retains_overlap() {
        let words: Vec<String> = (0..340).map(|i| format!("tok{i:05}")).collect();
        let text = words.join(" ");
        let chunks = chunker(1000, 200).split("doc1", &text).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev = &pair[0].text;
            let next = &pair[1].text;
            let max_k = prev.len().min(next.len());
            let shared = (1..=max_k)
                .rev()
                .find(|&k| prev.ends_with(&next[..k]))
                .unwrap_or(0);
            assert!(shared >= 200, "overlap only {shared} chars");
        }
    }

    #[test]
    fn test_overlap_not_below_max_clamped() {
        // Unvalidated config with overlap >= max must still make progress
        // on boundary-free input instead of underflowing the stride.
        let text = "x".repeat(50);
        let chunks = chunker(10, 10).split("doc1", &text).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(!c.text.is_empty());
            assert!(c.text.len() <= 10);
        }

        let chunks = chunker(10, 200).split("doc1", &text).unwrap();
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_multibyte_utf8_slicing() {
        let text = "┌─".repeat(600);
        let chunks = chunker(100, 20).split("doc1", &text).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
            assert!(c.text.is_char_boundary(0));
        }
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = chunker(1000, 200).split("doc1", "same words").unwrap();
        let b = chunker(1000, 200).split("doc2", "same words").unwrap();
        let c = chunker(1000, 200).split("doc1", "other words").unwrap();
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].hash, c[0].hash);
    }
}
