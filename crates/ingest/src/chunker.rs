//! Text chunking with configurable size, overlap, and unit.
//!
//! Two units are supported:
//! - characters: windows of `size` Unicode scalar values, split on char boundaries
//! - tokens: whole whitespace-delimited words, sized with a ~4 chars/token estimate
//!
//! Split points prefer whitespace so words are not cut in half. Chunk text is
//! trimmed; the recorded offset is the byte position of the first kept char.

use docsage_config::{ChunkUnit, IngestionConfig};
use tracing::debug;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// A slice of document text produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Byte offset in the source text
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
}

impl Chunker {
    /// Build a chunker. `overlap` is capped below `size`; a zero size is treated as one.
    pub fn new(size: usize, overlap: usize, unit: ChunkUnit) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
            unit,
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.unit)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into spans. Blank text yields no spans.
    pub fn split(&self, text: &str) -> Vec<Span> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let spans = match self.unit {
            ChunkUnit::Characters => self.split_chars(text),
            ChunkUnit::Tokens => self.split_tokens(text),
        };
        debug!(
            chunks = spans.len(),
            size = self.size,
            overlap = self.overlap,
            unit = ?self.unit,
            "Chunked text"
        );
        spans
    }

    fn split_chars(&self, text: &str) -> Vec<Span> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let n = chars.len();
        let byte_at = |i: usize| if i < n { chars[i].0 } else { text.len() };

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + self.size).min(n);

            // Back off to just after the last whitespace in the second half of the window
            if end < n && !chars[end].1.is_whitespace() {
                let floor = start + self.size / 2;
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].1.is_whitespace()) {
                    end = ws + 1;
                }
            }

            push_trimmed(&mut spans, text, byte_at(start), byte_at(end));

            if end >= n {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        spans
    }

    fn split_tokens(&self, text: &str) -> Vec<Span> {
        let words = word_bounds(text);
        let mut spans = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let mut budget = 0;
            let mut end = start;
            while end < words.len() {
                let cost = estimate_tokens(&text[words[end].0..words[end].1]).max(1);
                if end > start && budget + cost > self.size {
                    break;
                }
                budget += cost;
                end += 1;
            }

            push_trimmed(&mut spans, text, words[start].0, words[end - 1].1);

            if end >= words.len() {
                break;
            }

            // Carry trailing words worth up to `overlap` tokens into the next window
            let mut carried = 0;
            let mut next = end;
            while next > start + 1 {
                let cost = estimate_tokens(&text[words[next - 1].0..words[next - 1].1]).max(1);
                if carried + cost > self.overlap {
                    break;
                }
                carried += cost;
                next -= 1;
            }
            start = next;
        }

        spans
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&IngestionConfig::default())
    }
}

/// Byte ranges of whitespace-delimited words.
fn word_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut word_start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), word_start) {
            (true, Some(s)) => {
                bounds.push((s, i));
                word_start = None;
            }
            (false, None) => word_start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = word_start {
        bounds.push((s, text.len()));
    }
    bounds
}

fn push_trimmed(spans: &mut Vec<Span>, text: &str, from: usize, to: usize) {
    let raw = &text[from..to];
    let trimmed = raw.trim_start();
    let offset = from + (raw.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    if !trimmed.is_empty() {
        spans.push(Span {
            offset,
            text: trimmed.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(spans: &[Span]) -> Vec<&str> {
        spans.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunker = Chunker::new(10, 2, ChunkUnit::Characters);
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\t ").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = Chunker::default();
        let spans = chunker.split("Letters must include a date and signature.");
        assert_eq!(texts(&spans), vec!["Letters must include a date and signature."]);
        assert_eq!(spans[0].offset, 0);
    }

    #[test]
    fn character_chunks_split_on_whitespace() {
        let chunker = Chunker::new(12, 0, ChunkUnit::Characters);
        let spans = chunker.split("alpha beta gamma delta");
        assert_eq!(texts(&spans), vec!["alpha beta", "gamma delta"]);
        assert_eq!(spans[1].offset, 11);
    }

    #[test]
    fn character_overlap_repeats_tail() {
        let chunker = Chunker::new(10, 4, ChunkUnit::Characters);
        let spans = chunker.split("abcdefghijklmnop");
        assert_eq!(texts(&spans), vec!["abcdefghij", "ghijklmnop"]);
    }

    #[test]
    fn offsets_point_into_source() {
        let text = "  one two three four five six seven";
        let chunker = Chunker::new(9, 3, ChunkUnit::Characters);
        for span in chunker.split(text) {
            assert!(text[span.offset..].starts_with(&span.text));
        }
    }

    #[test]
    fn multibyte_text_respects_char_boundaries() {
        let chunker = Chunker::new(3, 1, ChunkUnit::Characters);
        let spans = chunker.split("héllo wörld ñandú");
        assert!(!spans.is_empty());
        let joined: String = spans.iter().map(|s| s.text.as_str()).collect();
        assert!(joined.contains('ñ'));
    }

    #[test]
    fn token_chunks_keep_whole_words() {
        // Each word below estimates to one or two tokens
        let chunker = Chunker::new(4, 0, ChunkUnit::Tokens);
        let spans = chunker.split("one two three four five six");
        for span in &spans {
            for word in span.text.split_whitespace() {
                assert!(["one", "two", "three", "four", "five", "six"].contains(&word));
            }
        }
        assert!(spans.len() >= 2);
        assert!(spans.last().unwrap().text.ends_with("six"));
    }

    #[test]
    fn token_overlap_carries_words() {
        let chunker = Chunker::new(3, 1, ChunkUnit::Tokens);
        let spans = chunker.split("aa bb cc dd ee");
        assert_eq!(texts(&spans), vec!["aa bb cc", "cc dd ee"]);
    }

    #[test]
    fn oversized_word_still_progresses() {
        let chunker = Chunker::new(1, 0, ChunkUnit::Tokens);
        let spans = chunker.split("supercalifragilistic word");
        assert_eq!(texts(&spans), vec!["supercalifragilistic", "word"]);
    }

    #[test]
    fn overlap_is_capped_below_size() {
        let chunker = Chunker::new(5, 50, ChunkUnit::Characters);
        assert_eq!(chunker.overlap(), 4);
        // Still terminates
        assert!(!chunker.split(&"x".repeat(40)).is_empty());
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
