//! Recursive character chunker
//!
//! Splits text into chunks of at most `chunk_size` characters, preferring to
//! break at paragraph, line, and sentence boundaries before falling back to
//! spaces and finally hard character cuts. Consecutive chunks share an
//! overlap: each chunk after the first starts with the tail of its
//! predecessor.
//!
//! All sizes are counted in characters, not bytes, so multi-byte text never
//! gets cut inside a code point.

use docchat_core::{Chunk, DocChatError, Document, Result};

/// Boundary preference order, coarsest first
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Character-count splitter with overlap.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Create a chunker. Fails when `chunk_overlap >= chunk_size` or
    /// `chunk_size` is zero.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocChatError::Ingest("chunk_size must be positive".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(DocChatError::Ingest(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split raw text into overlapping pieces.
    ///
    /// Empty text yields no pieces; text within `chunk_size` yields exactly
    /// one. Stripping the first `chunk_overlap` characters from every piece
    /// after the first and concatenating reproduces the input.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        // Segments stay within chunk_size minus the overlap prefix that will
        // be prepended to each one
        let body = self.chunk_size - self.chunk_overlap;
        let segments = split_and_merge(text, body, SEPARATORS);

        let mut chunks: Vec<String> = Vec::with_capacity(segments.len());
        for segment in segments {
            match chunks.last() {
                Some(prev) => {
                    let mut chunk = char_tail(prev, self.chunk_overlap).to_string();
                    chunk.push_str(&segment);
                    chunks.push(chunk);
                }
                None => chunks.push(segment),
            }
        }
        chunks
    }

    /// Chunk a document, tagging each chunk with the parent metadata plus a
    /// `chunk_index` key.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), i.to_string());
                Chunk::new(text, metadata)
            })
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s` as a subslice
fn char_tail(s: &str, n: usize) -> &str {
    match s.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &s[idx..],
        _ => {
            if n == 0 {
                ""
            } else {
                s
            }
        }
    }
}

/// Split at the first separator that applies, merging small neighbors back
/// together, and recurse with finer separators on pieces that are still too
/// long. Separators stay attached to the preceding piece so concatenating
/// the output reproduces the input.
fn split_and_merge(text: &str, max_chars: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }
    let (separator, rest) = match separators.split_first() {
        Some((sep, rest)) => (*sep, rest),
        None => return split_by_size(text, max_chars),
    };

    let mut out = Vec::new();
    let mut current = String::new();

    for piece in split_keeping_separator(text, separator) {
        if current.is_empty() {
            current.push_str(piece);
        } else if char_len(&current) + char_len(piece) <= max_chars {
            current.push_str(piece);
        } else {
            flush(&mut out, current, max_chars, rest);
            current = piece.to_string();
        }
    }
    if !current.is_empty() {
        flush(&mut out, current, max_chars, rest);
    }

    out
}

fn flush(out: &mut Vec<String>, piece: String, max_chars: usize, separators: &[&str]) {
    if char_len(&piece) > max_chars {
        out.extend(split_and_merge(&piece, max_chars, separators));
    } else {
        out.push(piece);
    }
}

/// Split at a separator, keeping the separator on the preceding piece
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Hard cut every `max_chars` characters, respecting char boundaries
fn split_by_size(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Strip the overlap prefix from every chunk after the first and
    /// concatenate; must reproduce the original text.
    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                let skip = overlap.min(char_len(&chunks[i - 1]));
                out.extend(chunk.chars().skip(skip));
            }
        }
        out
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(100, 10).unwrap();
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::new(100, 10).unwrap();
        assert_eq!(chunker.split("hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_exact_boundary_is_one_chunk() {
        let chunker = TextChunker::new(5, 2).unwrap();
        assert_eq!(chunker.split("abcde"), vec!["abcde"]);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(10, 10).is_err());
        assert!(TextChunker::new(10, 11).is_err());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunker = TextChunker::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let chunks = chunker.split(text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
        assert_eq!(chunks[1], "Second paragraph here.");
    }

    #[test]
    fn test_overlap_is_tail_of_previous() {
        let chunker = TextChunker::new(20, 5).unwrap();
        let text = "The quick brown fox jumps over the lazy dog and keeps on running.";
        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = char_tail(&pair[0], 5).to_string();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let chunker = TextChunker::new(4, 1).unwrap();
        let text = "héllo wörld çafé ünïcode";
        let chunks = chunker.split(text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(reconstruct(&chunks, 1), text);
    }

    #[test]
    fn test_chunk_metadata() {
        let chunker = TextChunker::new(10, 2).unwrap();
        let doc = Document::new("a long sentence that needs splitting", "doc.md");
        let chunks = chunker.chunk(&doc);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].source(), Some("doc.md"));
        assert_eq!(
            chunks[1].metadata.get("chunk_index").map(|s| s.as_str()),
            Some("1")
        );
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_size_limit(
            text in "\\PC{0,600}",
            chunk_size in 2usize..64,
            overlap_frac in 0usize..100,
        ) {
            let overlap = overlap_frac * (chunk_size - 1) / 100;
            let chunker = TextChunker::new(chunk_size, overlap).unwrap();
            let chunks = chunker.split(&text);
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= chunk_size);
                prop_assert!(!chunk.is_empty());
            }
        }

        #[test]
        fn prop_reconstruction_is_lossless(
            text in "\\PC{0,600}",
            chunk_size in 2usize..64,
            overlap_frac in 0usize..100,
        ) {
            let overlap = overlap_frac * (chunk_size - 1) / 100;
            let chunker = TextChunker::new(chunk_size, overlap).unwrap();
            let chunks = chunker.split(&text);
            prop_assert_eq!(reconstruct(&chunks, overlap), text);
        }

        #[test]
        fn prop_short_input_is_single_chunk(text in "\\PC{1,40}") {
            let chunker = TextChunker::new(64, 8).unwrap();
            prop_assert_eq!(chunker.split(&text), vec![text]);
        }
    }
}
