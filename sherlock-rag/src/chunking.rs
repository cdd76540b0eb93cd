//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`]: fixed character windows with a constant overlap
//! - [`RecursiveChunker`]: splits on paragraphs, then lines, then words, then
//!   characters, and merges neighbouring pieces back up to the chunk size
//!
//! Sizes, overlaps and offsets are all counted in characters (Unicode scalar
//! values), never bytes, so multi-byte text is never split mid-character.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{ChunkingStrategy, RagConfig};
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    ///
    /// Returns an empty `Vec` if the document has empty text. Calling this
    /// twice on the same document yields identical chunks.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Build the chunker selected by `config.chunking`.
pub fn chunker_for(config: &RagConfig) -> Result<Arc<dyn Chunker>> {
    Ok(match config.chunking {
        ChunkingStrategy::Fixed => {
            Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?)
        }
        ChunkingStrategy::Recursive => {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?)
        }
    })
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfiguration(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfiguration(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size character windows.
///
/// Window `i` starts at character `i * (chunk_size - chunk_overlap)` and is
/// `chunk_size` characters long, except the last one, which is truncated to
/// the end of the text. The walk stops at the first window that reaches the
/// end, so a text of `n > chunk_size` characters yields
/// `ceil((n - chunk_overlap) / (chunk_size - chunk_overlap))` chunks and a
/// shorter one yields exactly one.
///
/// # Example
///
/// ```rust
/// use sherlock_rag::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4, 1).unwrap();
/// let chunks = chunker.chunk(&Document::new("abc.txt", "abcdefghij"));
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless
    /// `chunk_size > 0` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.text;
        if text.is_empty() {
            return Vec::new();
        }

        // Byte index of every character start, plus the end of the text.
        let bounds: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let n = bounds.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::with_capacity(n.saturating_sub(self.chunk_overlap) / step + 1);
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(n);
            let slice = &text[bounds[start]..bounds[end]];
            chunks.push(Chunk::new(document, chunks.len(), start, slice.to_string()));
            if end == n {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Splits text on the coarsest separator that keeps pieces under the chunk
/// size, then merges neighbouring pieces back together.
///
/// Separators are tried in order: blank line, newline, space, and finally
/// individual characters. Pieces are merged greedily up to `chunk_size`
/// characters; when a chunk is emitted, trailing pieces totalling at most
/// `chunk_overlap` characters are carried into the next one. Chunks are
/// trimmed of surrounding whitespace, and whitespace-only chunks are
/// dropped.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless
    /// `chunk_size > 0` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    fn split<'a>(&self, root: &'a str, text: &'a str, separators: &[&str]) -> Vec<&'a str> {
        let position =
            separators.iter().position(|s| s.is_empty() || text.contains(s)).unwrap_or(separators.len());
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut output = Vec::new();
        let mut fitting: Vec<&'a str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                output.extend(self.merge(root, &fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                output.push(piece);
            } else {
                output.extend(self.split(root, piece, finer));
            }
        }
        if !fitting.is_empty() {
            output.extend(self.merge(root, &fitting));
        }
        output
    }

    /// Greedily join adjacent pieces. Adjacent pieces are contiguous in
    /// `root`, so every merged chunk is itself a slice of it.
    fn merge<'a>(&self, root: &'a str, pieces: &[&'a str]) -> Vec<&'a str> {
        let mut merged = Vec::new();
        let mut window: VecDeque<&'a str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(joined) = join_contiguous(root, &window) {
                    let trimmed = joined.trim();
                    if !trimmed.is_empty() {
                        merged.push(trimmed);
                    }
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(joined) = join_contiguous(root, &window) {
            let trimmed = joined.trim();
            if !trimmed.is_empty() {
                merged.push(trimmed);
            }
        }
        merged
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.split(text, text, &SEPARATORS)
            .into_iter()
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(ordinal, piece)| {
                let offset = text[..byte_offset(text, piece)].chars().count();
                Chunk::new(document, ordinal, offset, piece.to_string())
            })
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` before every occurrence of `separator`, keeping the
/// separator at the start of the following piece. An empty separator splits
/// into single characters. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// The slice of `root` spanning a run of adjacent pieces of it.
fn join_contiguous<'a>(root: &'a str, window: &VecDeque<&'a str>) -> Option<&'a str> {
    let first = window.front()?;
    let last = window.back()?;
    let start = byte_offset(root, first);
    let end = byte_offset(root, last) + last.len();
    root.get(start..end)
}

/// Byte position of `piece` within `root`, which it must be a slice of.
fn byte_offset(root: &str, piece: &str) -> usize {
    piece.as_ptr() as usize - root.as_ptr() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("notes.txt", text)
    }

    #[test]
    fn fixed_rejects_bad_parameters() {
        assert!(matches!(FixedSizeChunker::new(0, 0), Err(RagError::InvalidConfiguration(_))));
        assert!(matches!(FixedSizeChunker::new(10, 10), Err(RagError::InvalidConfiguration(_))));
        assert!(FixedSizeChunker::new(10, 0).is_ok());
    }

    #[test]
    fn fixed_empty_text_yields_nothing() {
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn fixed_short_text_is_one_chunk() {
        let chunker = FixedSizeChunker::new(10, 2).unwrap();
        let chunks = chunker.chunk(&doc("0123456789"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "0123456789");
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn fixed_windows_overlap_and_stop_at_end() {
        let chunker = FixedSizeChunker::new(4, 2).unwrap();
        let chunks = chunker.chunk(&doc("abcdefgh"));
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "cdef", "efgh"]);
        let offsets: Vec<_> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, [0, 2, 4]);
        let ordinals: Vec<_> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, [0, 1, 2]);
    }

    #[test]
    fn fixed_counts_characters_not_bytes() {
        let chunker = FixedSizeChunker::new(3, 1).unwrap();
        let chunks = chunker.chunk(&doc("héllo wörld"));
        assert_eq!(chunks[0].text, "hél");
        assert_eq!(chunks[1].text, "llo");
        assert_eq!(chunks.last().unwrap().text, "rld");
    }

    #[test]
    fn fixed_chunks_carry_source() {
        let document = doc("abcdef");
        let chunks = FixedSizeChunker::new(4, 0).unwrap().chunk(&document);
        assert_eq!(chunks[1].id, format!("{}_1", document.id));
        assert_eq!(chunks[1].document_id, document.id);
        assert_eq!(chunks[1].source, "notes.txt");
    }

    #[test]
    fn recursive_prefers_paragraph_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird one.";
        let chunker = RecursiveChunker::new(30, 0).unwrap();
        let texts: Vec<_> = chunker.chunk(&doc(text)).into_iter().map(|c| c.text).collect();
        assert_eq!(texts, ["First paragraph here.", "Second paragraph here.", "Third one."]);
    }

    #[test]
    fn recursive_chunks_fit_and_offsets_point_into_text() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(12);
        let chunker = RecursiveChunker::new(50, 10).unwrap();
        let document = doc(&text);
        let chunks = chunker.chunk(&document);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 50, "chunk too long: {:?}", chunk.text);
            let tail: String = text.chars().skip(chunk.offset).collect();
            assert!(tail.starts_with(&chunk.text));
        }
    }

    #[test]
    fn recursive_carries_overlap_between_word_chunks() {
        let text = "one two three four five six seven eight nine ten";
        let chunker = RecursiveChunker::new(15, 6).unwrap();
        let chunks = chunker.chunk(&doc(text));
        let first_words: Vec<&str> = chunks[0].text.split(' ').collect();
        let last_of_first = first_words[first_words.len() - 1];
        assert!(chunks[1].text.starts_with(last_of_first), "{chunks:?}");
    }

    #[test]
    fn recursive_whitespace_only_yields_nothing() {
        let chunker = RecursiveChunker::new(10, 0).unwrap();
        assert!(chunker.chunk(&doc(" \n\n \n")).is_empty());
    }

    #[test]
    fn chunker_for_follows_strategy() {
        let config = RagConfig::builder()
            .chunk_size(4)
            .chunk_overlap(0)
            .chunking(ChunkingStrategy::Fixed)
            .build()
            .unwrap();
        assert_eq!(chunker_for(&config).unwrap().chunk(&doc("abcdefgh")).len(), 2);
    }
}
