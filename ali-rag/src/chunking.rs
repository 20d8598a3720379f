//! Splitting long texts into overlapping chunks for ingestion.
//!
//! [`TextChunker`] cuts by character count. When a cut would land mid-sentence
//! it looks back a bounded distance for a `.` or newline and ends the chunk
//! there instead. Consecutive chunks share `chunk_overlap` characters.

/// How far back from the hard cut to look for a natural break.
const BREAK_LOOKBACK: usize = 100;

/// Splits text into chunks of at most `chunk_size` characters.
///
/// Sizes are counted in `char`s so multi-byte text never splits inside a
/// code point. Chunks are trimmed and empty chunks are dropped.
///
/// # Example
///
/// ```rust,ignore
/// use ali_rag::TextChunker;
///
/// let chunker = TextChunker::new(1000, 200);
/// let parts = chunker.chunk(&text);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl TextChunker {
    /// Create a new `TextChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap` — characters shared between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks. Returns an empty `Vec` for blank input.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);
            if end < len {
                end = natural_break(&chars, start, end).unwrap_or(end);
            }

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= len {
                break;
            }
            // Always advance, even when the overlap would swallow the whole chunk.
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

/// Find the last `.` or `\n` within the lookback window before `end`,
/// returning the exclusive end index just past it.
fn natural_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let floor = end.saturating_sub(BREAK_LOOKBACK).max(start + 1);
    (floor..end).rev().find(|&i| matches!(chars[i], '.' | '\n')).map(|i| i + 1)
}
