//! Text chunking
//!
//! Splits document text into ordered, overlapping chunks sized for
//! embedding. Splitting prefers semantic boundaries in descending order:
//! paragraph breaks, line breaks, list items, then single spaces, falling
//! back to a raw character split only when a span contains none of them.
//! Output is deterministic for identical input and parameters.

use crate::config::ChunkConfig;
use std::collections::VecDeque;

/// Boundary separators, strongest first. A span is split on the first
/// separator it actually contains.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", "- ", " "];

/// A text chunk with its position within the document
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// The chunk content, trimmed of surrounding whitespace
    pub text: String,

    /// Chunk index (0-based position within the document)
    pub index: usize,
}

/// Split document text into chunks of at most `chunk_size` characters with
/// roughly `overlap` characters shared between consecutive chunks.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let pieces = split_recursive(text, &SEPARATORS, config.chunk_size);

    merge_pieces(pieces, config.chunk_size, config.overlap)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk { text, index })
        .collect()
}

/// Split `text` into pieces no longer than `max_len`, trying separators in
/// order and only descending to weaker ones for pieces that are still too
/// long.
fn split_recursive(text: &str, separators: &[&str], max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let Some((sep, rest)) = separators.split_first() else {
        return split_chars(text, max_len);
    };

    let pieces = split_at_separator(text, sep);
    if pieces.len() == 1 {
        // Separator absent; try the next one
        return split_recursive(text, rest, max_len);
    }

    let mut out = Vec::new();
    for piece in pieces {
        if piece.len() > max_len {
            out.extend(split_recursive(piece, rest, max_len));
        } else {
            out.push(piece.to_string());
        }
    }
    out
}

/// Split so that each separator occurrence begins a new piece. The
/// separator stays attached, so concatenating the pieces reproduces the
/// input exactly.
fn split_at_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Last-resort split on character boundaries
fn split_chars(text: &str, max_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if current.len() + c.len_utf8() > max_len && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }

    out
}

/// Greedily merge pieces into chunks of at most `chunk_size` characters,
/// carrying a tail of up to `overlap` characters forward into the next
/// chunk.
fn merge_pieces(pieces: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.len();
        if total + len > chunk_size && !window.is_empty() {
            push_chunk(&mut chunks, &window);

            // Drop pieces from the front until the retained tail fits the
            // overlap budget and leaves room for the incoming piece
            while total > overlap || (total + len > chunk_size && total > 0) {
                let removed = window.pop_front().expect("window non-empty while total > 0");
                total -= removed.len();
            }
        }
        total += len;
        window.push_back(piece);
    }
    push_chunk(&mut chunks, &window);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<String>) {
    let text: String = window.iter().map(String::as_str).collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", &config(512, 50)).is_empty());
        assert!(chunk_text("   \n\n  ", &config(512, 50)).is_empty());
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunks = chunk_text("This is a short document.", &config(512, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "This is a short document.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let chunks = chunk_text("aaa\n\nbbb\n\nccc", &config(8, 0));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaa\n\nbbb", "ccc"]);
    }

    #[test]
    fn test_list_items_stay_with_marker() {
        let chunks = chunk_text("- one\n- two\n- three", &config(8, 0));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["- one", "- two", "- three"]);
    }

    #[test]
    fn test_word_overlap_between_chunks() {
        let chunks = chunk_text("one two three four", &config(10, 4));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one two", "two three", "four"]);
    }

    #[test]
    fn test_long_document_respects_size_bound() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(40);
        assert!(text.len() > 2000);

        let cfg = config(512, 50);
        let chunks = chunk_text(&text, &cfg);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.text.len() <= cfg.chunk_size);
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let text = "Some repeated content here. ".repeat(60);
        let cfg = config(256, 32);

        let a: Vec<String> = chunk_text(&text, &cfg).into_iter().map(|c| c.text).collect();
        let b: Vec<String> = chunk_text(&text, &cfg).into_iter().map(|c| c.text).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_character_fallback_is_utf8_safe() {
        // No separators at all, multi-byte characters
        let text = "é".repeat(600);
        let cfg = config(512, 0);

        let chunks = chunk_text(&text, &cfg);
        assert!(chunks.len() > 1);

        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, text);
        for chunk in &chunks {
            assert!(chunk.text.len() <= cfg.chunk_size);
        }
    }
}
