//! Boundary-aware sliding window chunker.
//!
//! Windows of `chunk_size` bytes advance with `overlap` bytes of shared
//! context. Before cutting, the window end is pulled back to the nearest
//! paragraph break in its last 200 bytes, or failing that the nearest
//! sentence break in its last 100 bytes, so chunks rarely split a sentence.

use super::{ChunkingConfig, ContentChunk};

/// How far back from the window end to look for a paragraph break.
const PARAGRAPH_WINDOW: usize = 200;

/// How far back from the window end to look for a sentence break.
const SENTENCE_WINDOW: usize = 100;

/// Split text into overlapping chunks.
///
/// Guarantees:
/// - every returned chunk has non-empty text and `start_char < end_char <= text.len()`
/// - the first window starts at 0 and the last one ends at `text.len()`
/// - windows never leave a gap: each starts at or before the previous end
/// - the loop terminates for any `chunk_size` and `overlap`
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<ContentChunk> {
    let chunk_size = config.chunk_size.max(1);
    let len = text.len();

    if text.trim().is_empty() {
        return Vec::new();
    }

    if len <= chunk_size {
        return vec![ContentChunk::new(0, text.trim(), 0, len)];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = floor_char_boundary(text, (start + chunk_size).min(len));
        if end <= start {
            end = ceil_char_boundary(text, start + 1);
        }

        if end < len {
            end = snap_to_break(text, start, end);
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(ContentChunk::new(chunks.len(), piece, start, end));
        }

        if end >= len {
            break;
        }

        let next = floor_char_boundary(text, end.saturating_sub(config.overlap));
        // Overlap too large for this window: move on without leaving a gap.
        start = if next > start { next } else { end };
    }

    chunks
}

/// Pull `end` back to just after a paragraph or sentence break, if one is near.
fn snap_to_break(text: &str, start: usize, end: usize) -> usize {
    for (pattern, window) in [("\n\n", PARAGRAPH_WINDOW), (". ", SENTENCE_WINDOW)] {
        let from = floor_char_boundary(text, end.saturating_sub(window).max(start));
        if let Some(pos) = text[from..end].rfind(pattern) {
            let candidate = from + pos + pattern.len();
            if candidate > start {
                return candidate;
            }
        }
    }
    end
}

pub(crate) fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
        }
    }

    fn prose(len: usize) -> String {
        "The quick brown fox jumps over the lazy dog. "
            .repeat(len / 45 + 1)
            .chars()
            .take(len)
            .collect()
    }

    fn assert_covers(text: &str, chunks: &[ContentChunk]) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks.last().unwrap().end_char, text.len());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char <= pair[0].end_char, "gap between chunks");
            assert!(pair[1].start_char > pair[0].start_char, "start did not advance");
        }
        for chunk in chunks {
            assert!(chunk.start_char < chunk.end_char);
            assert!(chunk.end_char <= text.len());
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("  Hello, world!  ", &config(1500, 150));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 17);
        assert_eq!(chunks[0].token_estimate, 4);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("", &config(1500, 150)).is_empty());
        assert!(chunk_text("   \n  ", &config(1500, 150)).is_empty());
    }

    #[test]
    fn test_five_thousand_chars_of_prose() {
        let text = prose(5000);
        assert_eq!(text.len(), 5000);

        let chunks = chunk_text(&text, &config(1500, 150));
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.last().unwrap().end_char, 5000);

        for pair in chunks.windows(2) {
            let gap = pair[0].end_char - pair[1].start_char;
            assert!(gap <= 150, "next chunk starts {} bytes before previous end", gap);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_snaps_to_sentence_break() {
        let text = prose(5000);
        let chunks = chunk_text(&text, &config(1500, 150));
        // Every chunk but the last ends right after a full sentence.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with("dog."), "chunk ended mid-sentence");
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let first = "a".repeat(1350);
        let second = "b. ".repeat(200);
        let text = format!("{}\n\n{}", first, second);

        let chunks = chunk_text(&text, &config(1500, 150));
        assert_eq!(chunks[0].end_char, 1352);
        assert_eq!(chunks[0].text, first);
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_size_bound() {
        let text = prose(12_345);
        for (size, overlap) in [(1500, 150), (500, 50), (300, 299), (64, 8)] {
            let chunks = chunk_text(&text, &config(size, overlap));
            for chunk in &chunks {
                assert!(chunk.end_char - chunk.start_char <= size);
                assert!(chunk.text.len() <= size);
            }
            assert_covers(&text, &chunks);
        }
    }

    #[test]
    fn test_terminates_when_overlap_exceeds_size() {
        let text = "abcdefghij".repeat(200);
        for (size, overlap) in [(100, 100), (100, 250), (1, 5), (0, 0)] {
            let chunks = chunk_text(&text, &config(size, overlap));
            assert_covers(&text, &chunks);
        }
    }

    #[test]
    fn test_multibyte_text_respects_char_boundaries() {
        let text = "héllo wörld, ça va? ".repeat(200);
        let text = text.trim_end();
        let chunks = chunk_text(text, &config(333, 40));
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_char));
            assert!(text.is_char_boundary(chunk.end_char));
        }
        assert_covers(text, &chunks);
    }
}
