//! Overlapping-window chunking of memory markdown.

/// One contiguous window of a file: the unit of indexing and retrieval.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Byte offset of the first byte, inclusive.
    pub start: usize,
    /// Byte offset past the last byte, exclusive. `start <= end <= file length`.
    pub end: usize,
    pub text: String,
}

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1600;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 320;

/// Splits UTF-8 text into overlapping windows. Step size is
/// `max(chunk_size - overlap, 1)`; empty input yields no chunks.
/// Windows never split a UTF-8 code point: offsets advance by characters
/// and the recorded offsets are the byte positions of the boundaries.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let step = chunk_size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, plus the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut pos = 0usize;
    loop {
        let end_char = (pos + chunk_size).min(char_count);
        let start = boundaries[pos];
        let end = boundaries[end_char];
        chunks.push(Chunk {
            start,
            end,
            text: text[start..end].to_string(),
        });
        if end_char == char_count {
            break;
        }
        pos += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 1600, 320).is_empty());
    }

    #[test]
    fn short_input_is_one_chunk() {
        let chunks = chunk_text("hello world", 1600, 320);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 11);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 40, 10);
        // step = 30: windows at 0..40, 30..70, 60..100
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 40));
        assert_eq!((chunks[1].start, chunks[1].end), (30, 70));
        assert_eq!((chunks[2].start, chunks[2].end), (60, 100));
    }

    #[test]
    fn chunking_is_stable() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let a = chunk_text(&text, 160, 32);
        let b = chunk_text(&text, 160, 32);
        assert_eq!(a, b);
    }

    #[test]
    fn offsets_respect_multibyte_boundaries() {
        let text = "héllo wörld ünïcode".repeat(10);
        let chunks = chunk_text(&text, 16, 4);
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start));
            assert!(text.is_char_boundary(chunk.end));
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
        assert_eq!(chunks.last().unwrap().end, text.len());
    }

    #[test]
    fn overlap_larger_than_size_still_advances() {
        let text = "x".repeat(20);
        let chunks = chunk_text(&text, 4, 8);
        // step clamps to 1; must terminate and cover the whole text
        assert!(chunks.len() >= 17);
        assert_eq!(chunks.last().unwrap().end, 20);
    }
}
