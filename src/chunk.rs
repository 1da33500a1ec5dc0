//! Overlapping word-window text chunker.
//!
//! Splits document body text into windows of `window_size` whitespace-delimited
//! words, with `overlap` words shared between consecutive windows. Windows
//! operate on token positions, not characters. Output is a pure function of
//! the inputs.

use crate::error::{Error, Result};

/// Split text into overlapping word windows.
///
/// The step between successive window starts is `window_size - overlap`. An
/// `overlap` of at least `window_size` would stall the sweep, so it is clamped
/// to `window_size / 4` rather than rejected. A window that reaches the end of
/// the token sequence is the last chunk, even if it is short. Empty or
/// whitespace-only input yields no chunks.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if `window_size` is zero.
pub fn chunk_text(text: &str, window_size: usize, overlap: usize) -> Result<Vec<String>> {
    if window_size == 0 {
        return Err(Error::InvalidConfiguration(
            "window_size must be > 0".to_string(),
        ));
    }

    let overlap = if overlap >= window_size {
        window_size / 4
    } else {
        overlap
    };
    let step = window_size - overlap;

    let words: Vec<&str> = text.split_whitespace().collect();
    let n = words.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let end = (start + window_size).min(n);
        let piece = words[start..end].join(" ");
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end == n {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_windows() {
        let chunks = chunk_text("a b c d e f g h", 3, 1).unwrap();
        assert_eq!(chunks, vec!["a b c", "c d e", "e f g", "g h"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("hello world", 200, 50).unwrap();
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 200, 50).unwrap().is_empty());
        assert!(chunk_text("   \n\t  ", 200, 50).unwrap().is_empty());
    }

    #[test]
    fn test_zero_window_size_rejected() {
        let err = chunk_text("a b c", 0, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_overlap_clamped_not_rejected() {
        // overlap >= window_size is normalized to window_size / 4
        let clamped = chunk_text("a b c d e f g h i j", 4, 4).unwrap();
        let explicit = chunk_text("a b c d e f g h i j", 4, 1).unwrap();
        assert_eq!(clamped, explicit);
    }

    #[test]
    fn test_overlap_clamp_with_tiny_window() {
        // window_size=1 clamps overlap to 0; the sweep still advances
        let chunks = chunk_text("a b c", 1, 5).unwrap();
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_no_overlap() {
        let chunks = chunk_text("a b c d e f", 2, 0).unwrap();
        assert_eq!(chunks, vec!["a b", "c d", "e f"]);
    }

    #[test]
    fn test_last_window_ends_at_text_end() {
        // Every word appears, and the final chunk ends with the final word.
        let text = (0..47).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text, 10, 3).unwrap();
        assert!(chunks.last().unwrap().ends_with("w46"));

        // Accounting for overlap, the concatenation covers all 47 words.
        let step = 10 - 3;
        let mut covered = std::collections::HashSet::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let start = i * step;
            for (j, word) in chunk.split_whitespace().enumerate() {
                assert_eq!(word, format!("w{}", start + j));
                covered.insert(start + j);
            }
        }
        assert_eq!(covered.len(), 47);
    }

    #[test]
    fn test_deterministic() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let a = chunk_text(text, 5, 2).unwrap();
        let b = chunk_text(text, 5, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multiline_whitespace_collapsed() {
        let chunks = chunk_text("a\nb\t c \n\n d", 3, 0).unwrap();
        assert_eq!(chunks, vec!["a b c", "d"]);
    }
}
