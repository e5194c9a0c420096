//! Utterance segmentation.
//!
//! An utterance is cut at every `!`, `?`, `.` and `,`. Each piece between
//! boundaries is trimmed and kept only if something is left, so runs of
//! punctuation or whitespace never produce a chunk. Indices are assigned
//! after filtering and are therefore dense.

use serde::Serialize;

/// Characters that end a chunk.
pub const BOUNDARIES: [char; 4] = ['!', '?', '.', ','];

/// One unit of synthesis work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position among the surviving chunks of the utterance (0-based).
    pub index: usize,
    pub text: String,
}

/// Split `utterance` into ordered, trimmed, non-empty chunks.
pub fn segment(utterance: &str) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = utterance
        .split(BOUNDARIES)
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .enumerate()
        .map(|(index, text)| Chunk {
            index,
            text: text.to_string(),
        })
        .collect();

    for chunk in &chunks {
        tracing::debug!(index = chunk.index, text = %chunk.text, "segmented chunk");
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_segment_splits_on_every_boundary() {
        let chunks = segment("Hello, world! How are you?");
        assert_eq!(texts(&chunks), vec!["Hello", "world", "How are you"]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_segment_empty_and_punctuation_only() {
        assert!(segment("").is_empty());
        assert!(segment("...").is_empty());
        assert!(segment("  ,  !? . ").is_empty());
    }

    #[test]
    fn test_segment_without_boundaries() {
        let chunks = segment("  no punctuation here  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "no punctuation here");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_segment_indices_are_dense_after_filtering() {
        let chunks = segment(",,first.. ,second!?\n\tthird,");
        assert_eq!(texts(&chunks), vec!["first", "second", "third"]);
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
        }
    }

    #[test]
    fn test_segment_is_deterministic() {
        let input = "One. Two, three! Four? Five";
        assert_eq!(segment(input), segment(input));
    }

    #[test]
    fn test_segment_keeps_other_punctuation() {
        let chunks = segment("Wait; really: yes. Okay");
        assert_eq!(texts(&chunks), vec!["Wait; really: yes", "Okay"]);
    }
}
