use crate::config::RagConfig;
use crate::error::{RagError, Result};
use std::collections::VecDeque;

/// Separators tried in order, from paragraph breaks down to single characters
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Position of this chunk in the split sequence
    pub chunk_index: usize,
    /// Estimated token count for this chunk
    pub token_count: usize,
}

/// Recursive character splitter.
///
/// Text is cut at the coarsest separator it contains. Pieces that are still
/// too long are cut again with the next separator, and the resulting pieces
/// are merged back into chunks of at most `chunk_size` characters. Each new
/// chunk starts with the tail of the previous one, up to `chunk_overlap`
/// characters. Lengths are counted in `char`s, not bytes.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap > chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({}) is larger than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(TextSplitter {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.to_vec(),
        })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunk strings
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split text into indexed chunks
    pub fn split_into_chunks(&self, text: &str) -> Vec<TextChunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| TextChunk {
                token_count: estimate_token_count(&text),
                text,
                chunk_index,
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        // Pick the first separator present in the text; "" always matches
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&'static str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small_pieces: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small_pieces.push(piece);
                continue;
            }

            if !small_pieces.is_empty() {
                chunks.extend(self.merge_pieces(&small_pieces));
                small_pieces.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !small_pieces.is_empty() {
            chunks.extend(self.merge_pieces(&small_pieces));
        }

        chunks
    }

    /// Greedily merge pieces into chunks, carrying an overlap window forward
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    chunks.push(chunk);
                }

                // Shrink the window until it fits the overlap and leaves room for `piece`
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            chunks.push(chunk);
        }

        chunks
    }
}

/// Split text with the library defaults (10000 characters, 1000 overlap)
pub fn split_into_chunks(text: &str) -> Vec<TextChunk> {
    TextSplitter {
        chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
        chunk_overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
        separators: DEFAULT_SEPARATORS.to_vec(),
    }
    .split_into_chunks(text)
}

/// Split at `separator`, attaching each separator to the piece that follows it.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        pieces.push(&text[start..pos]);
        start = pos;
    }
    pieces.push(&text[start..]);

    pieces.into_iter().filter(|p| !p.is_empty()).collect()
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters(n: usize) -> String {
        (0..n)
            .map(|i| (b'a' + (i % 26) as u8) as char)
            .collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_into_chunks("").is_empty());
        assert!(split_into_chunks("   \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("Hello world.\n\nSecond paragraph.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.\n\nSecond paragraph.");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_unbroken_text_overlaps_exactly() {
        let text = letters(25_000);
        let chunks = split_into_chunks(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 10_000);
        assert_eq!(chunks[1].text.chars().count(), 10_000);
        assert_eq!(chunks[2].text.chars().count(), 7_000);

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(9_000).collect();
            let head: String = pair[1].text.chars().take(1_000).collect();
            assert_eq!(tail, head);
        }

        // Dropping the overlap from every chunk after the first rebuilds the text
        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(1_000));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap_bounds() {
        let splitter = TextSplitter::new(200, 50).unwrap();
        // Numbered words keep the text aperiodic, so overlaps can be measured
        let words: Vec<String> = (0..300).map(|i| format!("w{}", i)).collect();
        let text = format!(
            "{}\n\n{}\n{}",
            words[..100].join(" "),
            words[100..200].join(" "),
            words[200..].join(" ")
        );

        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
            assert!(text.contains(chunk.as_str()), "chunk is not a substring");
        }

        for pair in chunks.windows(2) {
            // The longest suffix of one chunk that prefixes the next is the overlap
            let overlap = (1..=pair[0].len())
                .rev()
                .filter(|n| pair[0].is_char_boundary(pair[0].len() - n))
                .find(|n| pair[1].starts_with(&pair[0][pair[0].len() - n..]))
                .unwrap_or(0);
            assert!(overlap <= 50, "overlap of {} exceeds 50", overlap);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let chunks = splitter.split_text("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_multibyte_text_is_counted_in_chars() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        let text = "ééééééééééééééééééééééé";
        let chunks = splitter.split_text(text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks[0].chars().count(), 10);
    }

    #[test]
    fn test_overlap_larger_than_size_is_rejected() {
        assert!(TextSplitter::new(10, 11).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }

    #[test]
    fn test_split_keeping_separator() {
        assert_eq!(
            split_keeping_separator("a\n\n\n\nb", "\n\n"),
            vec!["a", "\n\n", "\n\nb"]
        );
        assert_eq!(split_keeping_separator("ab", ""), vec!["a", "b"]);
    }

    #[test]
    fn test_estimate_token_count() {
        assert_eq!(estimate_token_count("Hello, world!"), 4);
        assert_eq!(estimate_token_count(""), 0);
    }
}
