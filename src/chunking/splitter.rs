//! Fixed-length character splitting

use tracing::debug;

/// Splits accepted article text into fixed-length character chunks
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_length: usize,
}

impl TextSplitter {
    /// Create a splitter producing chunks of at most `chunk_length` characters.
    /// A zero length is treated as one.
    pub fn new(chunk_length: usize) -> Self {
        Self {
            chunk_length: chunk_length.max(1),
        }
    }

    pub fn chunk_length(&self) -> usize {
        self.chunk_length
    }

    /// Cut `content` into consecutive slices of `chunk_length` characters.
    ///
    /// Slices are taken at char boundaries, so multi-byte text is never split
    /// mid-character. Whitespace-only slices are dropped.
    pub fn split<'a>(&self, content: &'a str) -> Vec<&'a str> {
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut count = 0usize;

        for (idx, _) in content.char_indices() {
            if count == self.chunk_length {
                chunks.push(&content[start..idx]);
                start = idx;
                count = 0;
            }
            count += 1;
        }
        if start < content.len() {
            chunks.push(&content[start..]);
        }

        let total = chunks.len();
        chunks.retain(|c| !c.trim().is_empty());
        debug!(
            "Split {} chars into {} chunks ({} blank skipped)",
            content.chars().count(),
            chunks.len(),
            total - chunks.len()
        );
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_length_is_one_chunk() {
        let content = "a".repeat(10_000);
        let chunks = TextSplitter::new(10_000).split(&content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 10_000);
    }

    #[test]
    fn test_smaller_length_gives_remainder_chunk() {
        let content = "b".repeat(10_000);
        let chunks = TextSplitter::new(4000).split(&content);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![4000, 4000, 2000]);
    }

    #[test]
    fn test_multibyte_boundaries() {
        let content = "数据库".repeat(5);
        let chunks = TextSplitter::new(4).split(&content);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], "数据库数");
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_blank_chunks_skipped() {
        let content = format!("{}{}{}", "x".repeat(3), " ".repeat(6), "y".repeat(2));
        let chunks = TextSplitter::new(3).split(&content);
        assert_eq!(chunks, vec!["xxx", "yy"]);
    }

    #[test]
    fn test_empty_content() {
        assert!(TextSplitter::new(10).split("").is_empty());
        assert_eq!(TextSplitter::new(0).chunk_length(), 1);
    }
}
