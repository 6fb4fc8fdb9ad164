//! Text chunking with page tracking

use unicode_segmentation::UnicodeSegmentation;

use super::parser::ParsedDocument;
use crate::types::{Chunk, ChunkSource, Document};

/// Text chunker with configurable size and overlap, both in characters
pub struct TextChunker {
    /// Maximum chunk size
    chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Chunk a parsed document page by page.
    ///
    /// Chunks never span pages, so each carries the page it came from.
    pub fn chunk_document(&self, doc: &Document, parsed: &ParsedDocument) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in &parsed.pages {
            let source = ChunkSource {
                filename: doc.filename.clone(),
                page_number: page.page_number,
                page_count: parsed.total_pages,
            };
            for text in self.chunk_text(&page.content) {
                let index = chunks.len() as u32;
                chunks.push(Chunk::new(doc.id, text, source.clone(), index));
            }
        }

        chunks
    }

    /// Split text into chunks of at most `chunk_size` characters
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in self.pieces(text) {
            if !current.is_empty() && char_len(&current) + char_len(piece) > self.chunk_size {
                push_trimmed(&mut chunks, &current);

                // Start new chunk with overlap
                current = self.overlap_text(&current);
                if char_len(&current) + char_len(piece) > self.chunk_size {
                    current.clear();
                }
            }
            current.push_str(piece);
        }

        push_trimmed(&mut chunks, &current);
        chunks
    }

    /// Sentences, with any sentence longer than a chunk broken at word bounds
    fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        for sentence in text.split_sentence_bounds() {
            if char_len(sentence) <= self.chunk_size {
                pieces.push(sentence);
                continue;
            }

            let mut start = 0;
            let mut len = 0;
            for (offset, word) in sentence.split_word_bound_indices() {
                let word_len = char_len(word);
                if len > 0 && len + word_len > self.chunk_size {
                    pieces.push(&sentence[start..offset]);
                    start = offset;
                    len = 0;
                }
                if word_len > self.chunk_size {
                    pieces.extend(hard_split(word, self.chunk_size));
                    start = offset + word.len();
                    continue;
                }
                len += word_len;
            }
            if start < sentence.len() {
                pieces.push(&sentence[start..]);
            }
        }
        pieces
    }

    /// Tail of a chunk to repeat at the start of the next one
    fn overlap_text(&self, text: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        if char_len(text) <= self.overlap {
            return text.to_string();
        }

        let start = text
            .char_indices()
            .rev()
            .nth(self.overlap - 1)
            .map_or(0, |(i, _)| i);
        let overlap_text = &text[start..];

        // Try to start at a sentence boundary
        if let Some(pos) = overlap_text.find(". ") {
            return overlap_text[pos + 2..].to_string();
        }

        // Fall back to word boundary
        if let Some(pos) = overlap_text.find(' ') {
            return overlap_text[pos + 1..].to_string();
        }

        overlap_text.to_string()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split a run with no word bounds into `size`-character slices
fn hard_split(word: &str, size: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (count, (i, _)) in word.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            parts.push(&word[start..i]);
            start = i;
        }
    }
    parts.push(&word[start..]);
    parts
}
