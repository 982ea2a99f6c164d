//! Tokenizer contract consumed by the term index and the synonym/curation
//! rule engine. Grounded on `analysis/tokenizer.rs`'s `StandardTokenizer`;
//! narrowed to what the ART/rule layers need (position-ordered token text
//! plus byte offset) and shorn of the pluggable filter-chain machinery
//! that lived downstream of it.

use unicode_segmentation::UnicodeSegmentation;

/// A single token produced by tokenization: its text, its ordinal
/// position within the document (used as the posting's position entry),
/// and the byte offset it started at in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub position: u32,
    pub byte_offset: usize,
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

/// Splits on Unicode word boundaries, lowercasing for case-insensitive
/// term matching; tokens past `max_token_length` bytes are dropped rather
/// than truncated.
#[derive(Debug, Clone)]
pub struct UnicodeTokenizer {
    pub lowercase: bool,
    pub max_token_length: usize,
}

impl Default for UnicodeTokenizer {
    fn default() -> Self {
        UnicodeTokenizer { lowercase: true, max_token_length: 255 }
    }
}

impl Tokenizer for UnicodeTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        let mut byte_offset = 0usize;

        for word in text.unicode_words() {
            if word.len() <= self.max_token_length {
                let token_text = if self.lowercase { word.to_lowercase() } else { word.to_string() };
                tokens.push(Token { text: token_text, position, byte_offset });
                position += 1;
            }
            byte_offset += word.len();
        }
        tokens
    }
}
