//! Error types for descrambler

use thiserror::Error;

/// Main error type for descrambler operations
#[derive(Debug, Error)]
pub enum DescrambleError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Grammar mismatch at offset {offset}: {fragment:?}")]
    GrammarMismatch { offset: usize, fragment: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Index {index} out of bounds for {len} array elements")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Runtime action error: {0}")]
    RuntimeAction(String),

    #[error("Invalid stream cipher: {0}")]
    InvalidCipher(String),

    #[error("Parse error: {0}")]
    ParseError(#[from] std::num::ParseIntError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl DescrambleError {
    /// Check if a required pattern was missing from the script
    pub fn is_extraction_error(&self) -> bool {
        matches!(self, DescrambleError::Extraction(_))
    }

    /// Check if error comes from building a program rather than running one
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            DescrambleError::Extraction(_)
                | DescrambleError::GrammarMismatch { .. }
                | DescrambleError::UnknownVariable(_)
                | DescrambleError::IndexOutOfBounds { .. }
                | DescrambleError::ParseError(_)
                | DescrambleError::RegexError(_)
        )
    }

    pub(crate) fn mismatch(offset: usize, fragment: &str) -> Self {
        let fragment: String = fragment.chars().take(48).collect();
        DescrambleError::GrammarMismatch { offset, fragment }
    }
}
