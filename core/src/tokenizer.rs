use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

use crate::config::TokenizerConfig;
use crate::{Result, SearchError};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Splits text into case-folded word tokens.
///
/// The same configuration must be used to build the vocabulary and to parse
/// free-text queries; a different tokenizer silently loses recall.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> TokenizerConfig {
        self.config
    }

    /// NFKC-normalize, lowercase, and split on word boundaries.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized)
            .map(|m| {
                if self.config.stem {
                    STEMMER.stem(m.as_str()).into_owned()
                } else {
                    m.as_str().to_string()
                }
            })
            .collect()
    }
}

/// Decode query bytes in the declared encoding (UTF-8).
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(SearchError::Decoding { input: String::from_utf8_lossy(bytes).into_owned() }),
    }
}
