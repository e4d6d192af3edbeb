use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Result, SearchError};

/// Everything the offline pipeline needs to turn records into a trained bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub prune: PruneConfig,
    pub tfidf: TfidfConfig,
    pub lsi: LsiConfig,
    pub tokenizer: TokenizerConfig,
}

impl BuildConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: BuildConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.prune.validate()?;
        self.lsi.validate()
    }
}

/// Vocabulary filter applied once, before the vocabulary is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Drop words found in fewer documents than this.
    pub no_below: u32,
    /// Drop words found in more than this fraction of documents.
    pub no_above: f64,
    /// Keep at most this many words, most frequent first.
    pub keep_n: Option<usize>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self { no_below: 5, no_above: 0.5, keep_n: Some(100_000) }
    }
}

impl PruneConfig {
    /// No filtering at all.
    pub fn keep_all() -> Self {
        Self { no_below: 0, no_above: 1.0, keep_n: None }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.no_above > 0.0 && self.no_above <= 1.0) {
            return Err(SearchError::InvalidConfig(format!("no_above must be in (0, 1], got {}", self.no_above)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Scale every weighted vector to unit L2 length.
    L2,
    /// Keep raw tf-idf magnitudes.
    None,
}

/// Weighting scheme. Stored with the bundle so query vectors are weighted
/// exactly like the training corpus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    /// Use 1 + ln(tf) instead of the raw count.
    pub sublinear_tf: bool,
    /// Use ln(1 + N/df) instead of ln(N/df).
    pub smooth_idf: bool,
    pub normalize: Normalization,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self { sublinear_tf: false, smooth_idf: false, normalize: Normalization::L2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsiConfig {
    pub num_topics: usize,
    /// Extra directions sampled beyond `num_topics` by the range finder.
    pub oversample: usize,
    /// Power iterations used to sharpen the sampled subspace.
    pub power_iters: usize,
    pub seed: u64,
}

impl Default for LsiConfig {
    fn default() -> Self {
        Self { num_topics: 300, oversample: 10, power_iters: 2, seed: 42 }
    }
}

impl LsiConfig {
    pub fn with_topics(num_topics: usize) -> Self {
        Self { num_topics, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_topics == 0 {
            return Err(SearchError::InvalidConfig("num_topics must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Reduce tokens to their English stem.
    pub stem: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config: BuildConfig = serde_json::from_str(r#"{ "lsi": { "num_topics": 50 }, "tfidf": { "normalize": "none" } }"#).unwrap();
        assert_eq!(config.lsi.num_topics, 50);
        assert_eq!(config.lsi.power_iters, 2);
        assert_eq!(config.tfidf.normalize, Normalization::None);
        assert_eq!(config.prune, PruneConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = BuildConfig::default();
        config.prune.no_above = 0.0;
        assert!(matches!(config.validate(), Err(SearchError::InvalidConfig(_))));

        let mut config = BuildConfig::default();
        config.lsi.num_topics = 0;
        assert!(config.validate().is_err());
    }
}
