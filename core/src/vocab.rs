use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PruneConfig;
use crate::{Result, SearchError, WordId};

/// Frozen word <-> id mapping with document-frequency statistics.
///
/// Ids are dense `0..len()`. Words are case-folded on insertion and on lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VocabularyRecord")]
pub struct Vocabulary {
    words: Vec<String>,
    document_frequency: Vec<u32>,
    num_docs: u32,
    #[serde(skip)]
    ids: HashMap<String, WordId>,
}

#[derive(Deserialize)]
struct VocabularyRecord {
    words: Vec<String>,
    document_frequency: Vec<u32>,
    num_docs: u32,
}

impl TryFrom<VocabularyRecord> for Vocabulary {
    type Error = SearchError;

    fn try_from(record: VocabularyRecord) -> Result<Self> {
        Vocabulary::from_parts(record.words, record.document_frequency, record.num_docs)
    }
}

impl Vocabulary {
    /// Build from words in id order and their document frequencies.
    pub fn from_parts(words: Vec<String>, document_frequency: Vec<u32>, num_docs: u32) -> Result<Self> {
        if words.len() != document_frequency.len() {
            return Err(SearchError::DimensionMismatch {
                what: "vocabulary document frequencies",
                expected: words.len(),
                actual: document_frequency.len(),
            });
        }
        let mut ids = HashMap::with_capacity(words.len());
        let mut folded = Vec::with_capacity(words.len());
        for (id, word) in words.into_iter().enumerate() {
            let word = word.to_lowercase();
            if ids.insert(word.clone(), id as WordId).is_some() {
                return Err(SearchError::CorruptBundle(format!("duplicate vocabulary word '{word}'")));
            }
            folded.push(word);
        }
        Ok(Self { words: folded, document_frequency, num_docs, ids })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of documents the statistics were collected over.
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn lookup(&self, word: &str) -> Option<WordId> {
        match self.ids.get(word) {
            Some(&id) => Some(id),
            None => self.ids.get(&word.to_lowercase()).copied(),
        }
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    pub fn document_frequency(&self, id: WordId) -> u32 {
        self.document_frequency.get(id as usize).copied().unwrap_or(0)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Convert tokens to sorted `(word_id, count)` pairs. Unknown tokens are dropped.
    pub fn doc2bow<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<(WordId, u32)> {
        let mut counts: HashMap<WordId, u32> = HashMap::new();
        for token in tokens {
            if let Some(id) = self.lookup(token.as_ref()) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut bow: Vec<(WordId, u32)> = counts.into_iter().collect();
        bow.sort_unstable_by_key(|&(id, _)| id);
        bow
    }

    /// The `n` words found in the most documents, most frequent first.
    pub fn most_frequent(&self, n: usize) -> Vec<(&str, u32)> {
        let mut order: Vec<usize> = (0..self.words.len()).collect();
        order.sort_by(|&a, &b| self.document_frequency[b].cmp(&self.document_frequency[a]).then(a.cmp(&b)));
        order.into_iter().take(n).map(|i| (self.words[i].as_str(), self.document_frequency[i])).collect()
    }
}

/// Collects document frequencies while the corpus is scanned, then prunes
/// and freezes into a [`Vocabulary`].
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    words: Vec<String>,
    ids: HashMap<String, usize>,
    document_frequency: Vec<u32>,
    num_docs: u32,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document<S: AsRef<str>>(&mut self, tokens: &[S]) {
        self.num_docs += 1;
        let mut seen = vec![false; self.words.len()];
        for token in tokens {
            let word = token.as_ref().to_lowercase();
            let id = match self.ids.get(&word) {
                Some(&id) => id,
                None => {
                    let id = self.words.len();
                    self.ids.insert(word.clone(), id);
                    self.words.push(word);
                    self.document_frequency.push(0);
                    id
                }
            };
            if id >= seen.len() {
                seen.resize(id + 1, false);
            }
            if !seen[id] {
                seen[id] = true;
                self.document_frequency[id] += 1;
            }
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Number of distinct words before pruning.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Apply the prune policy and assign final ids in first-seen order.
    pub fn freeze(self, prune: &PruneConfig) -> Result<Vocabulary> {
        prune.validate()?;
        let max_df = (prune.no_above * self.num_docs as f64) as u32;
        let mut kept: Vec<usize> = (0..self.words.len())
            .filter(|&i| {
                let df = self.document_frequency[i];
                df >= prune.no_below && df <= max_df
            })
            .collect();
        if let Some(keep_n) = prune.keep_n {
            if kept.len() > keep_n {
                kept.sort_by(|&a, &b| self.document_frequency[b].cmp(&self.document_frequency[a]).then(a.cmp(&b)));
                kept.truncate(keep_n);
                kept.sort_unstable();
            }
        }
        tracing::info!(before = self.words.len(), after = kept.len(), num_docs = self.num_docs, "vocabulary frozen");

        let mut words = Vec::with_capacity(kept.len());
        let mut dfs = Vec::with_capacity(kept.len());
        let mut source_words = self.words;
        for i in kept {
            words.push(std::mem::take(&mut source_words[i]));
            dfs.push(self.document_frequency[i]);
        }
        Vocabulary::from_parts(words, dfs, self.num_docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets() -> Vocabulary {
        Vocabulary::from_parts(vec!["cat".into(), "dog".into(), "fish".into()], vec![2, 1, 1], 3).unwrap()
    }

    #[test]
    fn lookup_is_case_folded() {
        let v = pets();
        assert_eq!(v.lookup("Dog"), Some(1));
        assert_eq!(v.lookup("FISH"), Some(2));
        assert_eq!(v.lookup("bird"), None);
        assert_eq!(v.word(0), Some("cat"));
    }

    #[test]
    fn doc2bow_counts_and_drops_unknown() {
        let v = pets();
        let bow = v.doc2bow(&["dog", "cat", "bird", "DOG"]);
        assert_eq!(bow, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn duplicate_words_are_rejected() {
        let err = Vocabulary::from_parts(vec!["a".into(), "A".into()], vec![1, 1], 1);
        assert!(err.is_err());
    }

    #[test]
    fn freeze_prunes_and_keeps_first_seen_order() {
        let mut b = VocabularyBuilder::new();
        b.add_document(&["the", "cat", "sat"]);
        b.add_document(&["the", "dog", "sat", "sat"]);
        b.add_document(&["the", "cat", "ran"]);
        b.add_document(&["a", "cat"]);

        // "the" and "cat" are in 3/4 docs, above no_above=0.5; singletons fall below no_below=2.
        let v = b.freeze(&PruneConfig { no_below: 2, no_above: 0.5, keep_n: None }).unwrap();
        assert_eq!(v.words(), &["sat".to_string()]);
        assert_eq!(v.document_frequency(0), 2);
        assert_eq!(v.num_docs(), 4);
    }

    #[test]
    fn keep_n_prefers_frequent_words() {
        let mut b = VocabularyBuilder::new();
        b.add_document(&["x", "y", "z"]);
        b.add_document(&["z", "y"]);
        b.add_document(&["z"]);
        let v = b.freeze(&PruneConfig { no_below: 0, no_above: 1.0, keep_n: Some(2) }).unwrap();
        // y and z survive, still in first-seen order.
        assert_eq!(v.words(), &["y".to_string(), "z".to_string()]);
        assert_eq!(v.most_frequent(1), vec![("z", 3)]);
    }
}
