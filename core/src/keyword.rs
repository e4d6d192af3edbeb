use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::{Outcome, Warning};
use crate::sparse::Corpus;
use crate::vocab::Vocabulary;
use crate::{DocId, Result, WordId};

/// Boolean word-presence constraints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordQuery {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Candidate documents; the whole corpus when `None`.
    #[serde(default)]
    pub docs: Option<Vec<DocId>>,
}

impl KeywordQuery {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
            docs: None,
        }
    }

    pub fn within(mut self, docs: Vec<DocId>) -> Self {
        self.docs = Some(docs);
        self
    }
}

/// Documents whose support has every known include word and no exclude word.
///
/// Unknown include words impose no constraint and are reported; unknown exclude
/// words can never match and are reported too. Linear scan over the candidates.
pub fn keyword_search(vocabulary: &Vocabulary, corpus: &Corpus, query: &KeywordQuery) -> Result<Outcome<BTreeSet<DocId>>> {
    let mut warnings = Vec::new();
    let include = resolve(vocabulary, &query.include, &mut warnings, Warning::UnknownIncludeWord);
    let exclude = resolve(vocabulary, &query.exclude, &mut warnings, Warning::UnknownExcludeWord);

    let candidates: Vec<DocId> = match &query.docs {
        Some(docs) => docs.clone(),
        None => (0..corpus.len() as DocId).collect(),
    };

    let mut matches = BTreeSet::new();
    for doc_id in candidates {
        let vector = corpus.get(doc_id)?;
        if include.iter().all(|&id| vector.contains(id)) && !exclude.iter().any(|&id| vector.contains(id)) {
            matches.insert(doc_id);
        }
    }
    tracing::debug!(include = ?query.include, exclude = ?query.exclude, matches = matches.len(), "keyword search");
    Ok(Outcome::with_warnings(matches, warnings))
}

fn resolve(vocabulary: &Vocabulary, words: &[String], warnings: &mut Vec<Warning>, warn: fn(String) -> Warning) -> Vec<WordId> {
    let mut ids = Vec::with_capacity(words.len());
    for word in words {
        match vocabulary.lookup(word) {
            Some(id) => ids.push(id),
            None => {
                tracing::warn!(word = %word, "keyword not in dictionary");
                warnings.push(warn(word.to_lowercase()));
            }
        }
    }
    ids
}
