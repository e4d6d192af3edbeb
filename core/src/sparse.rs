use serde::{Deserialize, Serialize};

use crate::{DocId, Result, SearchError, WordId};

/// Weighted bag of words: `(word_id, weight)` pairs sorted by id.
///
/// Ids are unique and zero weights are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseVectorRecord")]
pub struct SparseVector {
    entries: Vec<(WordId, f64)>,
}

#[derive(Deserialize)]
struct SparseVectorRecord {
    entries: Vec<(WordId, f64)>,
}

impl TryFrom<SparseVectorRecord> for SparseVector {
    type Error = SearchError;

    fn try_from(record: SparseVectorRecord) -> Result<Self> {
        SparseVector::from_sorted(record.entries)
    }
}

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary pairs. Repeated ids are summed, zeros dropped.
    pub fn from_pairs<I: IntoIterator<Item = (WordId, f64)>>(pairs: I) -> Self {
        let mut entries: Vec<(WordId, f64)> = pairs.into_iter().collect();
        entries.sort_by_key(|&(id, _)| id);
        let mut merged: Vec<(WordId, f64)> = Vec::with_capacity(entries.len());
        for (id, w) in entries {
            match merged.last_mut() {
                Some(last) if last.0 == id => last.1 += w,
                _ => merged.push((id, w)),
            }
        }
        merged.retain(|&(_, w)| w != 0.0);
        Self { entries: merged }
    }

    /// Take pairs that already hold the invariants: ids strictly increasing,
    /// weights finite and nonzero.
    pub fn from_sorted(entries: Vec<(WordId, f64)>) -> Result<Self> {
        if let Some(pair) = entries.windows(2).find(|p| p[0].0 >= p[1].0) {
            return Err(SearchError::CorruptBundle(format!(
                "sparse vector ids out of order: {} then {}",
                pair[0].0, pair[1].0
            )));
        }
        if let Some(&(id, w)) = entries.iter().find(|&&(_, w)| w == 0.0 || !w.is_finite()) {
            return Err(SearchError::CorruptBundle(format!("sparse vector weight {w} stored for word {id}")));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(WordId, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Word ids with nonzero weight, ascending.
    pub fn support(&self) -> impl Iterator<Item = WordId> + '_ {
        self.entries.iter().map(|&(id, _)| id)
    }

    pub fn contains(&self, id: WordId) -> bool {
        self.entries.binary_search_by_key(&id, |&(i, _)| i).is_ok()
    }

    pub fn get(&self, id: WordId) -> f64 {
        match self.entries.binary_search_by_key(&id, |&(i, _)| i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    pub fn norm(&self) -> f64 {
        self.entries.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// Largest id + 1, i.e. the smallest vocabulary this vector fits in.
    pub fn dimension(&self) -> usize {
        self.entries.last().map(|&(id, _)| id as usize + 1).unwrap_or(0)
    }

    /// Fail if any id falls outside a vocabulary of `num_terms` words.
    pub fn check_dimension(&self, num_terms: usize) -> Result<()> {
        let dim = self.dimension();
        if dim > num_terms {
            return Err(SearchError::DimensionMismatch { what: "sparse vector word id", expected: num_terms, actual: dim });
        }
        Ok(())
    }

    /// Scale to unit length. A zero vector stays zero.
    pub fn l2_normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, w) in self.entries.iter_mut() {
                *w /= norm;
            }
        }
        self
    }
}

/// The weighted corpus: document id = position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CorpusRecord")]
pub struct Corpus {
    num_terms: usize,
    docs: Vec<SparseVector>,
}

#[derive(Deserialize)]
struct CorpusRecord {
    num_terms: usize,
    docs: Vec<SparseVector>,
}

impl TryFrom<CorpusRecord> for Corpus {
    type Error = SearchError;

    fn try_from(record: CorpusRecord) -> Result<Self> {
        Corpus::new(record.num_terms, record.docs)
    }
}

impl Corpus {
    /// Every document must fit in a vocabulary of `num_terms` words.
    pub fn new(num_terms: usize, docs: Vec<SparseVector>) -> Result<Self> {
        for doc in &docs {
            doc.check_dimension(num_terms)?;
        }
        Ok(Self { num_terms, docs })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn get(&self, doc_id: DocId) -> Result<&SparseVector> {
        self.docs
            .get(doc_id as usize)
            .ok_or(SearchError::DocumentOutOfRange { doc_id, num_docs: self.docs.len() })
    }

    /// tf-idf weight of `word_id` in `doc_id`, zero when absent.
    pub fn weight(&self, doc_id: DocId, word_id: WordId) -> Result<f64> {
        Ok(self.get(doc_id)?.get(word_id))
    }

    pub fn docs(&self) -> &[SparseVector] {
        &self.docs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SparseVector> {
        self.docs.iter()
    }

    /// Number of stored (nonzero) weights across all documents.
    pub fn nnz(&self) -> usize {
        self.docs.iter().map(SparseVector::len).sum()
    }
}
