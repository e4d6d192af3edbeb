use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lsi::TopicModel;
use crate::sparse::Corpus;
use crate::{DocId, Result, SearchError};

/// Topic-space vector of every corpus document, with cached norms.
///
/// Row `i` always corresponds to `Corpus[i]`. Built once; any change to the
/// corpus or the model requires a full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndexRecord")]
pub struct SimilarityIndex {
    vectors: Array2<f64>,
    norms: Vec<f64>,
}

#[derive(Deserialize)]
struct IndexRecord {
    vectors: Array2<f64>,
    norms: Vec<f64>,
}

impl TryFrom<IndexRecord> for SimilarityIndex {
    type Error = SearchError;

    fn try_from(r: IndexRecord) -> Result<Self> {
        let index = SimilarityIndex { vectors: r.vectors, norms: r.norms };
        index.validate()?;
        Ok(index)
    }
}

impl SimilarityIndex {
    pub fn build(corpus: &Corpus, model: &TopicModel) -> Result<Self> {
        if corpus.num_terms() != model.num_terms() {
            return Err(SearchError::DimensionMismatch {
                what: "corpus vocabulary size",
                expected: model.num_terms(),
                actual: corpus.num_terms(),
            });
        }
        let mut vectors = Array2::zeros((corpus.len(), model.num_topics()));
        vectors
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(corpus.docs().par_iter())
            .try_for_each(|(mut row, doc)| -> Result<()> {
                row.assign(&model.project_array(doc)?);
                Ok(())
            })?;
        let norms = vectors.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect();
        tracing::info!(num_docs = corpus.len(), num_topics = model.num_topics(), "similarity index built");
        Ok(Self { vectors, norms })
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_features(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vector(&self, doc_id: DocId) -> Result<ArrayView1<'_, f64>> {
        if doc_id as usize >= self.len() {
            return Err(SearchError::DocumentOutOfRange { doc_id, num_docs: self.len() });
        }
        Ok(self.vectors.row(doc_id as usize))
    }

    /// Cosine similarity of `query` against every row, in row order.
    ///
    /// Rows or queries with zero length score 0. Scores are clamped to [-1, 1].
    pub fn similarities(&self, query: &[f64]) -> Result<Vec<f64>> {
        if query.len() != self.num_features() {
            return Err(SearchError::DimensionMismatch {
                what: "query topic vector",
                expected: self.num_features(),
                actual: query.len(),
            });
        }
        let query = ArrayView1::from(query);
        let query_norm = query.dot(&query).sqrt();
        let dots = self.vectors.dot(&query);
        let sims = dots
            .iter()
            .zip(&self.norms)
            .map(|(&d, &n)| {
                let denom = n * query_norm;
                if denom == 0.0 {
                    0.0
                } else {
                    (d / denom).clamp(-1.0, 1.0)
                }
            })
            .collect();
        Ok(sims)
    }

    /// One cached norm per row.
    pub fn validate(&self) -> Result<()> {
        if self.norms.len() != self.vectors.nrows() {
            return Err(SearchError::DimensionMismatch {
                what: "similarity index norms",
                expected: self.vectors.nrows(),
                actual: self.norms.len(),
            });
        }
        Ok(())
    }
}
