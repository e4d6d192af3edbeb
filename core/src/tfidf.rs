use serde::{Deserialize, Serialize};

use crate::config::{Normalization, TfidfConfig};
use crate::sparse::SparseVector;
use crate::vocab::Vocabulary;
use crate::{Result, SearchError, WordId};

/// Global idf table plus the weighting scheme it was built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfModel {
    config: TfidfConfig,
    idfs: Vec<f64>,
}

impl TfidfModel {
    pub fn new(vocabulary: &Vocabulary, config: TfidfConfig) -> Self {
        let n = vocabulary.num_docs().max(1) as f64;
        let idfs = (0..vocabulary.len() as WordId)
            .map(|id| {
                let df = vocabulary.document_frequency(id).max(1) as f64;
                if config.smooth_idf {
                    (1.0 + n / df).ln()
                } else {
                    (n / df).ln()
                }
            })
            .collect();
        Self { config, idfs }
    }

    pub fn config(&self) -> TfidfConfig {
        self.config
    }

    pub fn num_terms(&self) -> usize {
        self.idfs.len()
    }

    pub fn idf(&self, id: WordId) -> f64 {
        self.idfs.get(id as usize).copied().unwrap_or(0.0)
    }

    /// Weight a single raw count.
    pub fn weight(&self, id: WordId, count: u32) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let tf = if self.config.sublinear_tf { 1.0 + (count as f64).ln() } else { count as f64 };
        tf * self.idf(id)
    }

    /// Bag of words -> weighted vector, normalized per the config.
    pub fn transform(&self, bow: &[(WordId, u32)]) -> Result<SparseVector> {
        if let Some(&(id, _)) = bow.iter().find(|&&(id, _)| id as usize >= self.idfs.len()) {
            return Err(SearchError::DimensionMismatch {
                what: "bag-of-words word id",
                expected: self.idfs.len(),
                actual: id as usize + 1,
            });
        }
        let vector = SparseVector::from_pairs(bow.iter().map(|&(id, count)| (id, self.weight(id, count))));
        Ok(match self.config.normalize {
            Normalization::L2 => vector.l2_normalized(),
            Normalization::None => vector,
        })
    }
}
