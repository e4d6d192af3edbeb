use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::LsiConfig;
use crate::linalg::{orthonormalize_columns, symmetric_eigen};
use crate::sparse::{Corpus, SparseVector};
use crate::{Result, SearchError, WordId};

/// Latent semantic projection learned from the term-document matrix.
///
/// `projection` is the V×K matrix `U` of left singular vectors. Row `w` is the
/// direction of word `w` in topic space, so projecting a weighted vector is
/// `Σ weight(w) · U[w]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TopicModelRecord")]
pub struct TopicModel {
    num_terms: usize,
    num_topics: usize,
    projection: Array2<f64>,
    singular_values: Vec<f64>,
}

#[derive(Deserialize)]
struct TopicModelRecord {
    num_terms: usize,
    num_topics: usize,
    projection: Array2<f64>,
    singular_values: Vec<f64>,
}

impl TryFrom<TopicModelRecord> for TopicModel {
    type Error = SearchError;

    fn try_from(r: TopicModelRecord) -> Result<Self> {
        let model = TopicModel {
            num_terms: r.num_terms,
            num_topics: r.num_topics,
            projection: r.projection,
            singular_values: r.singular_values,
        };
        model.validate()?;
        Ok(model)
    }
}

impl TopicModel {
    /// Truncated SVD of the V×N weight matrix whose columns are the corpus documents.
    ///
    /// Randomized range finder with power iterations, then an exact
    /// eigen-decomposition of the small projected problem. Deterministic for a
    /// given seed.
    pub fn train(corpus: &Corpus, config: &LsiConfig) -> Result<Self> {
        config.validate()?;
        let num_terms = corpus.num_terms();
        let num_docs = corpus.len();
        let max_topics = num_terms.min(num_docs);
        let k = config.num_topics;
        if k > max_topics {
            return Err(SearchError::InvalidTopicCount { requested: k, max: max_topics });
        }
        let block = (k + config.oversample).min(max_topics);
        tracing::info!(num_docs, num_terms, num_topics = k, "training topic model");
        tracing::debug!(block, power_iters = config.power_iters, seed = config.seed, "range finder parameters");

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let omega: Array2<f64> = Array2::from_shape_fn((num_docs, block), |_| rng.gen_range(-1.0..1.0));

        let mut q = times_corpus(corpus, &omega);
        orthonormalize_columns(&mut q);
        for _ in 0..config.power_iters {
            let mut z = corpus_transpose_times(corpus, &q);
            orthonormalize_columns(&mut z);
            q = times_corpus(corpus, &z);
            orthonormalize_columns(&mut q);
        }

        // Qᵀ A Aᵀ Q is small (block × block); its eigenvectors rotate Q onto
        // the left singular vectors.
        let bt = corpus_transpose_times(corpus, &q);
        let (eigenvalues, eigenvectors) = symmetric_eigen(&bt.t().dot(&bt));
        tracing::debug!(?eigenvalues, "projected eigenvalues");

        let mut projection = q.dot(&eigenvectors.slice(s![.., ..k]));
        fix_signs(&mut projection);
        let singular_values = eigenvalues.iter().take(k).map(|&v| v.max(0.0).sqrt()).collect();

        Ok(Self { num_terms, num_topics: k, projection, singular_values })
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn singular_values(&self) -> &[f64] {
        &self.singular_values
    }

    /// Map a weighted vector (in or out of the corpus) into topic space.
    pub fn project(&self, vector: &SparseVector) -> Result<Vec<f64>> {
        Ok(self.project_array(vector)?.to_vec())
    }

    pub(crate) fn project_array(&self, vector: &SparseVector) -> Result<Array1<f64>> {
        vector.check_dimension(self.num_terms)?;
        let mut out = Array1::zeros(self.num_topics);
        for &(id, w) in vector.entries() {
            out.scaled_add(w, &self.projection.row(id as usize));
        }
        Ok(out)
    }

    /// Topic-space direction of a single word.
    pub fn word_topics(&self, id: WordId) -> Result<ArrayView1<'_, f64>> {
        if id as usize >= self.num_terms {
            return Err(SearchError::DimensionMismatch { what: "word id", expected: self.num_terms, actual: id as usize + 1 });
        }
        Ok(self.projection.row(id as usize))
    }

    /// The `n` words with the largest absolute weight in `topic`, with signed weights.
    pub fn topic_words(&self, topic: usize, n: usize) -> Vec<(WordId, f64)> {
        if topic >= self.num_topics {
            return Vec::new();
        }
        let mut words: Vec<(WordId, f64)> =
            self.projection.column(topic).iter().enumerate().map(|(w, &v)| (w as WordId, v)).collect();
        words.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then(a.0.cmp(&b.0)));
        words.truncate(n);
        words
    }

    /// Structural consistency after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.projection.nrows() != self.num_terms {
            return Err(SearchError::DimensionMismatch {
                what: "topic model projection rows",
                expected: self.num_terms,
                actual: self.projection.nrows(),
            });
        }
        if self.projection.ncols() != self.num_topics {
            return Err(SearchError::DimensionMismatch {
                what: "topic model projection columns",
                expected: self.num_topics,
                actual: self.projection.ncols(),
            });
        }
        if self.singular_values.len() != self.num_topics {
            return Err(SearchError::DimensionMismatch {
                what: "topic model singular values",
                expected: self.num_topics,
                actual: self.singular_values.len(),
            });
        }
        Ok(())
    }
}

/// `A · m` for the V×N corpus matrix and an N×l dense `m`.
fn times_corpus(corpus: &Corpus, m: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((corpus.num_terms(), m.ncols()));
    for (doc, src) in corpus.iter().zip(m.rows()) {
        for &(id, w) in doc.entries() {
            out.row_mut(id as usize).scaled_add(w, &src);
        }
    }
    out
}

/// `Aᵀ · m` for the V×N corpus matrix and a V×l dense `m`.
fn corpus_transpose_times(corpus: &Corpus, m: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((corpus.len(), m.ncols()));
    out.axis_iter_mut(Axis(0)).into_par_iter().zip(corpus.docs().par_iter()).for_each(|(mut row, doc)| {
        for &(id, w) in doc.entries() {
            row.scaled_add(w, &m.row(id as usize));
        }
    });
    out
}

/// Flip each column so its largest-magnitude entry is positive.
fn fix_signs(m: &mut Array2<f64>) {
    for mut col in m.columns_mut() {
        let pivot = col.iter().fold(0.0f64, |p, &v| if v.abs() > p.abs() { v } else { p });
        if pivot < 0.0 {
            col.mapv_inplace(|v| -v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::cosine;

    fn pets() -> Corpus {
        Corpus::new(
            3,
            vec![
                SparseVector::from_pairs(vec![(0, 1.0)]),
                SparseVector::from_pairs(vec![(0, 0.5), (1, 1.0)]),
                SparseVector::from_pairs(vec![(2, 1.0)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_too_many_topics() {
        let err = TopicModel::train(&pets(), &LsiConfig::with_topics(4)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidTopicCount { requested: 4, max: 3 }));
    }

    #[test]
    fn recovers_singular_values() {
        let model = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        let disc = (2.25f64 * 2.25 - 4.0).sqrt();
        let top = ((2.25 + disc) / 2.0).sqrt();
        assert!((model.singular_values()[0] - top).abs() < 1e-9);
        assert!((model.singular_values()[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn projection_columns_are_orthonormal() {
        let model = TopicModel::train(&pets(), &LsiConfig::with_topics(3)).unwrap();
        let gram = model.projection.t().dot(&model.projection);
        for ((a, b), &d) in gram.indexed_iter() {
            let expected = if a == b { 1.0 } else { 0.0 };
            assert!((d - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn shared_words_stay_close_in_topic_space() {
        let corpus = pets();
        let model = TopicModel::train(&corpus, &LsiConfig::with_topics(2)).unwrap();
        let p: Vec<Vec<f64>> = corpus.iter().map(|d| model.project(d).unwrap()).collect();
        assert!(cosine(&p[0], &p[1]) > 0.99);
        assert!(cosine(&p[0], &p[2]).abs() < 1e-6);
    }

    #[test]
    fn training_is_deterministic() {
        let a = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        let b = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deserializing_rechecks_shape() {
        let model = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        let bytes = bincode::serialize(&model).unwrap();
        assert_eq!(bincode::deserialize::<TopicModel>(&bytes).unwrap(), model);
        // Two topics but a single singular value.
        let short = bincode::serialize(&(3u64, 2u64, (1u8, (3u64, 2u64), vec![0.0f64; 6]), vec![1.0f64])).unwrap();
        assert!(bincode::deserialize::<TopicModel>(&short).is_err());
    }

    #[test]
    fn project_rejects_foreign_ids() {
        let model = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        assert!(model.project(&SparseVector::from_pairs(vec![(5, 1.0)])).is_err());
    }

    #[test]
    fn topic_words_rank_by_magnitude() {
        let model = TopicModel::train(&pets(), &LsiConfig::with_topics(2)).unwrap();
        // First topic is the cat/dog direction; cat loads heaviest.
        let words = model.topic_words(0, 2);
        assert_eq!(words[0].0, 0);
        assert_eq!(words[1].0, 1);
        assert!(words[0].1 > 0.0);
    }
}
