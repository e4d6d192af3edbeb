//! Per-word attribution of a topic-space cosine similarity.
//!
//! The topic vector of a document is `Σ wᵢ · U[wordᵢ]`, so splitting the dot
//! product by word and dividing by both norms gives contributions that sum
//! exactly to the cosine between the two documents.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lsi::TopicModel;
use crate::sparse::SparseVector;
use crate::vocab::Vocabulary;
use crate::{Result, WordId};

/// Contribution of every word of `v1` to `cosine(project(v1), project(v2))`,
/// sorted largest first (ties by word id).
///
/// If either projection has zero length every contribution is zero.
pub fn word_contributions(model: &TopicModel, v1: &SparseVector, v2: &SparseVector) -> Result<Vec<(WordId, f64)>> {
    let t1 = model.project_array(v1)?;
    let t2 = model.project_array(v2)?;
    let denom = t1.dot(&t1).sqrt() * t2.dot(&t2).sqrt();

    let mut contributions = Vec::with_capacity(v1.len());
    for &(id, w) in v1.entries() {
        let c = if denom == 0.0 { 0.0 } else { w * model.word_topics(id)?.dot(&t2) / denom };
        contributions.push((id, c));
    }
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(contributions)
}

/// Display thresholds for a contribution table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainOptions {
    /// Rows to show at most.
    pub top_n: usize,
    /// Positive words must contribute more than this.
    pub min_pos: f64,
    /// Negative words must contribute less than this.
    pub max_neg: f64,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self { top_n: 10, min_pos: 0.1, max_neg: -0.01 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordContribution {
    pub word_id: WordId,
    pub word: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionRow {
    pub positive: Option<WordContribution>,
    pub negative: Option<WordContribution>,
}

/// Strongest positive and negative words side by side.
///
/// Row `i` pairs the i-th largest contribution with the i-th smallest; each
/// side is shown only if it passes its own threshold. The table ends at the
/// first row where neither side passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContributionTable {
    pub rows: Vec<ContributionRow>,
}

impl ContributionTable {
    /// `sorted` must be ordered largest first, as returned by [`word_contributions`].
    pub fn build(sorted: &[(WordId, f64)], vocabulary: &Vocabulary, options: &ExplainOptions) -> Self {
        let entry = |&(word_id, contribution): &(WordId, f64)| WordContribution {
            word_id,
            word: vocabulary.word(word_id).unwrap_or_default().to_string(),
            contribution,
        };
        let mut rows = Vec::new();
        for i in 0..options.top_n.min(sorted.len()) {
            let pos = &sorted[i];
            let neg = &sorted[sorted.len() - 1 - i];
            let show_pos = pos.1 > options.min_pos;
            let show_neg = neg.1 < options.max_neg;
            if !show_pos && !show_neg {
                break;
            }
            rows.push(ContributionRow {
                positive: show_pos.then(|| entry(pos)),
                negative: show_neg.then(|| entry(neg)),
            });
        }
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ContributionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            match &row.positive {
                Some(p) => write!(f, "  {:>15}  +{:.3}", p.word, p.contribution)?,
                None => write!(f, "{:25}", "")?,
            }
            if let Some(n) = &row.negative {
                write!(f, "    {:>15}  {:.3}", n.word, n.contribution)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Why two documents match: one table per document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Total cosine similarity being explained.
    pub similarity: f64,
    pub doc1: ContributionTable,
    pub doc2: ContributionTable,
}

impl Explanation {
    pub fn build(
        model: &TopicModel,
        vocabulary: &Vocabulary,
        v1: &SparseVector,
        v2: &SparseVector,
        options: &ExplainOptions,
    ) -> Result<Self> {
        let c1 = word_contributions(model, v1, v2)?;
        let c2 = word_contributions(model, v2, v1)?;
        let similarity = c1.iter().map(|&(_, c)| c).sum::<f64>().clamp(-1.0, 1.0);
        Ok(Self {
            similarity,
            doc1: ContributionTable::build(&c1, vocabulary, options),
            doc2: ContributionTable::build(&c2, vocabulary, options),
        })
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Words in doc 1 which contribute most to similarity:")?;
        writeln!(f, "{}", self.doc1)?;
        writeln!(f, "Words in doc 2 which contribute most to similarity:")?;
        write!(f, "{}", self.doc2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LsiConfig;
    use crate::linalg::cosine;
    use crate::sparse::Corpus;

    fn setup() -> (Vocabulary, Corpus, TopicModel) {
        let vocab = Vocabulary::from_parts(
            vec!["cat".into(), "dog".into(), "fish".into(), "bird".into()],
            vec![2, 2, 1, 1],
            4,
        )
        .unwrap();
        let corpus = Corpus::new(
            4,
            vec![
                SparseVector::from_pairs(vec![(0, 0.8), (1, 0.6)]),
                SparseVector::from_pairs(vec![(0, 0.6), (1, 0.3), (3, 0.7)]),
                SparseVector::from_pairs(vec![(2, 1.0)]),
                SparseVector::from_pairs(vec![(1, 0.5), (2, 0.5), (3, 0.5)]),
            ],
        )
        .unwrap();
        let model = TopicModel::train(&corpus, &LsiConfig::with_topics(3)).unwrap();
        (vocab, corpus, model)
    }

    #[test]
    fn contributions_sum_to_cosine() {
        let (_, corpus, model) = setup();
        for a in corpus.iter() {
            for b in corpus.iter() {
                let total: f64 = word_contributions(&model, a, b).unwrap().iter().map(|&(_, c)| c).sum();
                let expected = cosine(&model.project(a).unwrap(), &model.project(b).unwrap());
                assert!((total - expected).abs() < 1e-9, "{total} vs {expected}");
            }
        }
    }

    #[test]
    fn zero_vector_explains_to_zero() {
        let (_, corpus, model) = setup();
        let empty = SparseVector::new();
        let c = word_contributions(&model, corpus.get(0).unwrap(), &empty).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.iter().all(|&(_, v)| v == 0.0));
    }

    #[test]
    fn table_thresholds_each_side_independently() {
        let (vocab, _, _) = setup();
        let sorted = vec![(0, 0.5), (1, 0.05), (3, -0.005), (2, -0.3)];
        let table = ContributionTable::build(&sorted, &vocab, &ExplainOptions::default());
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].positive.as_ref().map(|p| p.word.as_str()), Some("cat"));
        assert_eq!(table.rows[0].negative.as_ref().map(|n| n.word.as_str()), Some("fish"));

        let only_negative = vec![(0, 0.05), (2, -0.3)];
        let table = ContributionTable::build(&only_negative, &vocab, &ExplainOptions::default());
        assert_eq!(table.rows.len(), 1);
        assert!(table.rows[0].positive.is_none());
        let text = table.to_string();
        assert_eq!(text, format!("{:25}    {:>15}  -0.300\n", "", "fish"));
    }

    #[test]
    fn table_formats_positive_words() {
        let (vocab, _, _) = setup();
        let table = ContributionTable::build(&[(1, 0.44)], &vocab, &ExplainOptions::default());
        assert_eq!(table.to_string(), format!("  {}dog  +0.440\n", " ".repeat(12)));
    }
}
