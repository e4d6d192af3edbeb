use serde::Serialize;
use std::collections::BTreeSet;

use crate::{DocId, Result, SearchError};

/// One ranked result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f64,
}

/// Order `sims` by score descending, drop `excluded` ids and keep `top_n`.
///
/// Ties break by ascending document id so rankings are reproducible.
pub fn rank(sims: &[f64], excluded: &BTreeSet<DocId>, top_n: usize) -> Vec<Hit> {
    let mut hits: Vec<Hit> = sims
        .iter()
        .enumerate()
        .map(|(i, &score)| Hit { doc_id: i as DocId, score })
        .filter(|hit| !excluded.contains(&hit.doc_id))
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    hits.truncate(top_n);
    hits
}

/// Elementwise sum of several similarity vectors, accumulated in list order.
pub fn aggregate(lists: &[Vec<f64>]) -> Result<Vec<f64>> {
    let Some(first) = lists.first() else {
        return Ok(Vec::new());
    };
    let mut total = vec![0.0; first.len()];
    for sims in lists {
        if sims.len() != total.len() {
            return Err(SearchError::DimensionMismatch {
                what: "aggregated similarity vector",
                expected: total.len(),
                actual: sims.len(),
            });
        }
        for (t, s) in total.iter_mut().zip(sims) {
            *t += s;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_descending_with_id_tiebreak() {
        let hits = rank(&[0.2, 0.9, 0.2, -0.5], &BTreeSet::new(), 10);
        let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![1, 0, 2, 3]);
    }

    #[test]
    fn excludes_and_truncates() {
        let excluded: BTreeSet<DocId> = [1].into_iter().collect();
        let hits = rank(&[0.2, 0.9, 0.3], &excluded, 1);
        assert_eq!(hits, vec![Hit { doc_id: 2, score: 0.3 }]);
        assert!(rank(&[0.1], &BTreeSet::new(), 0).is_empty());
    }

    #[test]
    fn aggregate_sums_elementwise() {
        let total = aggregate(&[vec![0.5, -0.25], vec![0.25, 1.0]]).unwrap();
        assert_eq!(total, vec![0.75, 0.75]);
        assert!(aggregate(&[]).unwrap().is_empty());
        assert!(aggregate(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
