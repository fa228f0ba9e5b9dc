use crate::index::{DocId, SignalTables};
use crate::posting::Posting;
use std::collections::HashMap;
use std::sync::Arc;

/// Additive score bonus for a (term, document) pair found in a signal table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boosts {
    pub strong: f64,
    pub anchor: f64,
}

impl Default for Boosts {
    fn default() -> Self {
        Self { strong: 1.0, anchor: 0.5 }
    }
}

/// Boolean-AND ranking over the resolved postings of a query.
///
/// Only documents present in every posting survive. Each surviving document
/// scores the sum of its `tf_idf` over `query_terms` (repeats included) plus
/// the signal boosts. Ordered by score descending, then doc id ascending, and
/// cut to `limit`.
pub fn rank(
    query_terms: &[String],
    postings: &HashMap<String, Arc<Posting>>,
    signals: &SignalTables,
    boosts: Boosts,
    limit: usize,
) -> Vec<(DocId, f64)> {
    let Some(shortest) = postings.values().min_by_key(|p| p.len()) else {
        return Vec::new();
    };

    let mut scored: Vec<(DocId, f64)> = shortest
        .keys()
        .copied()
        .filter(|doc| postings.values().all(|p| p.contains_key(doc)))
        .map(|doc| {
            let mut score = 0.0;
            for term in query_terms {
                let Some(entry) = postings.get(term).and_then(|p| p.get(&doc)) else { continue };
                score += entry.tf_idf;
                if signals.is_strong(term, doc) {
                    score += boosts.strong;
                }
                if signals.is_anchor(term, doc) {
                    score += boosts.anchor;
                }
            }
            (doc, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::Entry;

    fn posting(weights: &[(DocId, f64)]) -> Arc<Posting> {
        Arc::new(
            weights
                .iter()
                .map(|&(doc, w)| (doc, Entry { frequency: 1, tf: 1.0, tf_idf: w, positions: vec![0] }))
                .collect(),
        )
    }

    fn terms(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn intersection_only() {
        let mut postings = HashMap::new();
        postings.insert("a".to_string(), posting(&[(0, 1.0), (1, 1.0), (2, 1.0)]));
        postings.insert("b".to_string(), posting(&[(1, 0.5), (2, 0.1), (3, 9.0)]));
        let ranked = rank(&terms(&["a", "b"]), &postings, &SignalTables::default(), Boosts::default(), 10);
        assert_eq!(ranked, vec![(1, 1.5), (2, 1.1)]);
    }

    #[test]
    fn ties_break_by_doc_id_and_limit_applies() {
        let mut postings = HashMap::new();
        postings.insert("a".to_string(), posting(&[(5, 1.0), (2, 1.0), (9, 3.0), (7, 1.0)]));
        let ranked = rank(&terms(&["a"]), &postings, &SignalTables::default(), Boosts::default(), 3);
        assert_eq!(ranked.iter().map(|r| r.0).collect::<Vec<_>>(), vec![9, 2, 5]);
    }

    #[test]
    fn signals_boost_scores() {
        let mut postings = HashMap::new();
        postings.insert("a".to_string(), posting(&[(0, 1.0), (1, 1.0)]));
        let mut signals = SignalTables::default();
        signals.add_anchor("a", 1);
        let ranked = rank(&terms(&["a"]), &postings, &signals, Boosts { strong: 1.0, anchor: 0.25 }, 10);
        assert_eq!(ranked, vec![(1, 1.25), (0, 1.0)]);
        signals.add_strong("a", 0);
        let ranked = rank(&terms(&["a"]), &postings, &signals, Boosts { strong: 1.0, anchor: 0.25 }, 10);
        assert_eq!(ranked, vec![(0, 2.0), (1, 1.25)]);
    }

    #[test]
    fn nothing_resolved_ranks_nothing() {
        let ranked = rank(&terms(&["a"]), &HashMap::new(), &SignalTables::default(), Boosts::default(), 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn repeated_query_terms_count_again() {
        let mut postings = HashMap::new();
        postings.insert("a".to_string(), posting(&[(0, 2.0)]));
        let ranked = rank(&terms(&["a", "a"]), &postings, &SignalTables::default(), Boosts::default(), 10);
        assert_eq!(ranked, vec![(0, 4.0)]);
    }
}
