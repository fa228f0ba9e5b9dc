use crate::index::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (term, document) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub frequency: u32,
    /// 1 + log10(frequency)
    pub tf: f64,
    /// Filled in by the merger; 0 before that.
    pub tf_idf: f64,
    /// Token offsets in order of appearance; `positions.len() == frequency`.
    pub positions: Vec<u32>,
}

impl Entry {
    fn empty() -> Self {
        Self { frequency: 0, tf: 0.0, tf_idf: 0.0, positions: Vec::new() }
    }

    fn push(&mut self, position: u32) {
        self.frequency += 1;
        self.positions.push(position);
    }
}

/// doc_id -> entry for a single term.
pub type Posting = BTreeMap<DocId, Entry>;

pub fn tf(frequency: u32) -> f64 {
    if frequency > 0 {
        1.0 + (frequency as f64).log10()
    } else {
        0.0
    }
}

/// Build one entry per distinct term of an accepted document.
pub fn build_entries<S: AsRef<str>>(terms: &[S]) -> BTreeMap<String, Entry> {
    let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
    for (pos, term) in terms.iter().enumerate() {
        let term = term.as_ref();
        match entries.get_mut(term) {
            Some(e) => e.push(pos as u32),
            None => {
                let mut e = Entry::empty();
                e.push(pos as u32);
                entries.insert(term.to_string(), e);
            }
        }
    }
    for e in entries.values_mut() {
        e.tf = tf(e.frequency);
    }
    entries
}

/// Weight every entry of a fully merged posting by inverse document frequency.
pub fn apply_tf_idf(posting: &mut Posting, num_documents: u32) {
    let df = posting.len();
    if df == 0 {
        return;
    }
    let idf = if num_documents > 0 {
        (num_documents as f64 / df as f64).log10()
    } else {
        0.0
    };
    for entry in posting.values_mut() {
        entry.tf_idf = if entry.tf != 0.0 && num_documents != 0 { entry.tf * idf } else { 0.0 };
    }
}
