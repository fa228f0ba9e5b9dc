use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type TermId = u32;
pub type DocId = u32;

/// doc_id -> canonical document name (URL without fragment).
pub type DocTable = BTreeMap<DocId, String>;

/// Byte offset of every merged term record inside the posting store.
///
/// `generation` must equal the generation written in the store header; a
/// mismatch means the table and the store come from different builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetTable {
    pub generation: u64,
    pub offsets: BTreeMap<String, u64>,
}

impl OffsetTable {
    pub fn new(generation: u64) -> Self {
        Self { generation, offsets: BTreeMap::new() }
    }

    pub fn offset(&self, term: &str) -> Option<u64> {
        self.offsets.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Terms that appear in high-emphasis positions of a document.
///
/// `strong` holds terms from the document's own title/headings/bold text,
/// `anchor` holds terms from link text pointing at the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalTables {
    pub strong: HashMap<String, BTreeSet<DocId>>,
    pub anchor: HashMap<String, BTreeSet<DocId>>,
}

impl SignalTables {
    pub fn add_strong(&mut self, term: &str, doc_id: DocId) {
        self.strong.entry(term.to_string()).or_default().insert(doc_id);
    }

    pub fn add_anchor(&mut self, term: &str, doc_id: DocId) {
        self.anchor.entry(term.to_string()).or_default().insert(doc_id);
    }

    pub fn is_strong(&self, term: &str, doc_id: DocId) -> bool {
        self.strong.get(term).is_some_and(|docs| docs.contains(&doc_id))
    }

    pub fn is_anchor(&self, term: &str, doc_id: DocId) -> bool {
        self.anchor.get(term).is_some_and(|docs| docs.contains(&doc_id))
    }
}
