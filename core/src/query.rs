//! Query serving over a merged index.

use crate::config::IndexConfig;
use crate::index::{DocId, DocTable, OffsetTable, SignalTables};
use crate::persist::{
    load_doc_table, load_meta, load_offsets, load_signals, IndexPaths, MetaFile, StoreError, StoreReader, FORMAT_VERSION,
};
use crate::posting::Posting;
use crate::rank::{rank, Boosts};
use crate::tokenizer::analyze;
use anyhow::{ensure, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub const DEFAULT_CACHE_TERMS: usize = 4096;

/// Postings already read from the store, shared by concurrent queries.
///
/// Entries belong to one store generation. When full the cache is emptied
/// rather than evicting piecemeal.
pub struct PostingCache {
    capacity: usize,
    entries: Mutex<HashMap<String, Arc<Posting>>>,
}

impl PostingCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, term: &str) -> Option<Arc<Posting>> {
        self.entries.lock().get(term).cloned()
    }

    pub fn insert(&self, term: &str, posting: Arc<Posting>) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(term.to_string(), posting);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only view of one build: offset table, doc table, signal tables and store path.
pub struct SearchIndex {
    paths: IndexPaths,
    offsets: OffsetTable,
    docs: DocTable,
    signals: SignalTables,
    meta: MetaFile,
    boosts: Boosts,
    max_results: usize,
    cache: PostingCache,
}

impl SearchIndex {
    /// Load the tables written by the last build and check they match the store.
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let paths = config.paths();
        let offsets = load_offsets(&paths)?;
        let meta = load_meta(&paths)?;
        ensure!(meta.version == FORMAT_VERSION, "unsupported index format version {}", meta.version);
        ensure!(
            meta.generation == offsets.generation,
            "meta generation {} does not match offset table generation {}",
            meta.generation,
            offsets.generation
        );
        StoreReader::open(&paths.store(), &offsets)?;
        let docs = load_doc_table(&paths)?;
        let signals = load_signals(&paths)?;
        tracing::info!(documents = meta.num_docs, terms = offsets.len(), generation = meta.generation, "index opened");
        Ok(Self {
            paths,
            offsets,
            docs,
            signals,
            meta,
            boosts: Boosts { strong: config.strong_signal_boost, anchor: config.anchor_signal_boost },
            max_results: config.max_results,
            cache: PostingCache::new(DEFAULT_CACHE_TERMS),
        })
    }

    pub fn num_documents(&self) -> u32 {
        self.meta.num_docs
    }

    pub fn num_terms(&self) -> usize {
        self.offsets.len()
    }

    pub fn generation(&self) -> u64 {
        self.offsets.generation
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn doc_name(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(&doc_id).map(String::as_str)
    }

    pub fn cache(&self) -> &PostingCache {
        &self.cache
    }

    /// Postings for the distinct query terms, in first-occurrence order.
    ///
    /// Terms missing from the offset table are dropped. A store handle is
    /// opened only when some term has to be read from disk.
    fn resolve(&self, query_terms: &[String]) -> Result<HashMap<String, Arc<Posting>>, QueryError> {
        let mut seen = HashSet::new();
        let mut postings = HashMap::new();
        let mut missing = Vec::new();
        for term in query_terms.iter().filter(|t| seen.insert(t.as_str())) {
            match self.cache.get(term) {
                Some(p) => {
                    postings.insert(term.clone(), p);
                }
                None => {
                    if let Some(offset) = self.offsets.offset(term) {
                        missing.push((term, offset));
                    }
                }
            }
        }
        if missing.is_empty() {
            return Ok(postings);
        }

        let mut reader = StoreReader::open(&self.paths.store(), &self.offsets)?;
        for (term, offset) in missing {
            let posting = Arc::new(reader.read_at(offset, term)?);
            self.cache.insert(term, posting.clone());
            postings.insert(term.clone(), posting);
        }
        Ok(postings)
    }

    /// Ranked `(doc_id, score)` pairs for already analyzed terms, at most `limit` (capped by `max_results`).
    pub fn try_search_scored(&self, query_terms: &[String], limit: usize) -> Result<Vec<(DocId, f64)>, QueryError> {
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let postings = self.resolve(query_terms)?;
        Ok(rank(query_terms, &postings, &self.signals, self.boosts, limit.min(self.max_results)))
    }

    pub fn try_search(&self, query_terms: &[String]) -> Result<Vec<DocId>, QueryError> {
        let ranked = self.try_search_scored(query_terms, self.max_results)?;
        Ok(ranked.into_iter().map(|(doc, _)| doc).collect())
    }

    /// Like `try_search`, but failures are logged and yield no results.
    pub fn search(&self, query_terms: &[String]) -> Vec<DocId> {
        match self.try_search(query_terms) {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(error = %e, terms = ?query_terms, "query failed");
                Vec::new()
            }
        }
    }

    /// Analyze raw query text with the indexing tokenizer and search for it.
    pub fn search_text(&self, query: &str) -> Vec<DocId> {
        self.search(&analyze(query))
    }
}
