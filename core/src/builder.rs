use crate::config::IndexConfig;
use crate::index::{DocId, DocTable, SignalTables};
use crate::merge::{merge, new_generation};
use crate::partial::PartialIndex;
use crate::persist::{save_doc_table, save_meta, save_offsets, save_signals, IndexPaths, MetaFile, FORMAT_VERSION};
use crate::posting::build_entries;
use crate::simhash::{fingerprint, NearDuplicateDetector};
use crate::source::{canonical_name, corpus_files, extract, read_pages, CrawledPage};
use crate::tokenizer::{analyze, checksum, TermHashes};
use anyhow::{ensure, Result};
use std::collections::{HashMap, HashSet};
use time::format_description::well_known::Rfc3339;

/// What happened to a document offered to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted(DocId),
    /// Canonical name already offered earlier in the run.
    DuplicateName,
    /// Same checksum as an earlier page.
    ExactDuplicate,
    /// Fingerprint within the Hamming threshold of an earlier page.
    NearDuplicate,
    /// No terms survived tokenization.
    Empty,
}

impl Acceptance {
    pub fn doc_id(self) -> Option<DocId> {
        match self {
            Acceptance::Accepted(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: u32,
    pub terms: u32,
}

/// All mutable state of one indexing run.
///
/// Documents must be offered sequentially: the first page wins every
/// duplicate decision. Dedup tables live only as long as the builder.
pub struct IndexBuilder {
    config: IndexConfig,
    paths: IndexPaths,
    num_documents: u32,
    docs: DocTable,
    /// Every canonical name offered so far, with its doc id once accepted.
    names: HashMap<String, Option<DocId>>,
    checksums: HashSet<u64>,
    term_hashes: TermHashes,
    detector: NearDuplicateDetector,
    partial: PartialIndex,
    signals: SignalTables,
    pending_anchors: Vec<(String, Vec<String>)>,
}

impl IndexBuilder {
    pub fn new(config: IndexConfig) -> Result<Self> {
        let config = config.sanitized();
        let paths = config.paths();
        std::fs::create_dir_all(&paths.root)?;
        let partial = PartialIndex::create(&paths.partial_dir())?;
        let detector = NearDuplicateDetector::new(config.near_duplicate_threshold, config.sim_hash_prefix_bits);
        Ok(Self {
            config,
            paths,
            num_documents: 0,
            docs: DocTable::new(),
            names: HashMap::new(),
            checksums: HashSet::new(),
            term_hashes: TermHashes::new(),
            detector,
            partial,
            signals: SignalTables::default(),
            pending_anchors: Vec::new(),
        })
    }

    pub fn num_documents(&self) -> u32 {
        self.num_documents
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Run dedup on a page's plain text and, if it survives, add it to the current batch.
    pub fn add_document(&mut self, name: &str, text: &str) -> Result<Acceptance> {
        let name = canonical_name(name);
        if self.names.contains_key(name) {
            return Ok(Acceptance::DuplicateName);
        }
        self.names.insert(name.to_string(), None);

        let terms = analyze(text);
        let Some(sum) = checksum(&terms) else {
            return Ok(Acceptance::Empty);
        };
        if !self.checksums.insert(sum.to_bits()) {
            return Ok(Acceptance::ExactDuplicate);
        }

        let hashes: Vec<u64> = terms.iter().map(|t| self.term_hashes.hash(t)).collect();
        if self.detector.check(fingerprint(hashes)) {
            return Ok(Acceptance::NearDuplicate);
        }

        let doc_id = self.num_documents;
        self.partial.add(doc_id, build_entries(&terms));
        self.docs.insert(doc_id, name.to_string());
        self.names.insert(name.to_string(), Some(doc_id));
        self.num_documents += 1;

        if self.num_documents as usize % self.config.batch_size == 0 {
            let terms = self.partial.flush()?;
            tracing::info!(documents = self.num_documents, terms, "batch written to partial index");
        }
        Ok(Acceptance::Accepted(doc_id))
    }

    /// Extract a crawled HTML page, index its body and remember its emphasis and link text.
    pub fn add_page(&mut self, page: &CrawledPage) -> Result<Acceptance> {
        let extracted = extract(&page.content, &page.url);
        let outcome = self.add_document(&page.url, &extracted.text)?;
        if let Acceptance::Accepted(doc_id) = outcome {
            for term in analyze(&extracted.emphasis) {
                self.signals.add_strong(&term, doc_id);
            }
            for (target, text) in extracted.anchors {
                let terms = analyze(&text);
                if !terms.is_empty() {
                    self.pending_anchors.push((target, terms));
                }
            }
        }
        Ok(outcome)
    }

    /// Flush the last batch, merge all fragments and persist every table.
    pub fn finish(mut self) -> Result<IndexStats> {
        if !self.partial.batch_is_empty() {
            let terms = self.partial.flush()?;
            tracing::info!(documents = self.num_documents, terms, "final batch written to partial index");
        }
        self.checksums.clear();
        self.term_hashes.clear();
        self.detector.clear();

        for (target, terms) in std::mem::take(&mut self.pending_anchors) {
            if let Some(&Some(doc_id)) = self.names.get(canonical_name(&target)) {
                for term in terms {
                    self.signals.add_anchor(&term, doc_id);
                }
            }
        }

        let generation = new_generation();
        tracing::info!(documents = self.num_documents, terms = self.partial.num_terms(), "merging partial index");
        let offsets = merge(&self.partial, self.num_documents, &self.paths.store(), generation)?;
        save_offsets(&self.paths, &offsets)?;
        save_doc_table(&self.paths, &self.docs)?;
        save_signals(&self.paths, &self.signals)?;
        let meta = MetaFile {
            num_docs: self.num_documents,
            num_terms: offsets.len() as u32,
            generation,
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into()),
            version: FORMAT_VERSION,
        };
        save_meta(&self.paths, &meta)?;

        Ok(IndexStats { documents: self.num_documents, terms: offsets.len() as u32 })
    }
}

/// Index every page under `config.input_dir` and write the merged index to `config.output_dir`.
pub fn build_index(config: &IndexConfig) -> Result<IndexStats> {
    ensure!(config.input_dir.is_dir(), "input directory {} does not exist", config.input_dir.display());
    let mut builder = IndexBuilder::new(config.clone())?;
    let mut offered = 0usize;
    for file in corpus_files(&config.input_dir) {
        let pages = match read_pages(&file) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable corpus file");
                continue;
            }
        };
        for page in &pages {
            offered += 1;
            let outcome = builder.add_page(page)?;
            tracing::debug!(url = %page.url, ?outcome, "page processed");
        }
    }
    tracing::info!(offered, accepted = builder.num_documents(), "finished reading corpus");
    let stats = builder.finish()?;
    tracing::info!(documents = stats.documents, terms = stats.terms, "index build complete");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::stem;

    fn builder(dir: &std::path::Path, batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(IndexConfig { output_dir: dir.to_path_buf(), batch_size, ..IndexConfig::default() }).unwrap()
    }

    #[test]
    fn rejections_do_not_consume_doc_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder(dir.path(), 10);
        assert_eq!(b.add_document("https://a/#x", "cat dog cat").unwrap(), Acceptance::Accepted(0));
        assert_eq!(b.add_document("https://a/", "bird fish").unwrap(), Acceptance::DuplicateName);
        assert_eq!(b.add_document("https://b/", "dog cat cat").unwrap(), Acceptance::ExactDuplicate);
        assert_eq!(b.add_document("https://c/", "! ? a").unwrap(), Acceptance::Empty);
        // "cat" outvotes the other term on every bit, so both fingerprints equal hash("cat")
        assert_eq!(b.add_document("https://e/", "cat cat cat bird").unwrap(), Acceptance::NearDuplicate);
        assert_eq!(b.add_document("https://d/", "dog bird").unwrap(), Acceptance::Accepted(1));
        assert_eq!(b.add_document("https://e/", "lamp desk").unwrap(), Acceptance::DuplicateName);
        assert_eq!(b.num_documents(), 2);
    }

    #[test]
    fn flushes_on_batch_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder(dir.path(), 2);
        b.add_document("https://a/", "alpha beta").unwrap();
        assert!(!b.partial.batch_is_empty());
        b.add_document("https://b/", "gamma delta epsilon").unwrap();
        assert!(b.partial.batch_is_empty());
        assert_eq!(b.partial.flushes(), 1);
    }

    #[test]
    fn anchor_text_credits_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder(dir.path(), 10);
        let linking = CrawledPage {
            url: "https://site.example/".into(),
            content: r#"<html><body><p>home page words</p><a href="/crabs">crustacean</a></body></html>"#.into(),
        };
        let target = CrawledPage {
            url: "https://site.example/crabs".into(),
            content: "<html><head><title>Crabs</title></head><body><p>sideways walking animals</p></body></html>".into(),
        };
        b.add_page(&linking).unwrap();
        b.add_page(&target).unwrap();
        let paths = b.paths().clone();
        b.finish().unwrap();

        let signals = crate::persist::load_signals(&paths).unwrap();
        assert!(signals.is_anchor(&stem("crustacean"), 1));
        assert!(signals.is_strong(&stem("crabs"), 1));
        assert!(!signals.is_strong(&stem("home"), 0));
    }
}
