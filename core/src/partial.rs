//! Batched, append-only per-term fragment files.

use crate::index::{DocId, TermId};
use crate::persist::bounded;
use crate::posting::{Entry, Posting};
use anyhow::{Context, Result};
use bincode::Options;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

/// In-memory batch plus the dense term ids naming its fragment files.
///
/// Each flush appends one encoded `Posting` per touched term to
/// `<dir>/<term_id>`. Batches hold disjoint doc ids, so the fragments of a
/// term never overlap.
pub struct PartialIndex {
    dir: PathBuf,
    term_ids: BTreeMap<String, TermId>,
    batch: HashMap<TermId, Posting>,
    flushes: usize,
}

impl PartialIndex {
    /// Start with an empty fragment directory, discarding leftovers from earlier runs.
    pub fn create(dir: &Path) -> Result<Self> {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("clearing {}", dir.display()))?;
        }
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf(), term_ids: BTreeMap::new(), batch: HashMap::new(), flushes: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.term_ids.get(term).copied()
    }

    /// Every term seen this run with its id, in lexicographic order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, TermId)> {
        self.term_ids.iter().map(|(t, &id)| (t.as_str(), id))
    }

    pub fn num_terms(&self) -> usize {
        self.term_ids.len()
    }

    pub fn batch_is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn intern(&mut self, term: &str) -> TermId {
        if let Some(&id) = self.term_ids.get(term) {
            return id;
        }
        let id = self.term_ids.len() as TermId;
        self.term_ids.insert(term.to_string(), id);
        id
    }

    /// Add an accepted document's entries to the current batch.
    pub fn add(&mut self, doc_id: DocId, entries: BTreeMap<String, Entry>) {
        for (term, entry) in entries {
            let id = self.intern(&term);
            self.batch.entry(id).or_default().insert(doc_id, entry);
        }
    }

    pub fn fragment_path(&self, term_id: TermId) -> PathBuf {
        self.dir.join(term_id.to_string())
    }

    /// Append the batch to the fragment files and clear it. Returns the number of terms written.
    pub fn flush(&mut self) -> Result<usize> {
        let touched = self.batch.len();
        for (term_id, posting) in self.batch.drain() {
            let path = self.dir.join(term_id.to_string());
            let f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening fragment {}", path.display()))?;
            let mut out = BufWriter::new(f);
            bincode::serialize_into(&mut out, &posting)?;
            out.flush()?;
        }
        self.flushes += 1;
        tracing::debug!(terms = touched, flush = self.flushes, "flushed partial batch");
        Ok(touched)
    }

    /// Union every fragment appended for `term_id`.
    ///
    /// Reading stops at the first fragment that does not decode; whatever was
    /// read before it is kept.
    pub fn read_fragments(&self, term_id: TermId) -> Result<Posting> {
        let path = self.fragment_path(term_id);
        let f = File::open(&path).with_context(|| format!("opening fragment {}", path.display()))?;
        let len = f.metadata()?.len();
        let mut reader = BufReader::new(f);
        let mut merged = Posting::new();
        loop {
            let pos = reader.stream_position()?;
            if pos >= len {
                break;
            }
            match bounded(len - pos).deserialize_from::<_, Posting>(&mut reader) {
                Ok(fragment) => merged.extend(fragment),
                Err(e) => {
                    tracing::warn!(path = %path.display(), offset = pos, error = %e, "truncated fragment; keeping earlier batches");
                    break;
                }
            }
        }
        Ok(merged)
    }

    pub fn remove_fragment(&self, term_id: TermId) -> std::io::Result<()> {
        fs::remove_file(self.fragment_path(term_id))
    }
}
