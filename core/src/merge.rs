use crate::index::OffsetTable;
use crate::partial::PartialIndex;
use crate::persist::{staging_path, StoreWriter};
use crate::posting::apply_tf_idf;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Store generation for a new build: UTC time in nanoseconds.
pub fn new_generation() -> u64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64
}

/// Consolidate all fragments into one store at `store_path`.
///
/// Terms are merged one at a time in lexicographic order, weighted by
/// TF-IDF against `num_documents`, and appended to a staged store that is
/// renamed over `store_path` only once complete. Fragment files are deleted
/// as they are consumed; failing to delete them is logged and ignored.
pub fn merge(partial: &PartialIndex, num_documents: u32, store_path: &Path, generation: u64) -> Result<OffsetTable> {
    let staged = staging_path(store_path);
    let mut writer = StoreWriter::create(&staged, generation)?;
    let mut offsets = OffsetTable::new(generation);

    for (term, term_id) in partial.terms() {
        let mut posting = partial
            .read_fragments(term_id)
            .with_context(|| format!("merging fragments of `{term}`"))?;
        apply_tf_idf(&mut posting, num_documents);
        let offset = writer.append(term, &posting)?;
        offsets.offsets.insert(term.to_string(), offset);
        tracing::trace!(term, term_id, offset, df = posting.len(), "merged term");

        if let Err(e) = partial.remove_fragment(term_id) {
            tracing::warn!(term_id, error = %e, "could not delete merged fragment");
        }
    }

    writer.finish()?;
    fs::rename(&staged, store_path).with_context(|| format!("installing {}", store_path.display()))?;

    if let Err(e) = fs::remove_dir_all(partial.dir()) {
        tracing::warn!(dir = %partial.dir().display(), error = %e, "could not delete fragment directory");
    }
    tracing::info!(terms = offsets.len(), store = %store_path.display(), "merge complete");
    Ok(offsets)
}
