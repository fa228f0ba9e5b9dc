use crate::{DocTable, OffsetTable, Posting, SignalTables};
use anyhow::{Context, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const STORE_MAGIC: [u8; 8] = *b"SIEVEIDX";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub generation: u64,
    pub created_at: String,
    pub version: u32,
}

/// First record of every posting store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub magic: [u8; 8],
    pub generation: u64,
}

impl StoreHeader {
    pub fn new(generation: u64) -> Self {
        Self { magic: STORE_MAGIC, generation }
    }
}

#[derive(Serialize)]
pub(crate) struct RecordRef<'a> {
    pub term: &'a str,
    pub posting: &'a Posting,
}

#[derive(Deserialize)]
struct Record {
    term: String,
    posting: Posting,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("{} is not a posting store", path.display())]
    BadMagic { path: PathBuf },
    #[error("store generation {store} does not match offset table generation {table}")]
    GenerationMismatch { store: u64, table: u64 },
    #[error("corrupt record for `{term}` at offset {offset}: {reason}")]
    Corrupt { term: String, offset: u64, reason: String },
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
    store_file: String,
    offsets_file: String,
    partial_dir: String,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            store_file: "index.bin".into(),
            offsets_file: "offsets.bin".into(),
            partial_dir: "partial".into(),
        }
    }
    pub fn with_store_file(mut self, name: &str) -> Self { self.store_file = name.into(); self }
    pub fn with_offsets_file(mut self, name: &str) -> Self { self.offsets_file = name.into(); self }
    pub fn with_partial_dir(mut self, name: &str) -> Self { self.partial_dir = name.into(); self }

    pub fn store(&self) -> PathBuf { self.root.join(&self.store_file) }
    pub fn offsets(&self) -> PathBuf { self.root.join(&self.offsets_file) }
    pub fn partial_dir(&self) -> PathBuf { self.root.join(&self.partial_dir) }
    pub fn doc_ids(&self) -> PathBuf { self.root.join("doc_ids.bin") }
    pub fn signals(&self) -> PathBuf { self.root.join("signals.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Path a file is staged under before being renamed over `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write through a staging file and rename, so readers see either the old or the new file.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let tmp = staging_path(path);
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    replace_file(path, &bytes)
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let value = bincode::deserialize(&buf).with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}

pub fn save_doc_table(paths: &IndexPaths, docs: &DocTable) -> Result<()> {
    save_bin(&paths.doc_ids(), docs)
}

pub fn load_doc_table(paths: &IndexPaths) -> Result<DocTable> {
    load_bin(&paths.doc_ids())
}

pub fn save_offsets(paths: &IndexPaths, offsets: &OffsetTable) -> Result<()> {
    save_bin(&paths.offsets(), offsets)
}

pub fn load_offsets(paths: &IndexPaths) -> Result<OffsetTable> {
    load_bin(&paths.offsets())
}

pub fn save_signals(paths: &IndexPaths, signals: &SignalTables) -> Result<()> {
    save_bin(&paths.signals(), signals)
}

pub fn load_signals(paths: &IndexPaths) -> Result<SignalTables> {
    load_bin(&paths.signals())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    replace_file(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Append-only writer for the merged posting store.
pub(crate) struct StoreWriter {
    out: BufWriter<File>,
    position: u64,
}

impl StoreWriter {
    pub fn create(path: &Path, generation: u64) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = Self { out: BufWriter::new(f), position: 0 };
        writer.write_bytes(&bincode::serialize(&StoreHeader::new(generation))?)?;
        Ok(writer)
    }

    /// Append one record and return the offset it starts at.
    pub fn append(&mut self, term: &str, posting: &Posting) -> Result<u64> {
        let offset = self.position;
        let bytes = bincode::serialize(&RecordRef { term, posting })?;
        self.write_bytes(&bytes)?;
        Ok(offset)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let f = self.out.into_inner().map_err(|e| e.into_error())?;
        f.sync_all()?;
        Ok(())
    }
}

/// Decoding options matching `bincode::serialize`, bounded to `limit` bytes so a
/// garbage length prefix fails instead of allocating.
pub(crate) fn bounded(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

/// Random-access reader over a merged store. One per query.
pub struct StoreReader {
    reader: BufReader<File>,
    len: u64,
    generation: u64,
}

impl StoreReader {
    /// Open `path` and check it was built together with `offsets`.
    pub fn open(path: &Path, offsets: &OffsetTable) -> Result<Self, StoreError> {
        let f = File::open(path)?;
        let len = f.metadata()?.len();
        let mut reader = BufReader::new(f);
        let header: StoreHeader = bounded(len)
            .deserialize_from(&mut reader)
            .map_err(|_| StoreError::BadMagic { path: path.to_path_buf() })?;
        if header.magic != STORE_MAGIC {
            return Err(StoreError::BadMagic { path: path.to_path_buf() });
        }
        if header.generation != offsets.generation {
            return Err(StoreError::GenerationMismatch { store: header.generation, table: offsets.generation });
        }
        Ok(Self { reader, len, generation: header.generation })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read the posting of `term` at its recorded offset. `Ok(None)` if the term is unknown.
    pub fn read_posting(&mut self, offsets: &OffsetTable, term: &str) -> Result<Option<Posting>, StoreError> {
        match offsets.offset(term) {
            Some(offset) => self.read_at(offset, term).map(Some),
            None => Ok(None),
        }
    }

    /// Decode the record at `offset`, which must belong to `term`.
    pub fn read_at(&mut self, offset: u64, term: &str) -> Result<Posting, StoreError> {
        if offset >= self.len {
            return Err(StoreError::Corrupt {
                term: term.to_string(),
                offset,
                reason: format!("offset past end of store ({} bytes)", self.len),
            });
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        let record: Record = bounded(self.len - offset).deserialize_from(&mut self.reader).map_err(|e| StoreError::Corrupt {
            term: term.to_string(),
            offset,
            reason: e.to_string(),
        })?;
        if record.term != term {
            return Err(StoreError::Corrupt {
                term: term.to_string(),
                offset,
                reason: format!("record holds `{}`", record.term),
            });
        }
        Ok(record.posting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::build_entries;

    fn sample_posting(doc: u32) -> Posting {
        let mut p = Posting::new();
        p.insert(doc, build_entries(&["x", "x"]).remove("x").unwrap());
        p
    }

    #[test]
    fn records_are_addressable_by_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let mut writer = StoreWriter::create(&path, 11).unwrap();
        let mut table = OffsetTable::new(11);
        for (i, term) in ["alpha", "beta", "gamma"].iter().enumerate() {
            let off = writer.append(term, &sample_posting(i as u32)).unwrap();
            table.offsets.insert(term.to_string(), off);
        }
        writer.finish().unwrap();

        let mut reader = StoreReader::open(&path, &table).unwrap();
        let beta = reader.read_posting(&table, "beta").unwrap().unwrap();
        assert_eq!(beta, sample_posting(1));
        assert!(reader.read_posting(&table, "delta").unwrap().is_none());
    }

    #[test]
    fn stale_offset_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        StoreWriter::create(&path, 1).unwrap().finish().unwrap();
        let stale = OffsetTable::new(2);
        assert!(matches!(
            StoreReader::open(&path, &stale),
            Err(StoreError::GenerationMismatch { store: 1, table: 2 })
        ));
    }

    #[test]
    fn wrong_offset_is_corruption_not_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let mut writer = StoreWriter::create(&path, 5).unwrap();
        let mut table = OffsetTable::new(5);
        let a = writer.append("alpha", &sample_posting(0)).unwrap();
        let b = writer.append("beta", &sample_posting(1)).unwrap();
        writer.finish().unwrap();
        table.offsets.insert("alpha".into(), b);
        table.offsets.insert("beta".into(), a + 1);

        let mut reader = StoreReader::open(&path, &table).unwrap();
        assert!(matches!(reader.read_posting(&table, "alpha"), Err(StoreError::Corrupt { .. })));
        assert!(matches!(reader.read_posting(&table, "beta"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn tables_round_trip_through_staging() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut docs = DocTable::new();
        docs.insert(0, "https://a.example/".into());
        save_doc_table(&paths, &docs).unwrap();
        assert_eq!(load_doc_table(&paths).unwrap(), docs);
        assert!(!staging_path(&paths.doc_ids()).exists());
    }
}
