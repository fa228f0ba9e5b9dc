use crate::persist::IndexPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Settings for one indexing run and for query serving over its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the crawled pages (`.json` / `.jsonl`).
    pub input_dir: PathBuf,
    /// Directory receiving the merged store and its tables.
    pub output_dir: PathBuf,
    /// Fragment directory name, relative to `output_dir`.
    pub partial_dir: String,
    pub store_file: String,
    pub offsets_file: String,
    /// Accepted documents per in-memory batch before fragments are flushed.
    pub batch_size: usize,
    /// Maximum number of differing suffix bits for two pages to count as near duplicates.
    pub near_duplicate_threshold: u32,
    /// Width of the LSH bucket key taken from each rotated fingerprint.
    pub sim_hash_prefix_bits: u32,
    pub max_results: usize,
    pub strong_signal_boost: f64,
    pub anchor_signal_boost: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./index"),
            partial_dir: "partial".into(),
            store_file: "index.bin".into(),
            offsets_file: "offsets.bin".into(),
            batch_size: 1000,
            near_duplicate_threshold: 3,
            sim_hash_prefix_bits: 20,
            max_results: 20,
            strong_signal_boost: 1.0,
            anchor_signal_boost: 0.5,
        }
    }
}

impl IndexConfig {
    /// Read a JSON config file. Fields missing from the file keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let config: IndexConfig = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp values that would make the pipeline meaningless.
    pub fn sanitized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.sim_hash_prefix_bits = self.sim_hash_prefix_bits.clamp(1, 63);
        self
    }

    pub fn paths(&self) -> IndexPaths {
        IndexPaths::new(&self.output_dir)
            .with_store_file(&self.store_file)
            .with_offsets_file(&self.offsets_file)
            .with_partial_dir(&self.partial_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = File::create(&path).unwrap();
        f.write_all(br#"{ "batch_size": 0, "near_duplicate_threshold": 5, "sim_hash_prefix_bits": 99 }"#).unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.near_duplicate_threshold, 5);
        assert_eq!(config.sim_hash_prefix_bits, 63);
        assert_eq!(config.store_file, "index.bin");
        assert_eq!(config.max_results, 20);
    }

    #[test]
    fn paths_follow_configured_file_names() {
        let config = IndexConfig {
            output_dir: PathBuf::from("/tmp/out"),
            store_file: "store.bin".into(),
            ..IndexConfig::default()
        };
        let paths = config.paths();
        assert_eq!(paths.store(), PathBuf::from("/tmp/out/store.bin"));
        assert_eq!(paths.partial_dir(), PathBuf::from("/tmp/out/partial"));
    }
}
