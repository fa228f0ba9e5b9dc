pub mod builder;
pub mod config;
pub mod index;
pub mod merge;
pub mod partial;
pub mod persist;
pub mod posting;
pub mod query;
pub mod rank;
pub mod simhash;
pub mod source;
pub mod tokenizer;

pub use builder::{build_index, Acceptance, IndexBuilder, IndexStats};
pub use config::IndexConfig;
pub use index::{DocId, DocTable, OffsetTable, SignalTables, TermId};
pub use persist::{IndexPaths, MetaFile, StoreError, StoreReader};
pub use posting::{Entry, Posting};
pub use query::{QueryError, SearchIndex};
