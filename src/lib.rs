//! wordvec: cached word-embedding tables
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Vocab · Pretrained aliases · Registry            │
//! │        consume tables only through lookup / contains        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  VectorTable (wordvec-core)                 │
//! │     hash index over keys · f32 matrix · unknown vectors     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Cache triple (.vectors/.itos/.table)           │
//! │               memory-mapped on every later open             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod pretrained;
pub mod registry;
pub mod vocab;

pub use wordvec_core as core;

pub use config::{CacheConfig, ConfigError};
pub use pretrained::{Pretrained, PretrainedError};
pub use registry::TableRegistry;
pub use vocab::{VectorMode, Vocab, VocabError, VocabOptions, VocabVectors};
pub use wordvec_core::{
    string_hash, CachePaths, Initializer, InitializerConfig, LookupStrategy, Matrix, StringIndex,
    TableError, TableOptions, TableStats, VectorTable,
};
