//! wordvec core – string-keyed embedding cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        VectorTable                          │
//! │     lookup · contains · char n-gram fallback · unk init     │
//! ├─────────────────────────────────────────────────────────────┤
//! │   StringIndex (open addressing, step 7, load factor 0.5)    │
//! │               over a deterministic string hash              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Cache triple (.vectors / .itos / .table), mmap zero-copy   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first `VectorTable::open` for a source parses the text file and writes
//! the cache triple; every later open maps the triple instead.

#[cfg(target_endian = "big")]
compile_error!("cache files store little-endian payloads and are mapped without conversion");

pub mod buffer;
pub mod format;
pub mod hash;
pub mod index;
pub mod initializer;
pub mod keys;
pub mod matrix;
pub mod ngram;
pub mod parse;
pub mod store;
pub mod table;

pub use buffer::{MappedSlice, Storage};
pub use format::{CacheHeader, CachePaths, FormatError, SectionKind};
pub use hash::string_hash;
pub use index::{IndexError, StringIndex};
pub use initializer::{
    ConstantInitializer, FnInitializer, Initializer, InitializerConfig, InitializerError,
    RandomUniformInitializer, ZerosInitializer,
};
pub use keys::{KeyTable, PackedKeys};
pub use matrix::Matrix;
pub use parse::{ParseError, ParseOptions, ParsedVectors, MAX_KEY_LENGTH};
pub use store::CacheSet;
pub use table::{LookupStrategy, TableError, TableOptions, TableStats, VectorTable};

/// Parse raw header bytes of any cache file. Exposed for fuzzing.
pub fn fuzz_read_cache_header(bytes: &[u8]) -> Option<CacheHeader> {
    let kind = SectionKind::detect(bytes)?;
    let header = CacheHeader::from_bytes(bytes, kind).ok()?;
    let _ = header.file_size();
    Some(header)
}

/// Run the text parser over arbitrary bytes. Exposed for fuzzing.
pub fn fuzz_parse_text(bytes: &[u8]) -> Option<usize> {
    let parsed = parse::parse_bytes(bytes, &ParseOptions::default()).ok()?;
    let index = StringIndex::build(parsed.keys).ok()?;
    Some(index.len())
}
