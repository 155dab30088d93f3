//! Vector table: token -> embedding
//!
//! # Lifecycle
//!
//! ```text
//! first run:   text file ──parse──▶ keys + matrix ──build──▶ index ──persist──▶ cache triple
//! later runs:  cache triple ──mmap──▶ keys + matrix + index (no parse, no hashing)
//! ```
//!
//! A fresh build owns its arrays; a loaded table borrows all three from the
//! mapped files. Either way the table is immutable and can be shared across
//! threads without locking.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::Storage;
use crate::format::{write_cache_set, CacheContents, CachePaths, FormatError};
use crate::index::{reachable_buckets, IndexError, StringIndex};
use crate::initializer::{Initializer, ZerosInitializer};
use crate::keys::KeyTable;
use crate::matrix::Matrix;
use crate::ngram::{mean_of, ngram_keys, UNK_TOKEN};
use crate::parse::{parse_file, ParseError, ParseOptions, ParsedVectors, MAX_KEY_LENGTH};
use crate::store::CacheSet;

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = ".vector_cache";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error(
        "Cannot index {keys} keys: no free bucket for {key:?}. With {buckets} buckets each key \
         only reaches {reachable} of them, so a key count that is a multiple of 7 can overflow"
    )]
    Unindexable {
        keys: usize,
        key: String,
        buckets: usize,
        reachable: usize,
    },

    #[error("Cache format error: {0}")]
    Format(#[from] FormatError),

    #[error("No vectors found at {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Corrupt table: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What a lookup does when the token itself is not a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// Unknown initializer output
    #[default]
    Direct,
    /// Mean of the token's char n-gram vectors, then the unknown initializer
    CharNGram,
}

/// How a table is built, cached and queried
#[derive(Clone)]
pub struct TableOptions {
    /// Where cache triples live; `None` disables caching
    pub cache_dir: Option<PathBuf>,
    pub max_key_length: usize,
    pub strategy: LookupStrategy,
    pub unk_init: Arc<dyn Initializer>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            max_key_length: MAX_KEY_LENGTH,
            strategy: LookupStrategy::Direct,
            unk_init: Arc::new(ZerosInitializer),
        }
    }
}

impl TableOptions {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_dir = None;
        self
    }

    pub fn with_max_key_length(mut self, max_key_length: usize) -> Self {
        self.max_key_length = max_key_length;
        self
    }

    pub fn with_strategy(mut self, strategy: LookupStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_unk_init<I: Initializer + 'static>(mut self, init: I) -> Self {
        self.unk_init = Arc::new(init);
        self
    }

    pub fn with_shared_unk_init(mut self, init: Arc<dyn Initializer>) -> Self {
        self.unk_init = init;
        self
    }

    /// Cache triple for `source`, if caching is enabled
    pub fn cache_paths(&self, source: &Path) -> Option<CachePaths> {
        self.cache_dir
            .as_deref()
            .map(|dir| CachePaths::for_source(source, dir))
    }

    /// `name` itself if it is a file, otherwise `<cache_dir>/name`
    pub fn resolve_source(&self, name: &Path) -> PathBuf {
        if name.is_file() {
            return name.to_path_buf();
        }
        match &self.cache_dir {
            Some(dir) => dir.join(name),
            None => name.to_path_buf(),
        }
    }
}

impl fmt::Debug for TableOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOptions")
            .field("cache_dir", &self.cache_dir)
            .field("max_key_length", &self.max_key_length)
            .field("strategy", &self.strategy)
            .field("unk_init", &self.unk_init.name())
            .finish()
    }
}

/// Summary numbers for a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub keys: usize,
    pub dim: usize,
    pub buckets: usize,
    pub max_probe_length: usize,
    pub mapped: bool,
}

/// Immutable embedding table
pub struct VectorTable {
    name: String,
    index: StringIndex,
    matrix: Matrix,
    strategy: LookupStrategy,
    unk_init: Arc<dyn Initializer>,
    build_id: Option<u64>,
}

fn source_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string_lossy().into_owned())
}

fn drop_nul_keys(keys: Vec<String>, vectors: Vec<f32>, dim: usize) -> (Vec<String>, Vec<f32>) {
    if !keys.iter().any(|k| k.contains('\0')) {
        return (keys, vectors);
    }

    let mut kept_keys = Vec::with_capacity(keys.len());
    let mut kept = Vec::with_capacity(vectors.len());
    for (i, key) in keys.into_iter().enumerate() {
        if key.contains('\0') {
            tracing::warn!("Skipping token {:?} containing NUL", key);
            continue;
        }
        kept.extend_from_slice(&vectors[i * dim..(i + 1) * dim]);
        kept_keys.push(key);
    }
    (kept_keys, kept)
}

impl VectorTable {
    /// Build from keys and a flat row-major matrix already in memory.
    ///
    /// Keys containing NUL cannot be stored in `.itos` and are dropped along
    /// with their rows.
    pub fn from_vectors(
        name: impl Into<String>,
        keys: Vec<String>,
        vectors: Vec<f32>,
        dim: usize,
        options: &TableOptions,
    ) -> Result<Self, TableError> {
        if keys.len().checked_mul(dim) != Some(vectors.len()) {
            return Err(TableError::Corrupt(format!(
                "{} keys do not match a {}-dim matrix",
                keys.len(),
                dim
            )));
        }
        let (keys, vectors) = drop_nul_keys(keys, vectors, dim);

        let rows = keys.len();
        let matrix = Matrix::new(Storage::Owned(vectors), rows, dim).ok_or_else(|| {
            TableError::Corrupt(format!("{} keys do not match a {}-dim matrix", rows, dim))
        })?;
        let index = StringIndex::build(keys).map_err(|e| match e {
            IndexError::ProbeExhausted { key, attempts } => TableError::Unindexable {
                keys: rows,
                key,
                buckets: attempts,
                reachable: reachable_buckets(attempts),
            },
            other => TableError::Index(other),
        })?;

        Ok(Self {
            name: name.into(),
            index,
            matrix,
            strategy: options.strategy,
            unk_init: Arc::clone(&options.unk_init),
            build_id: None,
        })
    }

    fn from_parsed(name: String, parsed: ParsedVectors, options: &TableOptions) -> Result<Self, TableError> {
        Self::from_vectors(name, parsed.keys, parsed.vectors, parsed.dim, options)
    }

    /// Parse `source`, index it and, if caching is enabled, persist the
    /// cache triple.
    pub fn build(source: &Path, options: &TableOptions) -> Result<Self, TableError> {
        tracing::info!("Loading vectors from {:?}", source);
        let parse_options = ParseOptions {
            max_key_length: options.max_key_length,
        };
        let parsed = parse_file(source, &parse_options)?;
        let stats = parsed.stats.clone();
        tracing::info!(
            "Parsed {} vectors of dimension {} ({} headers, {} long keys, {} undecodable)",
            parsed.keys.len(),
            parsed.dim,
            stats.headers,
            stats.too_long,
            stats.undecodable
        );

        let mut table = Self::from_parsed(source_name(source), parsed, options)?;

        if let Some(paths) = options.cache_paths(source) {
            tracing::info!("Saving vectors to {:?}", paths.vectors);
            table.build_id = Some(table.persist(&paths)?);
        }
        Ok(table)
    }

    /// Map a cache triple. No parsing, no hashing.
    pub fn load(paths: &CachePaths, options: &TableOptions) -> Result<Self, TableError> {
        let set = CacheSet::open(paths)?;
        let (rows, dim, build_id) = (set.rows, set.dim, set.build_id);

        let index = StringIndex::from_parts(KeyTable::Packed(set.keys), Storage::Mapped(set.buckets))?;
        let matrix = Matrix::new(Storage::Mapped(set.vectors), rows, dim)
            .ok_or_else(|| TableError::Corrupt(format!("vector payload is not {} x {}", rows, dim)))?;

        let name = paths
            .vectors
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            index,
            matrix,
            strategy: options.strategy,
            unk_init: Arc::clone(&options.unk_init),
            build_id: Some(build_id),
        })
    }

    /// Load the cache for `source` if a complete one exists, else build it.
    ///
    /// `source` may be a path or a file name inside the cache directory.
    pub fn open(source: impl AsRef<Path>, options: &TableOptions) -> Result<Self, TableError> {
        let source = options.resolve_source(source.as_ref());

        if let Some(paths) = options.cache_paths(&source) {
            if paths.all_exist() {
                tracing::info!("Loading vectors from {:?}", paths.vectors);
                match Self::load(&paths, options) {
                    Ok(table) => return Ok(table),
                    Err(e) => tracing::warn!(
                        "Ignoring unusable vector cache {:?}: {}. Rebuilding from source.",
                        paths.vectors,
                        e
                    ),
                }
            } else if paths.any_exist() {
                tracing::warn!(
                    "Incomplete vector cache for {:?}. Rebuilding from source.",
                    source
                );
            }
        }

        if !source.is_file() {
            return Err(TableError::SourceNotFound(source));
        }
        Self::build(&source, options)
    }

    /// Write the cache triple. Returns the new build id.
    pub fn persist(&self, paths: &CachePaths) -> Result<u64, TableError> {
        let keys = self.index.keys().packed();
        let contents = CacheContents {
            vectors: self.matrix.as_slice(),
            dim: self.matrix.dim(),
            keys: &keys,
            buckets: self.index.buckets(),
        };
        Ok(write_cache_set(paths, &contents)?)
    }

    /// Vector for `token`.
    ///
    /// Surrounding whitespace is stripped first. Hits borrow the stored row;
    /// misses fall back to the table's [`LookupStrategy`].
    pub fn lookup(&self, token: &str) -> Cow<'_, [f32]> {
        let token = token.trim();

        if self.strategy == LookupStrategy::CharNGram && token == UNK_TOKEN {
            return Cow::Owned(self.unk_vector());
        }
        if let Some(ordinal) = self.index.find(token) {
            return Cow::Borrowed(self.matrix.row(ordinal));
        }

        match self.strategy {
            LookupStrategy::Direct => Cow::Owned(self.unk_vector()),
            LookupStrategy::CharNGram => {
                let grams = ngram_keys(token);
                let rows = grams
                    .iter()
                    .filter_map(|key| self.index.find(key))
                    .map(|ordinal| self.matrix.row(ordinal));
                match mean_of(rows, self.dim()) {
                    Some(v) => Cow::Owned(v),
                    None => Cow::Owned(self.unk_vector()),
                }
            }
        }
    }

    /// Vector for `token`, or an error if it is not a key
    pub fn lookup_strict(&self, token: &str) -> Result<&[f32], TableError> {
        let ordinal = self.index.get(token.trim())?;
        Ok(self.matrix.row(ordinal))
    }

    /// Row by ordinal
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        self.matrix.try_row(ordinal)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains(token.trim())
    }

    /// Ordinal of `token`
    pub fn find(&self, token: &str) -> Option<usize> {
        self.index.find(token.trim())
    }

    /// Fresh unknown vector of length `dim`
    pub fn unk_vector(&self) -> Vec<f32> {
        self.unk_init.initialize(self.dim())
    }

    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> LookupStrategy {
        self.strategy
    }

    pub fn build_id(&self) -> Option<u64> {
        self.build_id
    }

    /// True when all arrays are borrowed from mapped cache files
    pub fn is_mapped(&self) -> bool {
        self.matrix.is_mapped() && self.index.is_mapped() && self.index.keys().is_mapped()
    }

    /// Keys in ordinal order
    pub fn keys(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        self.index.keys().iter()
    }

    pub fn index(&self) -> &StringIndex {
        &self.index
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            keys: self.len(),
            dim: self.dim(),
            buckets: self.index.capacity(),
            max_probe_length: self.index.max_probe_length(),
            mapped: self.is_mapped(),
        }
    }
}

impl fmt::Debug for VectorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorTable")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("dim", &self.dim())
            .field("strategy", &self.strategy)
            .field("unk_init", &self.unk_init.name())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
