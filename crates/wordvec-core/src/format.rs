//! Cache file format
//!
//! A built table is persisted as three files sharing one build id:
//!
//! | File       | Payload                                          |
//! |------------|--------------------------------------------------|
//! | `.vectors` | `rows × dim` `f32`, row-major                    |
//! | `.itos`    | `rows × width` `u32` code points, zero-padded    |
//! | `.table`   | `2·rows` `i64` buckets (0 = empty, else 1+index) |
//!
//! # Header (64 bytes, cache-line aligned)
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "WVCVEC01" | "WVCKEY01" | "WVCTBL01"
//! 0x08     4       u32 LE      Version (1)
//! 0x0C     4       u32 LE      Reserved
//! 0x10     8       u64 LE      Build id (same in all three files)
//! 0x18     8       u64 LE      Rows
//! 0x20     8       u64 LE      Cols (dim | key width | 1)
//! 0x28     24      [u8; 24]    Reserved / padding
//! ─────────────────────────────────────────────────
//! ```
//!
//! The payload starts at offset 64, so the mapped arrays are aligned for
//! `f32`, `u32` and `i64` access. Payloads are little-endian.
//!
//! # Atomicity
//!
//! Each file is written to `<name>.tmp`, fsynced and renamed into place. A
//! crash between renames leaves files with different build ids, which
//! [`CacheSet::open`](crate::store::CacheSet::open) refuses to load.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::keys::PackedKeys;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic bytes in {kind:?} file")]
    InvalidMagic { kind: SectionKind },

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Cache files come from different builds (vectors={vectors:#x}, itos={keys:#x}, table={table:#x})")]
    BuildIdMismatch { vectors: u64, keys: u64, table: u64 },

    #[error("Cache files disagree on size: {vectors} vectors, {keys} keys, {buckets} buckets")]
    CountMismatch { vectors: u64, keys: u64, buckets: u64 },

    #[error("File truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Trailing data: header implies {expected} bytes, file has {actual}")]
    TrailingData { expected: usize, actual: usize },

    #[error("Table file must have exactly one column, header says {0}")]
    TableCols(u64),

    #[error("Alignment error: payload at byte {offset} is misaligned")]
    Alignment { offset: usize },

    #[error("Cache file missing: {0:?}")]
    Missing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Which of the three cache files a header belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Vectors,
    Keys,
    Table,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [SectionKind::Vectors, SectionKind::Keys, SectionKind::Table];

    pub fn magic(self) -> [u8; 8] {
        match self {
            SectionKind::Vectors => *b"WVCVEC01",
            SectionKind::Keys => *b"WVCKEY01",
            SectionKind::Table => *b"WVCTBL01",
        }
    }

    /// File name suffix
    pub fn extension(self) -> &'static str {
        match self {
            SectionKind::Vectors => "vectors",
            SectionKind::Keys => "itos",
            SectionKind::Table => "table",
        }
    }

    /// Bytes per payload element
    pub fn element_size(self) -> usize {
        match self {
            SectionKind::Vectors => std::mem::size_of::<f32>(),
            SectionKind::Keys => std::mem::size_of::<u32>(),
            SectionKind::Table => std::mem::size_of::<i64>(),
        }
    }

    /// Identify a cache file from its first bytes
    pub fn detect(bytes: &[u8]) -> Option<SectionKind> {
        let magic = bytes.get(0..8)?;
        Self::ALL.into_iter().find(|kind| kind.magic() == magic)
    }
}

/// Parsed cache file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub kind: SectionKind,
    pub version: u32,
    pub build_id: u64,
    pub rows: u64,
    pub cols: u64,
}

impl CacheHeader {
    pub fn new(kind: SectionKind, build_id: u64, rows: usize, cols: usize) -> Self {
        Self {
            kind,
            version: FORMAT_VERSION,
            build_id,
            rows: rows as u64,
            cols: cols as u64,
        }
    }

    /// Parse a header, requiring it to be of `kind`
    pub fn from_bytes(bytes: &[u8], kind: SectionKind) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        if bytes[0..8] != kind.magic() {
            return Err(FormatError::InvalidMagic { kind });
        }

        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let build_id = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let rows = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let cols = u64::from_le_bytes(bytes[32..40].try_into().unwrap());

        Ok(Self {
            kind,
            version,
            build_id,
            rows,
            cols,
        })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.kind.magic());
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.build_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.rows.to_le_bytes());
        buf[32..40].copy_from_slice(&self.cols.to_le_bytes());
        buf
    }

    /// Number of payload elements, or `None` on overflow
    pub fn element_count(&self) -> Option<usize> {
        let count = self.rows.checked_mul(self.cols)?;
        usize::try_from(count).ok()
    }

    /// Total file size implied by the header
    pub fn file_size(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.kind.element_size())?
            .checked_add(HEADER_SIZE)
    }
}

/// Locations of one cache triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    pub vectors: PathBuf,
    pub keys: PathBuf,
    pub table: PathBuf,
}

impl CachePaths {
    /// `<cache_dir>/<source file name>.{vectors,itos,table}`
    pub fn for_source(source: &Path, cache_dir: &Path) -> Self {
        let base = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "vectors".into());
        let with_ext = |kind: SectionKind| {
            let mut name = base.clone();
            name.push(".");
            name.push(kind.extension());
            cache_dir.join(name)
        };
        Self {
            vectors: with_ext(SectionKind::Vectors),
            keys: with_ext(SectionKind::Keys),
            table: with_ext(SectionKind::Table),
        }
    }

    pub fn path(&self, kind: SectionKind) -> &Path {
        match kind {
            SectionKind::Vectors => &self.vectors,
            SectionKind::Keys => &self.keys,
            SectionKind::Table => &self.table,
        }
    }

    pub fn all_exist(&self) -> bool {
        SectionKind::ALL.iter().all(|&k| self.path(k).is_file())
    }

    pub fn any_exist(&self) -> bool {
        SectionKind::ALL.iter().any(|&k| self.path(k).is_file())
    }

    /// Delete whichever files of the triple exist
    pub fn remove_all(&self) -> io::Result<()> {
        for kind in SectionKind::ALL {
            match std::fs::remove_file(self.path(kind)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_section(path: &Path, header: &CacheHeader, payload: &[u8]) -> Result<PathBuf, FormatError> {
    let expected = header.file_size().unwrap_or(usize::MAX) - HEADER_SIZE;
    if payload.len() != expected {
        return Err(FormatError::Truncated {
            expected,
            actual: payload.len(),
        });
    }

    let tmp = tmp_path(path);
    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&header.to_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(tmp)
}

fn sync_parent(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Everything needed to persist one table
pub struct CacheContents<'a> {
    pub vectors: &'a [f32],
    pub dim: usize,
    pub keys: &'a PackedKeys,
    pub buckets: &'a [i64],
}

/// Write all three files of a cache set. Returns the build id.
///
/// Nothing is renamed into place until all three temporary files are
/// complete and synced.
pub fn write_cache_set(paths: &CachePaths, contents: &CacheContents<'_>) -> Result<u64, FormatError> {
    let rows = contents.keys.len();
    let build_id: u64 = rand::random();

    let sections = [
        (
            CacheHeader::new(SectionKind::Vectors, build_id, rows, contents.dim),
            bytemuck::cast_slice::<f32, u8>(contents.vectors),
        ),
        (
            CacheHeader::new(SectionKind::Keys, build_id, rows, contents.keys.width()),
            bytemuck::cast_slice::<u32, u8>(contents.keys.codes()),
        ),
        (
            CacheHeader::new(SectionKind::Table, build_id, contents.buckets.len(), 1),
            bytemuck::cast_slice::<i64, u8>(contents.buckets),
        ),
    ];

    if let Some(parent) = paths.vectors.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut written = Vec::with_capacity(sections.len());
    for (header, payload) in &sections {
        match write_section(paths.path(header.kind), header, payload) {
            Ok(tmp) => written.push((tmp, header.kind)),
            Err(e) => {
                for (tmp, _) in &written {
                    let _ = std::fs::remove_file(tmp);
                }
                return Err(e);
            }
        }
    }

    for (tmp, kind) in &written {
        std::fs::rename(tmp, paths.path(*kind))?;
    }
    sync_parent(&paths.vectors)?;

    Ok(build_id)
}
