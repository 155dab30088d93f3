//! Memory-mapped cache set
//!
//! Opens the three files of a cache triple and exposes their payloads as
//! zero-copy views. Nothing is copied into process memory; the OS page cache
//! backs every lookup.
//!
//! # Safety
//!
//! Mapping is inherently unsafe:
//! - If a file is truncated while mapped, reads may cause SIGBUS
//! - Files should not be modified while a set is open
//!
//! Cache files are only ever replaced by rename, never rewritten in place, so
//! an open set keeps reading the inode it mapped.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::buffer::{MappedSlice, Storage};
use crate::format::{CacheHeader, CachePaths, FormatError, SectionKind, HEADER_SIZE};
use crate::index::BUCKETS_PER_KEY;
use crate::keys::PackedKeys;

/// A validated, mapped cache triple
pub struct CacheSet {
    pub build_id: u64,
    pub rows: usize,
    pub dim: usize,
    pub vectors: MappedSlice<f32>,
    pub keys: PackedKeys,
    pub buckets: MappedSlice<i64>,
    mapped_bytes: usize,
}

fn map_section(path: &Path, kind: SectionKind) -> Result<(CacheHeader, Arc<Mmap>), FormatError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FormatError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let mmap = unsafe { Mmap::map(&file)? };

    let header = CacheHeader::from_bytes(&mmap, kind)?;
    let expected = header.file_size().ok_or(FormatError::Truncated {
        expected: usize::MAX,
        actual: mmap.len(),
    })?;
    if mmap.len() < expected {
        return Err(FormatError::Truncated {
            expected,
            actual: mmap.len(),
        });
    }
    if mmap.len() > expected {
        return Err(FormatError::TrailingData {
            expected,
            actual: mmap.len(),
        });
    }

    Ok((header, Arc::new(mmap)))
}

impl CacheSet {
    /// Map and cross-check all three files.
    ///
    /// Fails unless every file exists with exactly the size its header
    /// implies, the build ids agree, the table has one column and
    /// `vectors.rows == keys.rows == table.rows / 2`.
    pub fn open(paths: &CachePaths) -> Result<Self, FormatError> {
        let (vec_header, vec_map) = map_section(&paths.vectors, SectionKind::Vectors)?;
        let (key_header, key_map) = map_section(&paths.keys, SectionKind::Keys)?;
        let (tbl_header, tbl_map) = map_section(&paths.table, SectionKind::Table)?;

        if vec_header.build_id != key_header.build_id || vec_header.build_id != tbl_header.build_id {
            return Err(FormatError::BuildIdMismatch {
                vectors: vec_header.build_id,
                keys: key_header.build_id,
                table: tbl_header.build_id,
            });
        }

        if tbl_header.cols != 1 {
            return Err(FormatError::TableCols(tbl_header.cols));
        }
        let buckets = tbl_header.rows;
        if vec_header.rows != key_header.rows
            || key_header.rows.checked_mul(BUCKETS_PER_KEY as u64) != Some(buckets)
        {
            return Err(FormatError::CountMismatch {
                vectors: vec_header.rows,
                keys: key_header.rows,
                buckets,
            });
        }

        let mapped_bytes = vec_map.len() + key_map.len() + tbl_map.len();
        let rows = vec_header.rows as usize;
        let dim = vec_header.cols as usize;
        let width = key_header.cols as usize;

        let vectors = MappedSlice::new(vec_map, HEADER_SIZE, rows * dim)?;
        let codes = MappedSlice::<u32>::new(key_map, HEADER_SIZE, rows * width)?;
        let keys = PackedKeys::new(Storage::Mapped(codes), width, rows).ok_or(
            FormatError::Truncated {
                expected: rows * width,
                actual: 0,
            },
        )?;
        let buckets = MappedSlice::new(tbl_map, HEADER_SIZE, buckets as usize)?;

        Ok(Self {
            build_id: vec_header.build_id,
            rows,
            dim,
            vectors,
            keys,
            buckets,
            mapped_bytes,
        })
    }

    /// Total mapped bytes across the three files
    pub fn memory_bytes(&self) -> usize {
        self.mapped_bytes
    }
}
