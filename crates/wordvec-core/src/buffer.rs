//! Owned vs. memory-mapped array storage
//!
//! Every persisted array (vector matrix, key code points, index buckets) is a
//! [`Storage<T>`]: either an owned `Vec<T>` produced by a fresh build, or a
//! read-only [`MappedSlice<T>`] borrowed from a mapped cache file. Both deref
//! to `&[T]`, so lookup code never cares which one it holds.
//!
//! # Safety
//!
//! The mapped side uses `bytemuck` for alignment-checked `&[u8] -> &[T]`
//! conversion. Alignment and bounds are checked once in [`MappedSlice::new`];
//! later accesses cannot fail.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use bytemuck::Pod;
use memmap2::Mmap;

use crate::format::FormatError;

/// Typed, read-only window into a shared memory map
pub struct MappedSlice<T: Pod> {
    map: Arc<Mmap>,
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedSlice<T> {
    /// View `len` elements of `T` starting at byte `offset` of `map`.
    pub fn new(map: Arc<Mmap>, offset: usize, len: usize) -> Result<Self, FormatError> {
        let end = len
            .checked_mul(std::mem::size_of::<T>())
            .and_then(|bytes| bytes.checked_add(offset))
            .ok_or(FormatError::Truncated {
                expected: usize::MAX,
                actual: map.len(),
            })?;
        if end > map.len() {
            return Err(FormatError::Truncated {
                expected: end,
                actual: map.len(),
            });
        }

        bytemuck::try_cast_slice::<u8, T>(&map[offset..end])
            .map_err(|_| FormatError::Alignment { offset })?;

        Ok(Self {
            map,
            offset,
            len,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        let end = self.offset + self.len * std::mem::size_of::<T>();
        bytemuck::cast_slice(&self.map[self.offset..end])
    }

    /// Size of the whole backing map, header included
    pub fn mapped_bytes(&self) -> usize {
        self.map.len()
    }
}

impl<T: Pod> Clone for MappedSlice<T> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
            offset: self.offset,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

/// Array storage that is either owned or borrowed from a mapped file
#[derive(Clone)]
pub enum Storage<T: Pod> {
    /// Built in this process; mutable until wrapped
    Owned(Vec<T>),
    /// Zero-copy view over a cache file
    Mapped(MappedSlice<T>),
}

impl<T: Pod> Storage<T> {
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Storage::Owned(v) => v,
            Storage::Mapped(m) => m.as_slice(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Storage::Mapped(_))
    }

    /// Heap bytes held by this storage (0 for mapped views)
    pub fn heap_bytes(&self) -> usize {
        match self {
            Storage::Owned(v) => v.capacity() * std::mem::size_of::<T>(),
            Storage::Mapped(_) => 0,
        }
    }
}

impl<T: Pod> Deref for Storage<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Pod> From<Vec<T>> for Storage<T> {
    fn from(v: Vec<T>) -> Self {
        Storage::Owned(v)
    }
}

impl<T: Pod> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_mapped() { "Mapped" } else { "Owned" };
        f.debug_struct("Storage")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
