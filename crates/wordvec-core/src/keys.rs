//! Key table (`itos`)
//!
//! Ordinal -> token string. A fresh build owns a `Vec<String>`; a loaded cache
//! borrows fixed-width rows of UTF-32 code points straight from the mapped
//! `.itos` file. Rows are zero-padded to the width of the longest key, so a
//! key can never contain NUL.

use std::borrow::Cow;

use crate::buffer::Storage;

/// Fixed-width UTF-32 key rows
#[derive(Debug, Clone)]
pub struct PackedKeys {
    codes: Storage<u32>,
    width: usize,
    len: usize,
}

impl PackedKeys {
    /// Wrap `len` rows of `width` code points.
    ///
    /// Returns `None` if `codes` is not exactly `len * width` long.
    pub fn new(codes: Storage<u32>, width: usize, len: usize) -> Option<Self> {
        if width.checked_mul(len)? != codes.len() {
            return None;
        }
        Some(Self { codes, width, len })
    }

    /// Pack owned strings into fixed-width rows
    pub fn pack<S: AsRef<str>>(keys: &[S]) -> Self {
        let width = keys
            .iter()
            .map(|k| k.as_ref().chars().count())
            .max()
            .unwrap_or(0);
        let mut codes = vec![0u32; width * keys.len()];
        for (row, key) in codes.chunks_exact_mut(width.max(1)).zip(keys) {
            for (slot, c) in row.iter_mut().zip(key.as_ref().chars()) {
                *slot = c as u32;
            }
        }
        Self {
            codes: Storage::Owned(codes),
            width,
            len: keys.len(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    pub fn is_mapped(&self) -> bool {
        self.codes.is_mapped()
    }

    #[inline]
    fn row(&self, index: usize) -> &[u32] {
        let start = index * self.width;
        &self.codes[start..start + self.width]
    }

    /// Decode row `index`. Invalid code points decode as U+FFFD.
    pub fn decode(&self, index: usize) -> String {
        self.row(index)
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    /// Compare row `index` with `key` without allocating
    #[inline]
    pub fn matches(&self, index: usize, key: &str) -> bool {
        let mut chars = key.chars();
        for &code in self.row(index) {
            if code == 0 {
                return chars.next().is_none();
            }
            match chars.next() {
                Some(c) if c as u32 == code => {}
                _ => return false,
            }
        }
        chars.next().is_none()
    }
}

/// Ordered token strings, 0-based ordinal = key index
#[derive(Debug, Clone)]
pub enum KeyTable {
    Owned(Vec<String>),
    Packed(PackedKeys),
}

impl KeyTable {
    pub fn len(&self) -> usize {
        match self {
            KeyTable::Owned(keys) => keys.len(),
            KeyTable::Packed(packed) => packed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, KeyTable::Packed(p) if p.is_mapped())
    }

    /// Key at `index`, borrowed when the table owns its strings
    pub fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        if index >= self.len() {
            return None;
        }
        Some(match self {
            KeyTable::Owned(keys) => Cow::Borrowed(keys[index].as_str()),
            KeyTable::Packed(packed) => Cow::Owned(packed.decode(index)),
        })
    }

    /// `keys[index] == key`; `index` must be in bounds
    #[inline]
    pub fn matches(&self, index: usize, key: &str) -> bool {
        match self {
            KeyTable::Owned(keys) => keys[index] == key,
            KeyTable::Packed(packed) => packed.matches(index, key),
        }
    }

    /// Longest key in code points (the `.itos` row width)
    pub fn width(&self) -> usize {
        match self {
            KeyTable::Owned(keys) => keys.iter().map(|k| k.chars().count()).max().unwrap_or(0),
            KeyTable::Packed(packed) => packed.width(),
        }
    }

    /// Fixed-width representation, packing owned keys on demand
    pub fn packed(&self) -> Cow<'_, PackedKeys> {
        match self {
            KeyTable::Owned(keys) => Cow::Owned(PackedKeys::pack(keys)),
            KeyTable::Packed(packed) => Cow::Borrowed(packed),
        }
    }

    /// Keys in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl PartialEq for KeyTable {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for KeyTable {}
