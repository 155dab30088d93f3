//! Row-major `f32` matrix over owned or mapped storage

use crate::buffer::Storage;

/// Embedding matrix, one row per key
#[derive(Debug, Clone)]
pub struct Matrix {
    data: Storage<f32>,
    rows: usize,
    dim: usize,
}

impl Matrix {
    /// Wrap `data` as `rows × dim`.
    ///
    /// Returns `None` if the length does not match.
    pub fn new(data: Storage<f32>, rows: usize, dim: usize) -> Option<Self> {
        if rows.checked_mul(dim)? != data.len() {
            return None;
        }
        Some(Self { data, rows, dim })
    }

    /// Owned matrix from a flat buffer; `dim` must divide its length
    pub fn from_vec(data: Vec<f32>, dim: usize) -> Option<Self> {
        if dim == 0 {
            return data.is_empty().then(|| Self {
                data: Storage::Owned(data),
                rows: 0,
                dim,
            });
        }
        if data.len() % dim != 0 {
            return None;
        }
        let rows = data.len() / dim;
        Some(Self {
            data: Storage::Owned(data),
            rows,
            dim,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_mapped(&self) -> bool {
        self.data.is_mapped()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Row `index` with zero-copy access.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds. Use `try_row` for a
    /// non-panicking version.
    #[inline]
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    pub fn try_row(&self, index: usize) -> Option<&[f32]> {
        (index < self.rows).then(|| self.row(index))
    }

    pub fn iter(&self) -> RowIter<'_> {
        RowIter {
            matrix: self,
            index: 0,
        }
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.dim == other.dim && self.as_slice() == other.as_slice()
    }
}

/// Iterator over matrix rows
pub struct RowIter<'a> {
    matrix: &'a Matrix,
    index: usize,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.matrix.try_row(self.index)?;
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.matrix.rows - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for RowIter<'a> {}
