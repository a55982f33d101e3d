//! ## bankers-core::matrix
//! **Runtime-sized `consumers × resources` matrix**
//!
//! Row-major storage of unsigned unit counts, one row per consumer.

use serde::{Deserialize, Serialize};

/// Dense row-major matrix of resource units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<u32>,
}

impl Matrix {
    /// Creates a `rows × cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Builds a matrix from nested rows. Returns `None` when the rows are ragged.
    pub fn from_rows<R: AsRef<[u32]>>(rows: &[R]) -> Option<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns row `i`.
    ///
    /// # Panics
    /// If `i` is out of bounds.
    #[inline]
    pub fn row(&self, i: usize) -> &[u32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [u32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> u32 {
        self.data[i * self.cols + j]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[u32]> {
        // chunks_exact panics on zero, an empty matrix has no rows to yield anyway
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Column sums, i.e. the units of each resource held across all rows.
    pub fn column_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.cols];
        for row in self.iter_rows() {
            for (sum, &v) in sums.iter_mut().zip(row) {
                *sum += u64::from(v);
            }
        }
        sums
    }

    pub fn is_zero_row(&self, i: usize) -> bool {
        self.row(i).iter().all(|&v| v == 0)
    }
}
