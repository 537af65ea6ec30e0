// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Angle table view and per-token row resolution.
//!
//! The cosine and sine tables are dense `[max_position, embed_dim]` arrays.
//! Each token reads one row; which row depends on the resolver:
//!
//! ```text
//! Standard: row = position[t]
//! Batched:  row = offset[t] + position[t]
//! ```
//!
//! The batched form lets tokens governed by different rotary parameterizations
//! (e.g. one linear scaling factor per adapter) share a single call, as long as
//! each parameterization owns a disjoint row range of the packed table.

/// Borrowed cosine/sine tables, row-major `[max_position, embed_dim]`.
#[derive(Debug, Clone, Copy)]
pub struct AngleTable<'a, T> {
    /// Cosine values.
    pub cos: &'a [T],
    /// Sine values.
    pub sin: &'a [T],
    /// Columns per row (`rot_dim / 2`).
    pub embed_dim: usize,
}

impl<'a, T> AngleTable<'a, T> {
    /// Wrap a pair of tables sharing `embed_dim` columns.
    #[must_use]
    pub const fn new(cos: &'a [T], sin: &'a [T], embed_dim: usize) -> Self {
        Self {
            cos,
            sin,
            embed_dim,
        }
    }

    /// Rotary dimension implied by the table width.
    #[must_use]
    pub const fn rot_dim(&self) -> usize {
        2 * self.embed_dim
    }

    /// Number of rows.
    #[must_use]
    pub fn max_position(&self) -> usize {
        if self.embed_dim == 0 {
            0
        } else {
            self.cos.len() / self.embed_dim
        }
    }

    /// Cosine and sine rows starting at flat offset `base`.
    #[inline]
    #[must_use]
    pub fn row(&self, base: usize) -> (&'a [T], &'a [T]) {
        let end = base + self.embed_dim;
        (&self.cos[base..end], &self.sin[base..end])
    }
}

/// Maps a token index to its angle table row.
pub trait CacheOffset: Sync {
    /// Number of tokens this resolver covers.
    fn num_tokens(&self) -> usize;

    /// Table row for `token`.
    fn row(&self, token: usize) -> usize;

    /// Flat offset of the token's row in a table with `embed_dim` columns.
    #[inline]
    fn base(&self, token: usize, embed_dim: usize) -> usize {
        self.row(token) * embed_dim
    }
}

// Positions and offsets arrive as signed 64-bit integers from the serving
// layer. Negative values are a contract violation and land out of bounds.
#[inline(always)]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn as_row(value: i64) -> usize {
    value as usize
}

/// Row = position.
#[derive(Debug, Clone, Copy)]
pub struct Standard<'a> {
    positions: &'a [i64],
}

impl<'a> Standard<'a> {
    /// Resolve rows directly from `positions`.
    #[must_use]
    pub const fn new(positions: &'a [i64]) -> Self {
        Self { positions }
    }
}

impl CacheOffset for Standard<'_> {
    fn num_tokens(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    fn row(&self, token: usize) -> usize {
        as_row(self.positions[token])
    }
}

/// Row = per-token table offset + position.
#[derive(Debug, Clone, Copy)]
pub struct Batched<'a> {
    positions: &'a [i64],
    offsets: &'a [i64],
}

impl<'a> Batched<'a> {
    /// Resolve rows from `offsets[t] + positions[t]`.
    ///
    /// The token count is taken from `offsets`.
    #[must_use]
    pub const fn new(positions: &'a [i64], offsets: &'a [i64]) -> Self {
        Self { positions, offsets }
    }
}

impl CacheOffset for Batched<'_> {
    fn num_tokens(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    fn row(&self, token: usize) -> usize {
        as_row(self.offsets[token] + self.positions[token])
    }
}
