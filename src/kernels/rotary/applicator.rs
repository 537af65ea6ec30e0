// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Per-token applicator and the CPU launch loop.
//!
//! ## Work decomposition
//!
//! One group per token and buffer. Inside a group the rotation work is
//! flattened into `num_heads * embed_dim` tasks (`num_kv_heads * embed_dim`
//! for the key). Task `i` maps to:
//!
//! ```text
//! head_idx   = i / embed_dim
//! rot_offset = i % embed_dim
//! head_base  = head_idx * head_size (+ head_size - rot_dim if nope_first)
//! ```
//!
//! Thread `tid` of a group of `block_dim` threads handles tasks
//! `tid, tid + block_dim, tid + 2 * block_dim, ...`, so every task is covered
//! for any `block_dim >= 1`. The task sets of different threads are disjoint,
//! which is what lets the GPU kernel run them without synchronization.
//!
//! On the CPU, query and key are separate rayon passes over disjoint token
//! chunks; the threads of a group run in order on one worker.

use num_traits::Float;
use rayon::prelude::*;

use super::cache::{AngleTable, CacheOffset};
use super::config::LaunchGeometry;
use super::pairing::Pairing;
use super::primitive::rotate_pair;

/// A query or key buffer addressed token by token.
///
/// Token `t`, head `h` starts at `t * token_stride + h * head_size`. The
/// stride may exceed `num_heads * head_size` when the caller's layout is not
/// fully contiguous (e.g. query/key views into a fused QKV projection).
#[derive(Debug)]
pub struct RotaryBuffer<'a, T> {
    /// Backing storage, mutated in place.
    pub data: &'a mut [T],
    /// Distance between consecutive tokens' head 0.
    pub token_stride: usize,
    /// Heads per token.
    pub num_heads: usize,
}

impl<'a, T> RotaryBuffer<'a, T> {
    /// Wrap a token-major buffer.
    pub fn new(data: &'a mut [T], token_stride: usize, num_heads: usize) -> Self {
        Self {
            data,
            token_stride,
            num_heads,
        }
    }

    /// Wrap a fully contiguous `[num_tokens, num_heads, head_size]` buffer.
    pub fn contiguous(data: &'a mut [T], num_heads: usize, head_size: usize) -> Self {
        Self::new(data, num_heads * head_size, num_heads)
    }
}

/// Rotary extents shared by every token of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLayout {
    /// Elements per head.
    pub head_size: usize,
    /// Rotated elements per head.
    pub rot_dim: usize,
}

impl HeadLayout {
    /// Pairs per head.
    #[must_use]
    pub const fn embed_dim(&self) -> usize {
        self.rot_dim / 2
    }
}

/// Run one thread's share of the tasks over `num_heads` heads of one token.
#[inline]
fn apply_heads<T, P, const NOPE_FIRST: bool>(
    token: &mut [T],
    cos_row: &[T],
    sin_row: &[T],
    num_heads: usize,
    layout: HeadLayout,
    tid: usize,
    block_dim: usize,
) where
    T: Float,
    P: Pairing,
{
    let embed_dim = layout.embed_dim();
    let num_tasks = num_heads * embed_dim;
    let window = if NOPE_FIRST {
        layout.head_size - layout.rot_dim
    } else {
        0
    };

    let mut i = tid;
    while i < num_tasks {
        let head_idx = i / embed_dim;
        let rot_offset = i % embed_dim;
        let head_base = head_idx * layout.head_size + window;

        let pair = P::resolve(rot_offset, embed_dim);
        let head = &mut token[head_base..head_base + layout.rot_dim];
        rotate_pair(
            head,
            pair.x,
            pair.y,
            cos_row[pair.column],
            sin_row[pair.column],
        );

        i += block_dim;
    }
}

/// Rotate every head of a single token of one buffer.
///
/// `token` starts at the token's head 0; `cos_row`/`sin_row` are the token's
/// angle table row.
pub fn apply_token<T, P, const NOPE_FIRST: bool>(
    token: &mut [T],
    num_heads: usize,
    cos_row: &[T],
    sin_row: &[T],
    layout: HeadLayout,
    block_dim: usize,
) where
    T: Float,
    P: Pairing,
{
    for tid in 0..block_dim {
        apply_heads::<T, P, NOPE_FIRST>(token, cos_row, sin_row, num_heads, layout, tid, block_dim);
    }
}

/// One rayon task per token of a single buffer.
fn rotate_buffer<T, P, C, const NOPE_FIRST: bool>(
    resolver: &C,
    buffer: RotaryBuffer<'_, T>,
    table: AngleTable<'_, T>,
    layout: HeadLayout,
    block_dim: usize,
) where
    T: Float + Send + Sync,
    P: Pairing,
    C: CacheOffset,
{
    // zero heads: nothing to rotate, and a zero stride cannot be chunked
    if buffer.num_heads == 0 || buffer.token_stride == 0 {
        return;
    }

    let embed_dim = layout.embed_dim();
    let num_heads = buffer.num_heads;

    buffer
        .data
        .par_chunks_mut(buffer.token_stride)
        .take(resolver.num_tokens())
        .enumerate()
        .for_each(|(token, chunk)| {
            let (cos_row, sin_row) = table.row(resolver.base(token, embed_dim));
            apply_token::<T, P, NOPE_FIRST>(chunk, num_heads, cos_row, sin_row, layout, block_dim);
        });
}

/// Launch one group per token on the rayon pool.
///
/// This is the monomorphized core behind the public entry points: `P` and
/// `NOPE_FIRST` are fixed here, `C` decides each token's table row. Query and
/// key are independent passes; a buffer with no heads is left alone.
pub fn launch<T, P, C, const NOPE_FIRST: bool>(
    resolver: &C,
    query: RotaryBuffer<'_, T>,
    key: RotaryBuffer<'_, T>,
    table: AngleTable<'_, T>,
    layout: HeadLayout,
    geometry: LaunchGeometry,
) where
    T: Float + Send + Sync,
    P: Pairing,
    C: CacheOffset,
{
    if resolver.num_tokens() == 0 {
        return;
    }

    tracing::trace!(style = ?P::STYLE, nope_first = NOPE_FIRST, "rotary applicator");

    let block_dim = geometry.block_dim as usize;
    rayon::join(
        || rotate_buffer::<T, P, C, NOPE_FIRST>(resolver, query, table, layout, block_dim),
        || rotate_buffer::<T, P, C, NOPE_FIRST>(resolver, key, table, layout, block_dim),
    );
}
