// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! In-place rotary position embedding over token-major query/key buffers.
//!
//! This is the slice-level core. Callers hand in validated buffers, head
//! counts and an angle table; the kernels rotate every head of every token
//! in one parallel pass and never allocate.
//!
//! ## Module Structure
//!
//! - [`primitive`] - rotation of one `(x, y)` pair
//! - [`pairing`] - NeoX / GPT-J slot pairing
//! - [`cache`] - angle table view and per-token row resolution
//! - [`applicator`] - per-token work split and the rayon launch loop
//! - [`config`] - convention flags and launch geometry
//!
//! ## Preconditions
//!
//! Nothing here is checked at runtime. The caller guarantees:
//! - `rot_dim` is even and `rot_dim <= head_size`
//! - every table row touched (`position`, or `offset + position` in the
//!   batched form) is below the table's `max_position`
//! - each buffer holds `num_tokens` tokens at its `token_stride`, and the
//!   stride is at least `num_heads * head_size`
//!
//! A violated precondition panics on a bounds check; it never corrupts
//! memory outside the buffers.
//!
//! ## Example
//!
//! ```rust
//! use rotary_rs::kernels::rotary::{rotary_embedding, AngleTable, RotaryBuffer, RotaryConfig};
//!
//! // one token, one head of 4, table row 0 is the identity rotation
//! let mut query = vec![1.0f32, 2.0, 3.0, 4.0];
//! let mut key = vec![5.0f32, 6.0, 7.0, 8.0];
//! let cos = [1.0f32, 1.0];
//! let sin = [0.0f32, 0.0];
//!
//! rotary_embedding(
//!     &[0],
//!     RotaryBuffer::contiguous(&mut query, 1, 4),
//!     RotaryBuffer::contiguous(&mut key, 1, 4),
//!     4,
//!     AngleTable::new(&cos, &sin, 2),
//!     RotaryConfig::neox(),
//! );
//! assert_eq!(query, [1.0, 2.0, 3.0, 4.0]);
//! ```

pub mod applicator;
pub mod cache;
pub mod config;
pub mod pairing;
pub mod primitive;

#[cfg(feature = "cuda")]
pub mod cubecl;

use num_traits::Float;

pub use applicator::{HeadLayout, RotaryBuffer};
pub use cache::{AngleTable, Batched, CacheOffset, Standard};
pub use config::{LaunchGeometry, RotaryConfig, RotaryStyle, MAX_BLOCK_SIZE};
pub use pairing::{Gptj, Neox, PairIndex, Pairing};

/// Apply rotary embeddings with rows indexed by position.
///
/// `rot_dim` is `2 * table.embed_dim`. Rotates the leading `rot_dim`
/// elements of every head (the trailing ones with `config.nope_first`).
///
/// # Arguments
/// * `positions` - One position per token, in `[0, table.max_position())`
/// * `query` - Query buffer, `num_heads` heads per token
/// * `key` - Key buffer, `num_kv_heads` heads per token
/// * `head_size` - Elements per head
/// * `table` - Cosine/sine tables `[max_position, rot_dim / 2]`
/// * `config` - Pairing convention and prefix exemption
pub fn rotary_embedding<T>(
    positions: &[i64],
    query: RotaryBuffer<'_, T>,
    key: RotaryBuffer<'_, T>,
    head_size: usize,
    table: AngleTable<'_, T>,
    config: RotaryConfig,
) where
    T: Float + Send + Sync,
{
    let layout = HeadLayout {
        head_size,
        rot_dim: table.rot_dim(),
    };
    let geometry = LaunchGeometry::new(positions.len(), query.num_heads, layout.rot_dim);
    launch_rotary(
        &Standard::new(positions),
        query,
        key,
        table,
        layout,
        config,
        geometry,
    );
}

/// Apply rotary embeddings with per-token table offsets.
///
/// Token `t` reads table row `offsets[t] + positions[t]`. The number of
/// tokens is `offsets.len()`. `rot_dim` is explicit; the table is read with
/// `rot_dim / 2` columns per row.
///
/// With all offsets zero this is identical to [`rotary_embedding`].
#[allow(clippy::too_many_arguments)]
pub fn batched_rotary_embedding<T>(
    positions: &[i64],
    query: RotaryBuffer<'_, T>,
    key: RotaryBuffer<'_, T>,
    head_size: usize,
    table: AngleTable<'_, T>,
    config: RotaryConfig,
    rot_dim: usize,
    offsets: &[i64],
) where
    T: Float + Send + Sync,
{
    let layout = HeadLayout { head_size, rot_dim };
    let table = AngleTable::new(table.cos, table.sin, layout.embed_dim());
    let geometry = LaunchGeometry::new(offsets.len(), query.num_heads, rot_dim);
    launch_rotary(
        &Batched::new(positions, offsets),
        query,
        key,
        table,
        layout,
        config,
        geometry,
    );
}

/// Resolve the convention flags once and run the matching specialization.
///
/// Exposed so callers can pick their own [`LaunchGeometry`]; the result does
/// not depend on `geometry.block_dim`.
pub fn launch_rotary<T, C>(
    resolver: &C,
    query: RotaryBuffer<'_, T>,
    key: RotaryBuffer<'_, T>,
    table: AngleTable<'_, T>,
    layout: HeadLayout,
    config: RotaryConfig,
    geometry: LaunchGeometry,
) where
    T: Float + Send + Sync,
    C: CacheOffset,
{
    tracing::trace!(
        num_tokens = resolver.num_tokens(),
        num_heads = query.num_heads,
        num_kv_heads = key.num_heads,
        head_size = layout.head_size,
        rot_dim = layout.rot_dim,
        block_dim = geometry.block_dim,
        ?config,
        "rotary launch"
    );

    match (config.style, config.nope_first) {
        (RotaryStyle::Neox, false) => {
            applicator::launch::<T, Neox, C, false>(resolver, query, key, table, layout, geometry);
        }
        (RotaryStyle::Neox, true) => {
            applicator::launch::<T, Neox, C, true>(resolver, query, key, table, layout, geometry);
        }
        (RotaryStyle::Gptj, false) => {
            applicator::launch::<T, Gptj, C, false>(resolver, query, key, table, layout, geometry);
        }
        (RotaryStyle::Gptj, true) => {
            applicator::launch::<T, Gptj, C, true>(resolver, query, key, table, layout, geometry);
        }
    }
}
