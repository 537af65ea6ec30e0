// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Element pairing for the two rotary conventions.
//!
//! For a rotation offset `r` in `[0, embed_dim)`:
//!
//! ```text
//! NeoX (block-split):  slots (r, r + embed_dim),  angle column r
//! GPT-J (interleaved): slots (2r, 2r + 1),        angle column r
//! ```
//!
//! The conventions are zero-sized types so the applicator is monomorphized
//! per convention and the inner loop carries no branch on the style.

use super::config::RotaryStyle;

/// Resolved slots for one rotation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairIndex {
    /// Slot receiving `x * cos - y * sin`.
    pub x: usize,
    /// Slot receiving `y * cos + x * sin`.
    pub y: usize,
    /// Column of the angle table row.
    pub column: usize,
}

/// A pairing convention.
pub trait Pairing: Send + Sync + 'static {
    /// The runtime tag for this convention.
    const STYLE: RotaryStyle;

    /// Slots and angle column for `rot_offset`, relative to the rotation window.
    fn resolve(rot_offset: usize, embed_dim: usize) -> PairIndex;
}

/// Block-split pairing.
#[derive(Debug, Clone, Copy)]
pub struct Neox;

/// Interleaved pairing.
#[derive(Debug, Clone, Copy)]
pub struct Gptj;

impl Pairing for Neox {
    const STYLE: RotaryStyle = RotaryStyle::Neox;

    #[inline(always)]
    fn resolve(rot_offset: usize, embed_dim: usize) -> PairIndex {
        PairIndex {
            x: rot_offset,
            y: embed_dim + rot_offset,
            column: rot_offset,
        }
    }
}

impl Pairing for Gptj {
    const STYLE: RotaryStyle = RotaryStyle::Gptj;

    #[inline(always)]
    fn resolve(rot_offset: usize, _embed_dim: usize) -> PairIndex {
        PairIndex {
            x: 2 * rot_offset,
            y: 2 * rot_offset + 1,
            column: rot_offset,
        }
    }
}
