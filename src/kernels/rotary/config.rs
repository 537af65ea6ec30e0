// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Configuration for rotary embedding kernels.
//!
//! Two things are configured per call:
//! - [`RotaryConfig`]: which pairing convention to use and whether the
//!   leading non-rotated span of each head is skipped
//! - [`LaunchGeometry`]: how the work is split into per-token groups and how
//!   many cooperating threads each group gets

/// Maximum threads per token group.
///
/// Matches the per-block cap used by the CUDA launch. Workloads larger than
/// this are covered by the strided task loop inside each group.
pub const MAX_BLOCK_SIZE: u32 = 512;

/// Element pairing convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotaryStyle {
    /// Block-split ("GPT-NeoX"): slot `r` pairs with `r + rot_dim / 2`.
    #[default]
    Neox,
    /// Interleaved ("GPT-J"): slot `2r` pairs with `2r + 1`.
    Gptj,
}

impl RotaryStyle {
    /// Build from the `is_neox` flag used by most model configs.
    #[must_use]
    pub const fn from_is_neox(is_neox: bool) -> Self {
        if is_neox {
            Self::Neox
        } else {
            Self::Gptj
        }
    }

    /// Whether this is the block-split convention.
    #[must_use]
    pub const fn is_neox(self) -> bool {
        matches!(self, Self::Neox)
    }
}

/// Per-call rotary configuration.
///
/// # Example
///
/// ```rust
/// use rotary_rs::kernels::rotary::{RotaryConfig, RotaryStyle};
///
/// // Default: block-split pairing, rotate the leading `rot_dim` elements
/// let config = RotaryConfig::default();
/// assert_eq!(config.style, RotaryStyle::Neox);
///
/// // Interleaved pairing on the trailing `rot_dim` elements
/// let config = RotaryConfig::gptj().with_nope_first();
/// assert!(config.nope_first);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RotaryConfig {
    /// Pairing convention.
    pub style: RotaryStyle,

    /// Skip the leading `head_size - rot_dim` elements of every head and
    /// rotate the trailing `rot_dim` instead.
    pub nope_first: bool,
}

impl RotaryConfig {
    /// Block-split pairing.
    #[must_use]
    pub const fn neox() -> Self {
        Self {
            style: RotaryStyle::Neox,
            nope_first: false,
        }
    }

    /// Interleaved pairing.
    #[must_use]
    pub const fn gptj() -> Self {
        Self {
            style: RotaryStyle::Gptj,
            nope_first: false,
        }
    }

    /// Rotate the trailing `rot_dim` elements of each head.
    #[must_use]
    pub const fn with_nope_first(mut self) -> Self {
        self.nope_first = true;
        self
    }

    /// Set the pairing convention.
    #[must_use]
    pub const fn with_style(mut self, style: RotaryStyle) -> Self {
        self.style = style;
        self
    }

    /// Offset of the rotation window inside a head.
    #[must_use]
    pub const fn window_start(&self, head_size: usize, rot_dim: usize) -> usize {
        if self.nope_first {
            head_size - rot_dim
        } else {
            0
        }
    }
}

/// Launch geometry: one group per token, `block_dim` threads per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Number of token groups.
    pub grid_dim: u32,
    /// Threads per group.
    pub block_dim: u32,
}

impl LaunchGeometry {
    /// Geometry for `num_tokens` tokens with `num_heads` query heads.
    ///
    /// Threads per group is `min(num_heads * rot_dim / 2, MAX_BLOCK_SIZE)`,
    /// never less than one.
    #[must_use]
    pub fn new(num_tokens: usize, num_heads: usize, rot_dim: usize) -> Self {
        Self::with_max_block(num_tokens, num_heads, rot_dim, MAX_BLOCK_SIZE)
    }

    /// Same as [`LaunchGeometry::new`] with a custom thread cap.
    ///
    /// # Panics
    ///
    /// Panics if `max_block` is zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_max_block(
        num_tokens: usize,
        num_heads: usize,
        rot_dim: usize,
        max_block: u32,
    ) -> Self {
        assert!(max_block > 0, "max_block must be non-zero");
        let work = num_heads * (rot_dim / 2);
        let block_dim = work.min(max_block as usize).max(1) as u32;
        Self {
            grid_dim: num_tokens as u32,
            block_dim,
        }
    }

    /// Number of strided passes a thread makes over `num_tasks` tasks.
    #[must_use]
    pub const fn passes(&self, num_tasks: usize) -> usize {
        num_tasks.div_ceil(self.block_dim as usize)
    }
}
