//! # rotary-rs
//!
//! Parallel, in-place rotary position embedding (`RoPE`) for the query and key
//! projections of an attention layer.
//!
//! The crate has two layers:
//!
//! - [`kernels::rotary`]: the slice-level core. Rotates every head of every
//!   token in one data-parallel pass, in place, for both the block-split
//!   ("NeoX") and interleaved ("GPT-J") conventions, with optional prefix
//!   exemption and per-token angle table offsets.
//! - [`kernels::RotaryEmbedding`]: a [Candle](https://github.com/huggingface/candle)
//!   front end that builds the angle table, validates shapes and positions,
//!   and dispatches to the rayon kernel or, with the `cuda` feature, the
//!   `CubeCL` kernel.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rotary_rs::kernels::{RotaryEmbedding, RotaryStyle};
//! use candle_core::{Device, Tensor};
//!
//! let rope = RotaryEmbedding::new(128, 128, 4096, 10000.0, RotaryStyle::Neox, &Device::Cpu)?;
//! let (q, k) = rope.forward(&positions, &query, &key)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod kernels;

pub use error::{Result, RotaryError};
