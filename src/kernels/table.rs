// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Angle table construction.
//!
//! Produces the dense cosine/sine tables consumed by the rotary kernels:
//!
//! ```text
//! inv_freq[i] = 1 / base^(2i / rot_dim)        i in [0, rot_dim / 2)
//! theta[p, i] = (p / scale) * inv_freq[i]
//! cos[p, i]   = cos(theta[p, i]),  sin[p, i] = sin(theta[p, i])
//! ```
//!
//! [`AngleCache::linear_scaled`] packs one sub-table per linear scaling
//! factor into a single table. Factor `s` covers `max_position * s` rows, and
//! its first row is recorded so the batched kernel can address it with a
//! per-token table offset.

use candle_core::{Device, Tensor};

use crate::error::{Result, RotaryError};

/// One scaling factor's row range in a packed table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingSegment {
    /// Linear scaling factor.
    pub factor: f32,
    /// First row of this factor's sub-table.
    pub offset: usize,
    /// Rows in this factor's sub-table.
    pub len: usize,
}

/// Cosine/sine tables `[rows, rot_dim / 2]` plus their segment map.
#[derive(Debug, Clone)]
pub struct AngleCache {
    /// Cosine table.
    pub cos: Tensor,
    /// Sine table.
    pub sin: Tensor,
    /// Row ranges, one per scaling factor, in packing order.
    pub segments: Vec<ScalingSegment>,
}

impl AngleCache {
    /// Unscaled table with `max_position` rows.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `rot_dim` is zero or odd.
    pub fn new(rot_dim: usize, max_position: usize, base: f32, device: &Device) -> Result<Self> {
        Self::linear_scaled(rot_dim, max_position, base, &[1.0], device)
    }

    /// Packed table with one sub-table per linear scaling factor.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `rot_dim` is zero or odd, if no factor is
    /// given, or if a factor is not a positive finite number.
    pub fn linear_scaled(
        rot_dim: usize,
        max_position: usize,
        base: f32,
        factors: &[f32],
        device: &Device,
    ) -> Result<Self> {
        if rot_dim == 0 || rot_dim % 2 != 0 {
            return Err(RotaryError::InvalidConfig(format!(
                "rot_dim must be even and non-zero, got {rot_dim}"
            )));
        }
        if factors.is_empty() {
            return Err(RotaryError::InvalidConfig(
                "at least one scaling factor is required".to_string(),
            ));
        }

        let inv_freq = inv_freq(rot_dim, base, device)?;
        let mut cos_parts = Vec::with_capacity(factors.len());
        let mut sin_parts = Vec::with_capacity(factors.len());
        let mut segments = Vec::with_capacity(factors.len());
        let mut offset = 0;

        for &factor in factors {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(RotaryError::InvalidConfig(format!(
                    "scaling factor must be positive and finite, got {factor}"
                )));
            }

            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let len = (max_position as f32 * factor) as usize;

            #[allow(clippy::cast_precision_loss)]
            let positions: Vec<f32> = (0..len).map(|p| p as f32 / factor).collect();
            let positions = Tensor::from_vec(positions, (len, 1), device)?;

            // [len, rot_dim / 2]
            let freqs = positions.matmul(&inv_freq)?;
            cos_parts.push(freqs.cos()?);
            sin_parts.push(freqs.sin()?);

            segments.push(ScalingSegment {
                factor,
                offset,
                len,
            });
            offset += len;
        }

        tracing::debug!(
            rot_dim,
            rows = offset,
            segments = segments.len(),
            "built rotary angle cache"
        );

        Ok(Self {
            cos: Tensor::cat(&cos_parts, 0)?,
            sin: Tensor::cat(&sin_parts, 0)?,
            segments,
        })
    }

    /// Total rows across all segments.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }

    /// Segment for a scaling factor, if it was packed.
    #[must_use]
    pub fn segment(&self, factor: f32) -> Option<ScalingSegment> {
        self.segments
            .iter()
            .copied()
            .find(|s| s.factor.to_bits() == factor.to_bits())
    }
}

/// `[1, rot_dim / 2]` inverse frequencies.
fn inv_freq(rot_dim: usize, base: f32, device: &Device) -> Result<Tensor> {
    #[allow(clippy::cast_precision_loss)]
    let inv_freq: Vec<f32> = (0..rot_dim)
        .step_by(2)
        .map(|i| 1.0 / base.powf(i as f32 / rot_dim as f32))
        .collect();
    Ok(Tensor::from_vec(inv_freq, (1, rot_dim / 2), device)?)
}
