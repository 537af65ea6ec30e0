// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Rotary Position Embedding (`RoPE`) on Candle tensors.
//!
//! This is the dispatch layer in front of the slice kernels in
//! [`crate::kernels::rotary`]. It owns the angle table, derives head counts
//! from tensor shapes, validates every kernel precondition, and routes to the
//! CubeCL kernel on CUDA devices or the rayon kernel everywhere else.
//!
//! ## Accepted layouts
//!
//! With `positions` of shape `P` (`[num_tokens]` or `[batch, seq_len]`), query
//! and key must have shape `P ++ [num_heads * head_size]` or
//! `P ++ [num_heads, head_size]`.
//!
//! ## Implementation Notes
//!
//! - Pre-computes cos/sin caches up to `max_position` once
//! - Rotates `rot_dim <= head_size` elements per head; the rest pass through
//! - `forward_batched` reads row `offset + position`, which is how tokens with
//!   different linear scaling factors share one call

use candle_core::{DType, Device, Tensor, WithDType};
use num_traits::Float;

use crate::error::{Result, RotaryError};
use crate::kernels::rotary::{self, AngleTable, RotaryBuffer, RotaryConfig, RotaryStyle};
use crate::kernels::table::AngleCache;

/// Rotary position embedding.
///
/// Applies rotary embeddings to query and key tensors for position encoding.
#[derive(Debug, Clone)]
pub struct RotaryEmbedding {
    /// Cosine/sine caches `[rows, rot_dim / 2]`
    cache: AngleCache,
    /// Elements per head
    head_size: usize,
    /// Rotated elements per head
    rot_dim: usize,
    /// Positions per scaling segment
    max_position: usize,
    /// Pairing convention and prefix exemption
    config: RotaryConfig,
}

/// Token/head extents derived from one query or key tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadExtents {
    num_tokens: usize,
    num_heads: usize,
}

impl RotaryEmbedding {
    /// Create rotary embeddings.
    ///
    /// # Arguments
    /// * `head_size` - Dimension per attention head
    /// * `rot_dim` - Rotated elements per head (even, at most `head_size`)
    /// * `max_position` - Maximum position to cache
    /// * `base` - Base for frequency computation (typically 10000)
    /// * `style` - Pairing convention
    /// * `device` - Device for the caches
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `rot_dim` is odd, zero, or above `head_size`.
    pub fn new(
        head_size: usize,
        rot_dim: usize,
        max_position: usize,
        base: f32,
        style: RotaryStyle,
        device: &Device,
    ) -> Result<Self> {
        Self::with_linear_scaling(head_size, rot_dim, max_position, base, style, &[1.0], device)
    }

    /// Create rotary embeddings with one sub-table per linear scaling factor.
    ///
    /// Use [`RotaryEmbedding::offset_for`] to get the table offset of a
    /// factor and pass it per token to [`RotaryEmbedding::forward_batched`].
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a bad `rot_dim` or scaling factor.
    pub fn with_linear_scaling(
        head_size: usize,
        rot_dim: usize,
        max_position: usize,
        base: f32,
        style: RotaryStyle,
        scaling_factors: &[f32],
        device: &Device,
    ) -> Result<Self> {
        if rot_dim > head_size {
            return Err(RotaryError::InvalidConfig(format!(
                "rot_dim {rot_dim} exceeds head_size {head_size}"
            )));
        }
        let cache = AngleCache::linear_scaled(rot_dim, max_position, base, scaling_factors, device)?;

        Ok(Self {
            cache,
            head_size,
            rot_dim,
            max_position,
            config: RotaryConfig::default().with_style(style),
        })
    }

    /// Rotate the trailing `rot_dim` elements of each head instead of the
    /// leading ones.
    #[must_use]
    pub fn with_nope_first(mut self) -> Self {
        self.config = self.config.with_nope_first();
        self
    }

    /// Elements per head.
    #[must_use]
    pub const fn head_size(&self) -> usize {
        self.head_size
    }

    /// Rotated elements per head.
    #[must_use]
    pub const fn rot_dim(&self) -> usize {
        self.rot_dim
    }

    /// Positions covered by the unscaled table.
    #[must_use]
    pub const fn max_position(&self) -> usize {
        self.max_position
    }

    /// Kernel configuration used by `forward`.
    #[must_use]
    pub const fn config(&self) -> RotaryConfig {
        self.config
    }

    /// The packed angle cache.
    #[must_use]
    pub const fn cache(&self) -> &AngleCache {
        &self.cache
    }

    /// Table offset of a scaling factor's sub-table.
    #[must_use]
    pub fn offset_for(&self, scaling_factor: f32) -> Option<usize> {
        self.cache.segment(scaling_factor).map(|s| s.offset)
    }

    /// Apply rotary embedding to query and key tensors.
    ///
    /// # Arguments
    /// * `positions` - Position indices `[num_tokens]` or `[batch, seq_len]`
    /// * `query` - Query tensor, `num_heads` heads per token
    /// * `key` - Key tensor, `num_kv_heads` heads per token
    ///
    /// # Returns
    /// Tuple of (`rotated_query`, `rotated_key`) with the input shapes
    ///
    /// # Errors
    /// Returns an error if shapes are inconsistent, a position is outside the
    /// table, or the dtype is not a float type.
    pub fn forward(
        &self,
        positions: &Tensor,
        query: &Tensor,
        key: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        self.dispatch(positions, query, key, None)
    }

    /// Apply rotary embedding with a per-token table offset.
    ///
    /// Token `t` reads table row `offsets[t] + positions[t]`.
    ///
    /// # Errors
    /// As [`RotaryEmbedding::forward`], plus a mismatch between the offset and
    /// position counts.
    pub fn forward_batched(
        &self,
        positions: &Tensor,
        query: &Tensor,
        key: &Tensor,
        offsets: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        self.dispatch(positions, query, key, Some(offsets))
    }

    fn dispatch(
        &self,
        positions: &Tensor,
        query: &Tensor,
        key: &Tensor,
        offsets: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let q_ext = self.head_extents(positions, query)?;
        let k_ext = self.head_extents(positions, key)?;
        if query.dtype() != key.dtype() {
            return Err(RotaryError::InvalidConfig(format!(
                "query dtype {:?} differs from key dtype {:?}",
                query.dtype(),
                key.dtype()
            )));
        }

        let positions = index_vec(positions)?;
        let offsets = offsets.map(index_vec).transpose()?;
        self.check_rows(&positions, offsets.as_deref())?;

        #[cfg(feature = "cuda")]
        {
            if query.device().is_cuda() && query.dtype() == DType::F32 {
                tracing::debug!("Using CubeCL rotary path for Q shape {:?}", query.shape());
                return rotary::cubecl::launch_rotary_kernel(
                    &positions,
                    offsets.as_deref(),
                    query,
                    q_ext.num_heads,
                    key,
                    k_ext.num_heads,
                    &self.cache,
                    self.head_size,
                    self.rot_dim,
                    self.config,
                );
            }
        }

        tracing::debug!(
            "Using CPU rotary path for Q shape {:?}, dtype {:?}",
            query.shape(),
            query.dtype()
        );
        let offsets = offsets.as_deref();
        match query.dtype() {
            DType::F32 => self.forward_cpu::<f32>(&positions, offsets, query, key, q_ext, k_ext),
            DType::F64 => self.forward_cpu::<f64>(&positions, offsets, query, key, q_ext, k_ext),
            DType::F16 => {
                self.forward_cpu::<half::f16>(&positions, offsets, query, key, q_ext, k_ext)
            }
            DType::BF16 => {
                self.forward_cpu::<half::bf16>(&positions, offsets, query, key, q_ext, k_ext)
            }
            dtype => Err(RotaryError::UnsupportedDType(dtype)),
        }
    }

    /// CPU path: copy out, rotate in place with the rayon kernel, copy back.
    fn forward_cpu<T>(
        &self,
        positions: &[i64],
        offsets: Option<&[i64]>,
        query: &Tensor,
        key: &Tensor,
        q_ext: HeadExtents,
        k_ext: HeadExtents,
    ) -> Result<(Tensor, Tensor)>
    where
        T: WithDType + Float + Send + Sync,
    {
        let mut q_data: Vec<T> = query.flatten_all()?.to_vec1()?;
        let mut k_data: Vec<T> = key.flatten_all()?.to_vec1()?;
        let cos: Vec<T> = self.cache.cos.to_dtype(T::DTYPE)?.flatten_all()?.to_vec1()?;
        let sin: Vec<T> = self.cache.sin.to_dtype(T::DTYPE)?.flatten_all()?.to_vec1()?;

        let q_buf = RotaryBuffer::contiguous(&mut q_data, q_ext.num_heads, self.head_size);
        let k_buf = RotaryBuffer::contiguous(&mut k_data, k_ext.num_heads, self.head_size);
        let table = AngleTable::new(&cos, &sin, self.rot_dim / 2);

        match offsets {
            Some(offsets) => rotary::batched_rotary_embedding(
                positions,
                q_buf,
                k_buf,
                self.head_size,
                table,
                self.config,
                self.rot_dim,
                offsets,
            ),
            None => rotary::rotary_embedding(
                positions,
                q_buf,
                k_buf,
                self.head_size,
                table,
                self.config,
            ),
        }

        let q_out = Tensor::from_vec(q_data, query.shape().clone(), query.device())?;
        let k_out = Tensor::from_vec(k_data, key.shape().clone(), key.device())?;
        Ok((q_out, k_out))
    }

    /// Reference implementation composed of Candle primitives.
    ///
    /// Slower than [`RotaryEmbedding::forward`] but independent of the kernel
    /// index arithmetic; used to cross-check the kernels.
    ///
    /// # Errors
    /// Same validation as `forward_batched`.
    pub fn forward_reference(
        &self,
        positions: &Tensor,
        query: &Tensor,
        key: &Tensor,
        offsets: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let q_ext = self.head_extents(positions, query)?;
        let k_ext = self.head_extents(positions, key)?;

        let positions_vec = index_vec(positions)?;
        let offsets_vec = offsets.map(index_vec).transpose()?;
        self.check_rows(&positions_vec, offsets_vec.as_deref())?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rows: Vec<u32> = match &offsets_vec {
            Some(offsets) => positions_vec
                .iter()
                .zip(offsets)
                .map(|(&p, &o)| (p + o) as u32)
                .collect(),
            None => positions_vec.iter().map(|&p| p as u32).collect(),
        };
        let rows = Tensor::from_vec(rows, (q_ext.num_tokens,), query.device())?;

        // [num_tokens, 1, rot_dim / 2]
        let cos = self
            .cache
            .cos
            .to_device(query.device())?
            .index_select(&rows, 0)?
            .to_dtype(query.dtype())?
            .unsqueeze(1)?;
        let sin = self
            .cache
            .sin
            .to_device(query.device())?
            .index_select(&rows, 0)?
            .to_dtype(query.dtype())?
            .unsqueeze(1)?;

        let q_rotated = self.apply_rotary(query, q_ext, &cos, &sin)?;
        let k_rotated = self.apply_rotary(key, k_ext, &cos, &sin)?;
        Ok((q_rotated, k_rotated))
    }

    fn apply_rotary(
        &self,
        x: &Tensor,
        ext: HeadExtents,
        cos: &Tensor,
        sin: &Tensor,
    ) -> Result<Tensor> {
        let half_dim = self.rot_dim / 2;
        let window = self.config.window_start(self.head_size, self.rot_dim);
        let pass_len = self.head_size - self.rot_dim;

        let heads = x.reshape((ext.num_tokens, ext.num_heads, self.head_size))?;
        let rot = heads.narrow(2, window, self.rot_dim)?;

        let rotated = match self.config.style {
            RotaryStyle::Neox => {
                // Split into two halves
                let x1 = rot.narrow(2, 0, half_dim)?;
                let x2 = rot.narrow(2, half_dim, half_dim)?;

                // Apply rotation: [x1, x2] -> [x1*cos - x2*sin, x2*cos + x1*sin]
                let rotated_x1 = (x1.broadcast_mul(cos)? - x2.broadcast_mul(sin)?)?;
                let rotated_x2 = (x2.broadcast_mul(cos)? + x1.broadcast_mul(sin)?)?;
                Tensor::cat(&[&rotated_x1, &rotated_x2], 2)?
            }
            RotaryStyle::Gptj => {
                // Adjacent pairs: [.., half_dim, 2]
                let pairs = rot.reshape((ext.num_tokens, ext.num_heads, half_dim, 2))?;
                let x1 = pairs.narrow(3, 0, 1)?.squeeze(3)?;
                let x2 = pairs.narrow(3, 1, 1)?.squeeze(3)?;

                let rotated_x1 = (x1.broadcast_mul(cos)? - x2.broadcast_mul(sin)?)?;
                let rotated_x2 = (x2.broadcast_mul(cos)? + x1.broadcast_mul(sin)?)?;
                Tensor::stack(&[&rotated_x1, &rotated_x2], 3)?.reshape((
                    ext.num_tokens,
                    ext.num_heads,
                    self.rot_dim,
                ))?
            }
        };

        let out = if pass_len == 0 {
            rotated
        } else if self.config.nope_first {
            let pass = heads.narrow(2, 0, pass_len)?;
            Tensor::cat(&[&pass, &rotated], 2)?
        } else {
            let pass = heads.narrow(2, self.rot_dim, pass_len)?;
            Tensor::cat(&[&rotated, &pass], 2)?
        };

        Ok(out.reshape(x.shape().clone())?)
    }

    /// Derive `num_tokens`/`num_heads` for a query or key tensor.
    fn head_extents(&self, positions: &Tensor, x: &Tensor) -> Result<HeadExtents> {
        let pos_dims = positions.dims();
        if pos_dims.is_empty() || pos_dims.len() > 2 {
            return Err(RotaryError::InvalidConfig(format!(
                "positions must be [num_tokens] or [batch, seq_len], got {pos_dims:?}"
            )));
        }

        let dims = x.dims();
        if dims.len() <= pos_dims.len() || &dims[..pos_dims.len()] != pos_dims {
            let mut expected = pos_dims.to_vec();
            expected.push(self.head_size);
            return Err(RotaryError::ShapeMismatch {
                expected,
                actual: dims.to_vec(),
            });
        }

        let hidden: usize = dims[pos_dims.len()..].iter().product();
        if hidden == 0 {
            return Err(RotaryError::InvalidConfig(format!(
                "tensor of shape {dims:?} has no heads"
            )));
        }
        if hidden % self.head_size != 0 {
            return Err(RotaryError::InvalidConfig(format!(
                "head dimension extent {hidden} is not a multiple of head_size {}",
                self.head_size
            )));
        }

        Ok(HeadExtents {
            num_tokens: positions.elem_count(),
            num_heads: hidden / self.head_size,
        })
    }

    /// Every table row touched must exist.
    fn check_rows(&self, positions: &[i64], offsets: Option<&[i64]>) -> Result<()> {
        let rows = self.cache.rows();
        let limit = i64::try_from(rows).unwrap_or(i64::MAX);

        if let Some(offsets) = offsets {
            if offsets.len() != positions.len() {
                return Err(RotaryError::ShapeMismatch {
                    expected: vec![positions.len()],
                    actual: vec![offsets.len()],
                });
            }
            for (token, (&p, &o)) in positions.iter().zip(offsets).enumerate() {
                if p < 0 || o < 0 || p.saturating_add(o) >= limit {
                    return Err(RotaryError::InvalidConfig(format!(
                        "token {token}: offset {o} + position {p} outside table of {rows} rows"
                    )));
                }
            }
        } else {
            let max_position = i64::try_from(self.max_position)
                .unwrap_or(i64::MAX)
                .min(limit);
            for (token, &p) in positions.iter().enumerate() {
                if p < 0 || p >= max_position {
                    return Err(RotaryError::InvalidConfig(format!(
                        "token {token}: position {p} outside [0, {max_position})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Flatten an integer index tensor to `i64`s on the host.
/// Positions or offsets as `i64`; float indices are rejected, not truncated.
fn index_vec(t: &Tensor) -> Result<Vec<i64>> {
    if !t.dtype().is_int() {
        return Err(RotaryError::UnsupportedDType(t.dtype()));
    }
    Ok(t.flatten_all()?.to_dtype(DType::I64)?.to_vec1()?)
}
