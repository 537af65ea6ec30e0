// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Rotary embedding `CubeCL` kernel.
//!
//! Grid: (num_tokens, 1, 1)
//! Block: (min(num_heads * rot_dim / 2, MAX_BLOCK_SIZE), 1, 1)
//!
//! Same task decomposition as the CPU applicator: each unit walks the
//! flattened `(head, rot_offset)` list of its token with stride `CUBE_DIM_X`.
//! The pairing convention, prefix exemption and offset mode are `comptime`,
//! so each of the combinations compiles to its own branch-free kernel.

use candle_core::Tensor;
use cubecl::prelude::*;
use cubecl_cuda::CudaRuntime;

use super::config::{LaunchGeometry, RotaryConfig};
use crate::error::{Result, RotaryError};
use crate::kernels::cubecl::interop::{
    candle_to_cubecl_handle, cubecl_to_candle_tensor, indices_to_cubecl_bytes,
};
use crate::kernels::table::AngleCache;

/// Rotate this unit's share of the heads of one token.
#[cube]
#[allow(clippy::too_many_arguments)]
fn rotate_heads<F: Float>(
    buf: &mut Array<F>,
    cos_cache: &Array<F>,
    sin_cache: &Array<F>,
    token_base: usize,
    cache_base: usize,
    num_heads: u32,
    head_size: u32,
    rot_dim: u32,
    #[comptime] is_neox: bool,
    #[comptime] nope_first: bool,
) {
    let embed_dim = (rot_dim / 2) as usize;
    let num_tasks = (num_heads as usize) * embed_dim;
    let block_size = CUBE_DIM_X as usize;

    let mut window = 0usize;
    if nope_first {
        window = (head_size - rot_dim) as usize;
    }

    let mut i = UNIT_POS_X as usize;
    while i < num_tasks {
        let head_idx = i / embed_dim;
        let rot_offset = i % embed_dim;
        let head_base = token_base + head_idx * (head_size as usize) + window;

        let mut x_idx = rot_offset;
        let mut y_idx = embed_dim + rot_offset;
        if !is_neox {
            x_idx = 2 * rot_offset;
            y_idx = 2 * rot_offset + 1;
        }

        let cos_val = cos_cache[cache_base + rot_offset];
        let sin_val = sin_cache[cache_base + rot_offset];

        let x = buf[head_base + x_idx];
        let y = buf[head_base + y_idx];
        buf[head_base + x_idx] = x * cos_val - y * sin_val;
        buf[head_base + y_idx] = y * cos_val + x * sin_val;

        i = i + block_size;
    }
}

/// One cube per token; rotates every query and key head in place.
#[cube(launch)]
#[allow(clippy::too_many_arguments)]
fn rotary_embedding_kernel<F: Float>(
    positions: &Array<u32>, // [num_tokens]
    offsets: &Array<u32>,   // [num_tokens] when batched
    query: &mut Array<F>,   // [num_tokens, query_stride]
    key: &mut Array<F>,     // [num_tokens, key_stride]
    cos_cache: &Array<F>,   // [rows, rot_dim/2]
    sin_cache: &Array<F>,   // [rows, rot_dim/2]
    query_stride: u32,
    key_stride: u32,
    num_heads: u32,
    num_kv_heads: u32,
    head_size: u32,
    rot_dim: u32,
    #[comptime] is_neox: bool,
    #[comptime] nope_first: bool,
    #[comptime] batched: bool,
) {
    let token = CUBE_POS_X as usize;

    let mut row = positions[token] as usize;
    if batched {
        row = row + offsets[token] as usize;
    }
    let cache_base = row * ((rot_dim / 2) as usize);

    rotate_heads::<F>(
        query,
        cos_cache,
        sin_cache,
        token * (query_stride as usize),
        cache_base,
        num_heads,
        head_size,
        rot_dim,
        is_neox,
        nope_first,
    );
    rotate_heads::<F>(
        key,
        cos_cache,
        sin_cache,
        token * (key_stride as usize),
        cache_base,
        num_kv_heads,
        head_size,
        rot_dim,
        is_neox,
        nope_first,
    );
}

/// Upload, rotate on the GPU, and read back query and key.
///
/// Positions and offsets must already be validated against the table.
#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation)]
pub(crate) fn launch_rotary_kernel(
    positions: &[i64],
    offsets: Option<&[i64]>,
    query: &Tensor,
    num_heads: usize,
    key: &Tensor,
    num_kv_heads: usize,
    cache: &AngleCache,
    head_size: usize,
    rot_dim: usize,
    config: RotaryConfig,
) -> Result<(Tensor, Tensor)> {
    let num_tokens = offsets.map_or(positions.len(), <[i64]>::len);
    if num_tokens == 0 {
        return Ok((query.clone(), key.clone()));
    }

    let (q_bytes, q_shape, _) = candle_to_cubecl_handle(query)?;
    let (k_bytes, k_shape, _) = candle_to_cubecl_handle(key)?;
    let (cos_bytes, _, _) = candle_to_cubecl_handle(&cache.cos.to_device(query.device())?)?;
    let (sin_bytes, _, _) = candle_to_cubecl_handle(&cache.sin.to_device(query.device())?)?;
    let pos_bytes = indices_to_cubecl_bytes(positions);
    let off_bytes = indices_to_cubecl_bytes(offsets.unwrap_or(&[0]));

    let q_elements = q_bytes.len() / 4;
    let k_elements = k_bytes.len() / 4;
    let cache_elements = cos_bytes.len() / 4;
    let off_elements = off_bytes.len() / 4;

    let device = cubecl_cuda::CudaDevice::new(0);
    let client = CudaRuntime::client(&device);

    let pos_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(pos_bytes));
    let off_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(off_bytes));
    let q_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(q_bytes));
    let k_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(k_bytes));
    let cos_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(cos_bytes));
    let sin_handle = client.create(cubecl::bytes::Bytes::from_bytes_vec(sin_bytes));

    let geometry = LaunchGeometry::new(num_tokens, num_heads, rot_dim);
    let cube_count = CubeCount::Static(geometry.grid_dim, 1, 1);
    let cube_dim = CubeDim::new(&client, geometry.block_dim as usize);

    tracing::debug!(
        grid = geometry.grid_dim,
        block = geometry.block_dim,
        ?config,
        "launching rotary_embedding_kernel"
    );

    // SAFETY: Handles are valid and sized from the uploaded byte buffers
    unsafe {
        rotary_embedding_kernel::launch::<f32, CudaRuntime>(
            &client,
            cube_count,
            cube_dim,
            ArrayArg::from_raw_parts::<u32>(&pos_handle, positions.len(), 1),
            ArrayArg::from_raw_parts::<u32>(&off_handle, off_elements, 1),
            ArrayArg::from_raw_parts::<f32>(&q_handle, q_elements, 1),
            ArrayArg::from_raw_parts::<f32>(&k_handle, k_elements, 1),
            ArrayArg::from_raw_parts::<f32>(&cos_handle, cache_elements, 1),
            ArrayArg::from_raw_parts::<f32>(&sin_handle, cache_elements, 1),
            ScalarArg::new((num_heads * head_size) as u32),
            ScalarArg::new((num_kv_heads * head_size) as u32),
            ScalarArg::new(num_heads as u32),
            ScalarArg::new(num_kv_heads as u32),
            ScalarArg::new(head_size as u32),
            ScalarArg::new(rot_dim as u32),
            config.style.is_neox(),
            config.nope_first,
            offsets.is_some(),
        )
        .map_err(|e| RotaryError::Kernel(format!("rotary_embedding_kernel launch failed: {e}")))?;
    }

    let q_out = client.read_one(q_handle);
    let k_out = client.read_one(k_handle);
    Ok((
        cubecl_to_candle_tensor(&q_out, &q_shape, query.device())?,
        cubecl_to_candle_tensor(&k_out, &k_shape, key.device())?,
    ))
}
