// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Candle ↔ `CubeCL` buffer conversion utilities.
//!
//! ## Key Functions
//!
//! - [`candle_to_cubecl_handle`] - Contiguous f32 Candle tensor to raw bytes
//! - [`cubecl_to_candle_tensor`] - Raw `CubeCL` output back to a Candle tensor
//! - [`indices_to_cubecl_bytes`] - Host-side positions/offsets to u32 bytes
//! - [`has_cubecl_cuda_support`] - Check if the CUDA runtime is usable
//!
//! All conversions go through host memory; the rotary kernels mutate the
//! uploaded buffers in place and the result is read back once per tensor.

use crate::error::{Result, RotaryError};
use candle_core::{DType, Device, Tensor};

/// Check if `CubeCL` CUDA runtime support is available.
///
/// # Example
///
/// ```rust
/// use rotary_rs::kernels::cubecl::has_cubecl_cuda_support;
///
/// if has_cubecl_cuda_support() {
///     println!("CubeCL CUDA acceleration available!");
/// } else {
///     println!("Falling back to the rayon kernel");
/// }
/// ```
#[must_use]
pub fn has_cubecl_cuda_support() -> bool {
    // Candle's device probe stands in for a CubeCL runtime query
    matches!(Device::cuda_if_available(0), Ok(Device::Cuda(_)))
}

/// Convert a Candle tensor to raw bytes for a `CubeCL` buffer.
///
/// The tensor is made contiguous first (which may copy).
///
/// # Returns
///
/// A tuple of `(raw_data_bytes, shape, dtype)` to pass to `client.create`.
///
/// # Errors
///
/// Returns `DeviceNotAvailable` if the tensor is not on a CUDA device and
/// `UnsupportedDType` if it is not f32.
pub fn candle_to_cubecl_handle(tensor: &Tensor) -> Result<(Vec<u8>, Vec<usize>, DType)> {
    if !matches!(tensor.device(), Device::Cuda(_)) {
        return Err(RotaryError::DeviceNotAvailable(format!(
            "candle_to_cubecl_handle requires a CUDA tensor, got {:?}",
            tensor.device()
        )));
    }

    let tensor = tensor.contiguous()?;
    let shape = tensor.dims().to_vec();
    let dtype = tensor.dtype();

    // TODO: f16/bf16 buffers once the kernel is instantiated for them
    if dtype != DType::F32 {
        return Err(RotaryError::UnsupportedDType(dtype));
    }

    // For CUDA tensors, this requires a device-to-host copy
    let data: Vec<f32> = tensor.flatten_all()?.to_vec1()?;
    let bytes: Vec<u8> = data.iter().flat_map(|f| f.to_le_bytes()).collect();

    Ok((bytes, shape, dtype))
}

/// Convert a `CubeCL` f32 buffer back to a Candle tensor.
///
/// # Errors
///
/// Returns `DeviceNotAvailable` for a non-CUDA device and `ShapeMismatch`
/// if the byte count does not match `shape`.
pub fn cubecl_to_candle_tensor(bytes: &[u8], shape: &[usize], device: &Device) -> Result<Tensor> {
    if !matches!(device, Device::Cuda(_)) {
        return Err(RotaryError::DeviceNotAvailable(format!(
            "cubecl_to_candle_tensor requires a CUDA device, got {:?}",
            device
        )));
    }

    let num_elements: usize = shape.iter().product();
    let expected_bytes = num_elements * 4;
    if bytes.len() != expected_bytes {
        return Err(RotaryError::ShapeMismatch {
            expected: vec![expected_bytes],
            actual: vec![bytes.len()],
        });
    }

    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(Tensor::from_vec(data, shape, device)?)
}

/// Narrow validated table indices to the u32 layout the kernel reads.
///
/// Indices must already be non-negative and below the table row count.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn indices_to_cubecl_bytes(indices: &[i64]) -> Vec<u8> {
    indices
        .iter()
        .flat_map(|&i| (i as u32).to_le_bytes())
        .collect()
}
