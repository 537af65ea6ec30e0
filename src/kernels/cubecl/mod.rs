// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! `CubeCL` runtime glue shared by the GPU kernels.
//!
//! The rotary kernel itself lives in [`crate::kernels::rotary::cubecl`]; this
//! module only moves data between Candle tensors and `CubeCL` buffers.

pub mod interop;

pub use interop::{
    candle_to_cubecl_handle, cubecl_to_candle_tensor, has_cubecl_cuda_support,
    indices_to_cubecl_bytes,
};
