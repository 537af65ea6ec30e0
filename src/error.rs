// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for rotary-rs.
//!
//! The slice-level kernels never return errors: they run under caller-held
//! preconditions. Everything here is raised by the tensor dispatch layer
//! before a kernel is launched.

use thiserror::Error;

/// Result type alias for rotary-rs operations.
pub type Result<T> = std::result::Result<T, RotaryError>;

/// Errors that can occur while preparing or launching a rotary kernel.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RotaryError {
    /// GPU kernel error.
    #[error("kernel error: {0}")]
    Kernel(String),

    /// Device not available.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    /// Shape mismatch.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Invalid configuration (head size, rotary dim, positions, offsets).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Element type not handled by the kernels.
    #[error("unsupported dtype: {0:?}")]
    UnsupportedDType(candle_core::DType),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}
