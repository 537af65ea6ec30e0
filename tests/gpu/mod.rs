//! GPU-specific tests for rotary-rs.
//!
//! Tests here need the `cuda` feature and a working CUDA device. They skip
//! (and pass) when either is missing.
//!
//! ## Running GPU Tests
//!
//! ```bash
//! cargo test --features cuda --test integration gpu::
//! ```

pub mod rotary;

/// Check if a CUDA GPU is available for testing.
///
/// Creates a device and runs one reduction to confirm it actually computes.
#[cfg(feature = "cuda")]
pub fn is_gpu_available() -> bool {
    use candle_core::Device;

    match Device::new_cuda(0) {
        Ok(device) => match candle_core::Tensor::ones((2, 2), candle_core::DType::F32, &device)
            .and_then(|t| t.sum_all())
        {
            Ok(_) => {
                tracing::info!("GPU detected and functional: {:?}", device);
                true
            }
            Err(e) => {
                tracing::warn!("GPU detected but tensor operations failed: {}", e);
                false
            }
        },
        Err(e) => {
            tracing::warn!("No CUDA GPU available: {}", e);
            false
        }
    }
}

/// Skip a test if GPU is not available.
///
/// This macro works with `Result<(), _>` return types by returning `Ok(())`.
#[cfg(feature = "cuda")]
#[macro_export]
macro_rules! require_gpu {
    () => {
        if !crate::gpu::is_gpu_available() {
            eprintln!("SKIP: Test requires CUDA GPU - use 'cargo test --features cuda'");
            return Ok(());
        }
    };
}

#[cfg(not(feature = "cuda"))]
pub fn is_gpu_available() -> bool {
    false
}

/// Fallback macro that skips tests when CUDA feature is not enabled.
#[cfg(not(feature = "cuda"))]
#[macro_export]
macro_rules! require_gpu {
    () => {
        eprintln!("SKIP: CUDA feature not enabled - use 'cargo test --features cuda'");
        return Ok(());
    };
}
