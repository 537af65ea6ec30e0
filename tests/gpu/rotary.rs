//! Rotary embedding GPU tests.
//!
//! The CubeCL kernel must agree with the CPU path for every convention,
//! for the batched form and for head counts past one block's thread cap.

#![allow(unreachable_code)]

use anyhow::Result;
use candle_core::{Device, Tensor};

use rotary_rs::kernels::rotary::RotaryStyle;
use rotary_rs::kernels::RotaryEmbedding;

use crate::helpers::ValidationUtils;

fn max_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    Ok(ValidationUtils::max_abs_error(
        &a.to_device(&Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?,
        &b.to_device(&Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?,
    ))
}

#[test]
fn test_rotary_gpu_matches_cpu() -> Result<()> {
    crate::require_gpu!();

    let gpu = Device::new_cuda(0)?;
    let cpu = Device::Cpu;

    for style in [RotaryStyle::Neox, RotaryStyle::Gptj] {
        for nope_first in [false, true] {
            let mut rope_cpu = RotaryEmbedding::new(128, 64, 512, 10000.0, style, &cpu)?;
            let mut rope_gpu = RotaryEmbedding::new(128, 64, 512, 10000.0, style, &gpu)?;
            if nope_first {
                rope_cpu = rope_cpu.with_nope_first();
                rope_gpu = rope_gpu.with_nope_first();
            }

            let positions: Vec<i64> = (0..64).map(|t| (t * 7) % 512).collect();
            let positions = Tensor::new(positions.as_slice(), &cpu)?;
            // 40 heads x 32 pairs exceeds the 512 thread cap
            let q = Tensor::randn(0f32, 1.0, (64, 40, 128), &cpu)?;
            let k = Tensor::randn(0f32, 1.0, (64, 8, 128), &cpu)?;

            let (q_cpu, k_cpu) = rope_cpu.forward(&positions, &q, &k)?;
            let (q_gpu, k_gpu) = rope_gpu.forward(
                &positions.to_device(&gpu)?,
                &q.to_device(&gpu)?,
                &k.to_device(&gpu)?,
            )?;

            let q_err = max_diff(&q_cpu, &q_gpu)?;
            let k_err = max_diff(&k_cpu, &k_gpu)?;
            println!("{style:?} nope_first={nope_first}: q {q_err:.2e}, k {k_err:.2e}");
            assert!(q_err < 1e-4 && k_err < 1e-4);
        }
    }
    Ok(())
}

#[test]
fn test_rotary_gpu_batched_offsets() -> Result<()> {
    crate::require_gpu!();

    let gpu = Device::new_cuda(0)?;
    let cpu = Device::Cpu;
    let factors = [1.0, 2.0];

    let rope_cpu =
        RotaryEmbedding::with_linear_scaling(64, 64, 128, 10000.0, RotaryStyle::Neox, &factors, &cpu)?;
    let rope_gpu =
        RotaryEmbedding::with_linear_scaling(64, 64, 128, 10000.0, RotaryStyle::Neox, &factors, &gpu)?;
    let scaled = rope_cpu.offset_for(2.0).unwrap_or_default() as i64;

    let positions = Tensor::new(&[0i64, 100, 200, 255], &cpu)?;
    let offsets = Tensor::new(&[0i64, 0, scaled, scaled], &cpu)?;
    let q = Tensor::randn(0f32, 1.0, (4, 4, 64), &cpu)?;
    let k = Tensor::randn(0f32, 1.0, (4, 2, 64), &cpu)?;

    // positions 200 and 255 only exist in the scaled segment
    let (q_cpu, k_cpu) = rope_cpu.forward_batched(&positions, &q, &k, &offsets)?;
    let (q_gpu, k_gpu) = rope_gpu.forward_batched(
        &positions.to_device(&gpu)?,
        &q.to_device(&gpu)?,
        &k.to_device(&gpu)?,
        &offsets.to_device(&gpu)?,
    )?;

    assert!(max_diff(&q_cpu, &q_gpu)? < 1e-4);
    assert!(max_diff(&k_cpu, &k_gpu)? < 1e-4);
    Ok(())
}
