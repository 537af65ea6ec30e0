//! Test utilities and fixtures for rotary embedding integration tests.
//!
//! This module provides deterministic buffer generation, a scalar reference
//! implementation written directly from the pairing rules, and comparison
//! utilities.

use std::collections::HashMap;

use rotary_rs::kernels::rotary::RotaryStyle;

/// Shape of one rotary test case.
#[derive(Debug, Clone, Copy)]
pub struct RotaryCase {
    /// Tokens in the batch.
    pub num_tokens: usize,
    /// Query heads per token.
    pub num_heads: usize,
    /// Key heads per token.
    pub num_kv_heads: usize,
    /// Elements per head.
    pub head_size: usize,
    /// Rotated elements per head.
    pub rot_dim: usize,
    /// Angle table rows.
    pub max_position: usize,
    /// Random seed for reproducible tests.
    pub seed: u64,
}

impl Default for RotaryCase {
    fn default() -> Self {
        Self {
            num_tokens: 7,
            num_heads: 4,
            num_kv_heads: 2,
            head_size: 32,
            rot_dim: 32,
            max_position: 64,
            seed: 42,
        }
    }
}

impl RotaryCase {
    /// Pairs per head.
    pub fn embed_dim(&self) -> usize {
        self.rot_dim / 2
    }

    /// Elements per query token.
    pub fn query_hidden(&self) -> usize {
        self.num_heads * self.head_size
    }

    /// Elements per key token.
    pub fn key_hidden(&self) -> usize {
        self.num_kv_heads * self.head_size
    }
}

/// Test fixtures for common rotary inputs.
pub struct TestFixtures;

impl TestFixtures {
    /// Shapes covering MHA, GQA, partial rotary and large head counts.
    pub fn standard_cases() -> Vec<(&'static str, RotaryCase)> {
        vec![
            ("mha_full", RotaryCase::default()),
            (
                "gqa_partial",
                RotaryCase {
                    num_heads: 8,
                    num_kv_heads: 2,
                    head_size: 64,
                    rot_dim: 16,
                    seed: 43,
                    ..Default::default()
                },
            ),
            (
                "single_pair",
                RotaryCase {
                    num_tokens: 3,
                    num_heads: 1,
                    num_kv_heads: 1,
                    head_size: 6,
                    rot_dim: 2,
                    seed: 44,
                    ..Default::default()
                },
            ),
            (
                "over_block_cap",
                RotaryCase {
                    num_tokens: 4,
                    num_heads: 40,
                    num_kv_heads: 8,
                    head_size: 128,
                    rot_dim: 128,
                    max_position: 256,
                    seed: 45,
                },
            ),
        ]
    }

    /// Deterministic values in `[-max, max]`.
    pub fn uniform_values(count: usize, max: f32, seed: u64) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        (0..count)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                (seed + i as u64).hash(&mut hasher);
                let normalized = (hasher.finish() as f64) / (u64::MAX as f64);
                ((normalized * 2.0 - 1.0) * f64::from(max)) as f32
            })
            .collect()
    }

    /// Query and key buffers for a case, contiguous token-major.
    pub fn qk_buffers(case: &RotaryCase) -> (Vec<f32>, Vec<f32>) {
        let q = Self::uniform_values(case.num_tokens * case.query_hidden(), 2.0, case.seed);
        let k = Self::uniform_values(
            case.num_tokens * case.key_hidden(),
            2.0,
            case.seed.wrapping_mul(31),
        );
        (q, k)
    }

    /// Positions spread over the table.
    pub fn positions(case: &RotaryCase) -> Vec<i64> {
        (0..case.num_tokens)
            .map(|t| ((t * 13 + 5) % case.max_position) as i64)
            .collect()
    }

    /// Standard RoPE angle table `[rows, embed_dim]`.
    pub fn angle_table(rows: usize, embed_dim: usize, base: f32) -> (Vec<f32>, Vec<f32>) {
        let mut cos = Vec::with_capacity(rows * embed_dim);
        let mut sin = Vec::with_capacity(rows * embed_dim);
        for pos in 0..rows {
            for i in 0..embed_dim {
                let inv_freq = 1.0 / base.powf((2 * i) as f32 / (2 * embed_dim) as f32);
                let theta = pos as f32 * inv_freq;
                cos.push(theta.cos());
                sin.push(theta.sin());
            }
        }
        (cos, sin)
    }
}

/// Scalar reference: rotate one contiguous buffer head by head.
#[allow(clippy::too_many_arguments)]
pub fn reference_rotate(
    data: &mut [f32],
    num_heads: usize,
    head_size: usize,
    rot_dim: usize,
    rows: &[usize],
    cos: &[f32],
    sin: &[f32],
    style: RotaryStyle,
    nope_first: bool,
) {
    let embed_dim = rot_dim / 2;
    let window = if nope_first { head_size - rot_dim } else { 0 };
    let hidden = num_heads * head_size;

    for (token, &row) in rows.iter().enumerate() {
        for head in 0..num_heads {
            let base = token * hidden + head * head_size + window;
            for r in 0..embed_dim {
                let (xi, yi) = match style {
                    RotaryStyle::Neox => (r, r + embed_dim),
                    RotaryStyle::Gptj => (2 * r, 2 * r + 1),
                };
                let c = cos[row * embed_dim + r];
                let s = sin[row * embed_dim + r];
                let x = data[base + xi];
                let y = data[base + yi];
                data[base + xi] = x * c - y * s;
                data[base + yi] = y * c + x * s;
            }
        }
    }
}

/// Utility functions for accuracy validation.
pub struct ValidationUtils;

impl ValidationUtils {
    /// Largest absolute element difference.
    pub fn max_abs_error(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "buffer lengths must match");
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    /// Slot pairs `(x, y)` of one head's rotation window.
    pub fn window_pairs(style: RotaryStyle, rot_dim: usize) -> Vec<(usize, usize)> {
        let embed_dim = rot_dim / 2;
        (0..embed_dim)
            .map(|r| match style {
                RotaryStyle::Neox => (r, r + embed_dim),
                RotaryStyle::Gptj => (2 * r, 2 * r + 1),
            })
            .collect()
    }

    /// Per-element change counts: how many elements of each head moved.
    pub fn changed_per_head(
        before: &[f32],
        after: &[f32],
        head_size: usize,
    ) -> HashMap<usize, usize> {
        let mut counts = HashMap::new();
        for (i, (a, b)) in before.iter().zip(after).enumerate() {
            let entry = counts.entry(i / head_size).or_insert(0);
            if a.to_bits() != b.to_bits() {
                *entry += 1;
            }
        }
        counts
    }
}

/// Timing utilities for performance validation.
pub struct TimingUtils;

impl TimingUtils {
    /// Time a function execution and return (result, duration_ms).
    pub fn time_execution<F, R>(f: F) -> (R, f64)
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        (result, duration_ms)
    }
}
