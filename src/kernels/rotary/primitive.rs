// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Single-pair rotation.

use num_traits::Float;

/// Rotate the pair at `head[x_index]`, `head[y_index]` in place.
///
/// ```text
/// x' = x * cos - y * sin
/// y' = y * cos + x * sin
/// ```
#[inline(always)]
pub fn rotate_pair<T: Float>(head: &mut [T], x_index: usize, y_index: usize, cos: T, sin: T) {
    let x = head[x_index];
    let y = head[y_index];
    head[x_index] = x * cos - y * sin;
    head[y_index] = y * cos + x * sin;
}
