//! Rotary embedding kernels and their tensor front end.

pub mod rope;
pub mod rotary;
pub mod table;

#[cfg(feature = "cuda")]
pub mod cubecl;

pub use rope::RotaryEmbedding;
pub use rotary::{batched_rotary_embedding, rotary_embedding, RotaryConfig, RotaryStyle};
pub use table::{AngleCache, ScalingSegment};
