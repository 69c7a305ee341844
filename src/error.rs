use thiserror::Error;

use crate::core::tiers::{SupportedTiers, Tier};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown SIMD tier `{0}` (expected scalar, sse4, avx2 or avx512)")]
pub struct ParseTierError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{tier} kernel requested but this host only supports: {supported}")]
    Unsupported { tier: Tier, supported: SupportedTiers },
    #[error("buffer length mismatch: a={a}, b={b}, out={out}")]
    LengthMismatch { a: usize, b: usize, out: usize },
    #[error(transparent)]
    Parse(#[from] ParseTierError),
}
