pub mod core;
pub mod error;
pub mod simd;

pub use crate::core::hardware::{CapabilityDetector, Detection};
pub use crate::core::tiers::{SupportedTiers, Tier};
pub use crate::error::{DispatchError, ParseTierError};
pub use crate::simd::{get_vector_add, Kernel, KernelSelector, VectorAddFunc};
