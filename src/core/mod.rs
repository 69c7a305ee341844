pub mod cpuid;
pub mod diagnostics;
pub mod features;
pub mod hardware;
pub mod tiers;
