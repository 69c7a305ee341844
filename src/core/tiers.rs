use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ParseTierError;

bitflags! {
    /// Vectorization tiers whose capability group is fully usable.
    ///
    /// The bit values are part of the external contract (2 / 4 / 16) and
    /// must not be renumbered. An empty mask means scalar code only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SupportedTiers: u32 {
        const AVX2 = 2;
        const SSE4 = 4;
        const AVX512 = 16;
    }
}

impl SupportedTiers {
    /// Widest tier in the mask, `Scalar` when empty.
    pub fn best(self) -> Tier {
        Tier::ALL
            .into_iter()
            .rev()
            .find(|&tier| self.supports(tier))
            .unwrap_or(Tier::Scalar)
    }

    /// `Scalar` is always supported.
    pub fn supports(self, tier: Tier) -> bool {
        self.contains(tier.mask())
    }

    /// Every tier that can run here, narrowest first.
    pub fn runnable(self) -> impl Iterator<Item = Tier> {
        Tier::ALL.into_iter().filter(move |&tier| self.supports(tier))
    }
}

impl fmt::Display for SupportedTiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self
            .runnable()
            .filter(|&tier| tier != Tier::Scalar)
            .map(Tier::as_str)
            .collect();
        f.write_str(&names.join(", "))
    }
}

/// A kernel implementation level, ordered narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Scalar,
    Sse4,
    Avx2,
    Avx512,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Scalar, Tier::Sse4, Tier::Avx2, Tier::Avx512];

    /// Number of `i32` lanes processed per vector step.
    pub fn lanes(self) -> usize {
        match self {
            Tier::Scalar => 1,
            Tier::Sse4 => 4,
            Tier::Avx2 => 8,
            Tier::Avx512 => 16,
        }
    }

    /// The tier's bit in [`SupportedTiers`].
    pub fn mask(self) -> SupportedTiers {
        match self {
            Tier::Scalar => SupportedTiers::empty(),
            Tier::Sse4 => SupportedTiers::SSE4,
            Tier::Avx2 => SupportedTiers::AVX2,
            Tier::Avx512 => SupportedTiers::AVX512,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Scalar => "scalar",
            Tier::Sse4 => "sse4",
            Tier::Avx2 => "avx2",
            Tier::Avx512 => "avx512",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', '.'], "").as_str() {
            "scalar" | "novec" | "none" => Ok(Tier::Scalar),
            "sse4" | "sse42" => Ok(Tier::Sse4),
            "avx2" => Ok(Tier::Avx2),
            "avx512" => Ok(Tier::Avx512),
            _ => Err(ParseTierError(s.to_string())),
        }
    }
}
