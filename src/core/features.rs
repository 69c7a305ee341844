//! Named Feature Flags
//!
//! Every architectural bit position used by detection lives in
//! [`FEATURE_BITS`]. Code outside this module only sees named flags and
//! named capability groups.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::cpuid::{
    RawFeatureBits, Register, LEAF_EXTENDED_FEATURES, LEAF_EXTENDED_SIGNATURE, LEAF_FEATURES,
};
use crate::core::tiers::{SupportedTiers, Tier};

bitflags! {
    /// Individual instruction-set extensions reported by the processor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FeatureFlags: u32 {
        const SSE = 1 << 0;
        const SSE2 = 1 << 1;
        const SSE3 = 1 << 2;
        const SSSE3 = 1 << 3;
        const SSE41 = 1 << 4;
        const SSE42 = 1 << 5;

        const AVX = 1 << 6;
        const AVX2 = 1 << 7;
        const FMA = 1 << 8;
        const LZCNT = 1 << 9;
        const BMI = 1 << 10;
        const BMI2 = 1 << 11;

        const AVX512F = 1 << 12;
        const AVX512VL = 1 << 13;
        const AVX512DQ = 1 << 14;
        const AVX512BW = 1 << 15;
    }
}

/// Where a flag lives in CPUID output.
#[derive(Debug, Clone, Copy)]
pub struct FlagBit {
    pub flag: FeatureFlags,
    pub leaf: u32,
    pub reg: Register,
    pub bit: u8,
}

const fn at(flag: FeatureFlags, leaf: u32, reg: Register, bit: u8) -> FlagBit {
    FlagBit { flag, leaf, reg, bit }
}

pub const FEATURE_BITS: &[FlagBit] = &[
    at(FeatureFlags::SSE, LEAF_FEATURES, Register::D, 25),
    at(FeatureFlags::SSE2, LEAF_FEATURES, Register::D, 26),
    at(FeatureFlags::SSE3, LEAF_FEATURES, Register::C, 0),
    at(FeatureFlags::SSSE3, LEAF_FEATURES, Register::C, 9),
    at(FeatureFlags::SSE41, LEAF_FEATURES, Register::C, 19),
    at(FeatureFlags::SSE42, LEAF_FEATURES, Register::C, 20),
    at(FeatureFlags::FMA, LEAF_FEATURES, Register::C, 12),
    at(FeatureFlags::AVX, LEAF_FEATURES, Register::C, 28),
    at(FeatureFlags::LZCNT, LEAF_EXTENDED_SIGNATURE, Register::C, 5),
    at(FeatureFlags::BMI, LEAF_EXTENDED_FEATURES, Register::B, 3),
    at(FeatureFlags::AVX2, LEAF_EXTENDED_FEATURES, Register::B, 5),
    at(FeatureFlags::BMI2, LEAF_EXTENDED_FEATURES, Register::B, 8),
    at(FeatureFlags::AVX512F, LEAF_EXTENDED_FEATURES, Register::B, 16),
    at(FeatureFlags::AVX512DQ, LEAF_EXTENDED_FEATURES, Register::B, 17),
    at(FeatureFlags::AVX512BW, LEAF_EXTENDED_FEATURES, Register::B, 30),
    at(FeatureFlags::AVX512VL, LEAF_EXTENDED_FEATURES, Register::B, 31),
];

/// Decodes the flags that `leaf` reports into named flags.
pub fn decode_leaf(leaf: u32, raw: &RawFeatureBits) -> FeatureFlags {
    FEATURE_BITS
        .iter()
        .filter(|fb| fb.leaf == leaf && raw.is_bit_set(fb.reg, fb.bit))
        .fold(FeatureFlags::empty(), |acc, fb| acc | fb.flag)
}

/// Inverse of [`decode_leaf`]: the register contents that report `flags`.
pub fn encode_leaf(leaf: u32, flags: FeatureFlags) -> RawFeatureBits {
    let mut raw = RawFeatureBits::default();
    for fb in FEATURE_BITS.iter().filter(|fb| fb.leaf == leaf && flags.contains(fb.flag)) {
        raw.set_bit(fb.reg, fb.bit);
    }
    raw
}

// XCR0 state components.
const XCR0_SSE_STATE: u32 = 1 << 1;
const XCR0_AVX_STATE: u32 = 1 << 2;
const XCR0_AVX512_STATE: u32 = 0x70;

/// Detection knobs. The default follows the `disable-bmi2` cargo feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    /// Require BMI and BMI2 for the AVX2 group.
    pub require_bmi: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            require_bmi: !cfg!(feature = "disable-bmi2"),
        }
    }
}

/// A set of flags that together unlock one [`Tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityGroup {
    Sse4,
    Avx2,
    Avx512,
}

impl CapabilityGroup {
    /// Widest first, which is also the selection preference.
    pub const ALL: [CapabilityGroup; 3] = [
        CapabilityGroup::Avx512,
        CapabilityGroup::Avx2,
        CapabilityGroup::Sse4,
    ];

    pub fn flags(self, options: DetectOptions) -> FeatureFlags {
        match self {
            CapabilityGroup::Sse4 => {
                FeatureFlags::SSE
                    | FeatureFlags::SSE2
                    | FeatureFlags::SSE3
                    | FeatureFlags::SSSE3
                    | FeatureFlags::SSE41
                    | FeatureFlags::SSE42
            }
            CapabilityGroup::Avx2 => {
                let base = FeatureFlags::AVX | FeatureFlags::AVX2 | FeatureFlags::FMA | FeatureFlags::LZCNT;
                if options.require_bmi {
                    base | FeatureFlags::BMI | FeatureFlags::BMI2
                } else {
                    base
                }
            }
            CapabilityGroup::Avx512 => {
                FeatureFlags::AVX512F
                    | FeatureFlags::AVX512VL
                    | FeatureFlags::AVX512DQ
                    | FeatureFlags::AVX512BW
            }
        }
    }

    pub fn tier(self) -> Tier {
        match self {
            CapabilityGroup::Sse4 => Tier::Sse4,
            CapabilityGroup::Avx2 => Tier::Avx2,
            CapabilityGroup::Avx512 => Tier::Avx512,
        }
    }

    /// All or nothing: a partially present group grants nothing.
    pub fn is_satisfied(self, flags: FeatureFlags, options: DetectOptions) -> bool {
        flags.contains(self.flags(options))
    }
}

/// Drops flags whose register state the OS does not preserve across
/// context switches.
pub fn apply_os_support(flags: FeatureFlags, xcr0: u32, options: DetectOptions) -> FeatureFlags {
    let mut flags = flags;
    // XMM
    if xcr0 & XCR0_SSE_STATE == 0 {
        tracing::debug!(xcr0, "OS does not save XMM state, discarding all flags");
        flags = FeatureFlags::empty();
    }
    // YMM
    if xcr0 & XCR0_AVX_STATE == 0 {
        let group = CapabilityGroup::Avx2.flags(options);
        if flags.intersects(group) {
            tracing::debug!(xcr0, "OS does not save YMM state, discarding AVX2 group");
        }
        flags.remove(group);
    }
    // ZMM + opmask
    if xcr0 & XCR0_AVX512_STATE != XCR0_AVX512_STATE {
        let group = CapabilityGroup::Avx512.flags(options);
        if flags.intersects(group) {
            tracing::debug!(xcr0, "OS does not save ZMM/opmask state, discarding AVX-512 group");
        }
        flags.remove(group);
    }
    flags
}

/// Sets a tier bit for every fully present group.
pub fn tiers_for(flags: FeatureFlags, options: DetectOptions) -> SupportedTiers {
    CapabilityGroup::ALL
        .into_iter()
        .filter(|group| group.is_satisfied(flags, options))
        .fold(SupportedTiers::empty(), |acc, group| acc | group.tier().mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WITH_BMI: DetectOptions = DetectOptions { require_bmi: true };
    const WITHOUT_BMI: DetectOptions = DetectOptions { require_bmi: false };

    #[test]
    fn test_decode_leaf1_bit_positions() {
        let raw = RawFeatureBits {
            a: 0,
            b: 0,
            c: (1 << 0) | (1 << 9) | (1 << 19) | (1 << 20) | (1 << 12) | (1 << 28),
            d: (1 << 25) | (1 << 26),
        };
        let flags = decode_leaf(LEAF_FEATURES, &raw);
        assert_eq!(
            flags,
            CapabilityGroup::Sse4.flags(WITH_BMI) | FeatureFlags::FMA | FeatureFlags::AVX
        );
    }

    #[test]
    fn test_decode_ignores_other_leaves_bits() {
        // Bit 5 of ECX means LZCNT only on the extended leaf.
        let raw = RawFeatureBits { c: 1 << 5, ..Default::default() };
        assert_eq!(decode_leaf(LEAF_FEATURES, &raw), FeatureFlags::empty());
        assert_eq!(decode_leaf(LEAF_EXTENDED_SIGNATURE, &raw), FeatureFlags::LZCNT);
    }

    #[test]
    fn test_decode_leaf7_avx512_vl_is_top_bit() {
        let raw = RawFeatureBits { b: 1 << 31, ..Default::default() };
        assert_eq!(decode_leaf(LEAF_EXTENDED_FEATURES, &raw), FeatureFlags::AVX512VL);
    }

    #[test]
    fn test_encode_decode_agree() {
        for leaf in [LEAF_FEATURES, LEAF_EXTENDED_SIGNATURE, LEAF_EXTENDED_FEATURES] {
            let raw = encode_leaf(leaf, FeatureFlags::all());
            let decoded = decode_leaf(leaf, &raw);
            let expected = FEATURE_BITS
                .iter()
                .filter(|fb| fb.leaf == leaf)
                .fold(FeatureFlags::empty(), |acc, fb| acc | fb.flag);
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_every_flag_has_exactly_one_position() {
        for flag in FeatureFlags::all().iter() {
            let count = FEATURE_BITS.iter().filter(|fb| fb.flag == flag).count();
            assert_eq!(count, 1, "{flag:?}");
        }
    }

    #[test]
    fn test_avx2_group_bmi_switch() {
        let flags = FeatureFlags::AVX | FeatureFlags::AVX2 | FeatureFlags::FMA | FeatureFlags::LZCNT | FeatureFlags::BMI;
        assert!(!CapabilityGroup::Avx2.is_satisfied(flags, WITH_BMI));
        assert!(CapabilityGroup::Avx2.is_satisfied(flags, WITHOUT_BMI));
    }

    #[test]
    fn test_partial_group_grants_nothing() {
        let flags = FeatureFlags::AVX512F | FeatureFlags::AVX512VL | FeatureFlags::AVX512DQ;
        assert_eq!(tiers_for(flags, WITH_BMI), SupportedTiers::empty());
    }

    #[test]
    fn test_os_support_xmm_clear_discards_everything() {
        let flags = apply_os_support(FeatureFlags::all(), 0x1 | 0x4 | 0x70, WITH_BMI);
        assert_eq!(flags, FeatureFlags::empty());
    }

    #[test]
    fn test_os_support_ymm_clear_keeps_bmi_when_excluded() {
        let flags = apply_os_support(FeatureFlags::all(), 0x3 | 0x70, WITHOUT_BMI);
        assert!(flags.contains(FeatureFlags::BMI | FeatureFlags::BMI2));
        assert!(!flags.intersects(CapabilityGroup::Avx2.flags(WITHOUT_BMI)));
    }

    #[test]
    fn test_os_support_needs_all_three_avx512_state_bits() {
        for missing in [4, 5, 6] {
            let xcr0 = 0xFF & !(1u32 << missing);
            let flags = apply_os_support(FeatureFlags::all(), xcr0, WITH_BMI);
            assert!(!flags.intersects(CapabilityGroup::Avx512.flags(WITH_BMI)));
            assert!(flags.contains(CapabilityGroup::Avx2.flags(WITH_BMI)));
        }
    }
}
