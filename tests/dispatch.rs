use std::thread;

use simd_dispatch::core::cpuid::{FixedCpu, Register, LEAF_EXTENDED_FEATURES, LEAF_EXTENDED_SIGNATURE, LEAF_FEATURES};
use simd_dispatch::core::features::DetectOptions;
use simd_dispatch::{CapabilityDetector, DispatchError, Kernel, KernelSelector, SupportedTiers, Tier};

/// A CPU with every flag the detector decodes, bit by bit.
fn skylake_x() -> FixedCpu {
    let mut cpu = FixedCpu::new().with_max_leaf(0x16);
    for bit in [25, 26] {
        cpu = cpu.with_bit(LEAF_FEATURES, Register::D, bit);
    }
    for bit in [0, 9, 12, 19, 20, 28] {
        cpu = cpu.with_bit(LEAF_FEATURES, Register::C, bit);
    }
    cpu = cpu.with_bit(LEAF_EXTENDED_SIGNATURE, Register::C, 5);
    for bit in [3, 5, 8, 16, 17, 30, 31] {
        cpu = cpu.with_bit(LEAF_EXTENDED_FEATURES, Register::B, bit);
    }
    cpu
}

#[test]
fn end_to_end_len_33_every_kernel() {
    let len = 33;
    let a: Vec<i32> = (0..len).map(|i| i * 3).collect();
    let b: Vec<i32> = (0..len).map(|i| 2 * i).collect();
    let expected: Vec<i32> = (0..len).map(|i| 5 * i).collect();

    for kernel in Kernel::available() {
        let mut c = vec![0; len as usize];
        kernel.add(&a, &b, &mut c).unwrap();
        assert_eq!(c, expected, "{} kernel", kernel.tier());
    }
}

#[test]
fn synthetic_host_selects_widest_tier() {
    let options = DetectOptions { require_bmi: true };
    let full = CapabilityDetector::detect_with(&skylake_x().with_xcr0(0xFF), options);
    assert_eq!(full.tiers, SupportedTiers::all());
    assert_eq!(KernelSelector::choose(full.tiers), Tier::Avx512);

    // OS that does not save ZMM state: falls back to AVX2.
    let no_zmm = CapabilityDetector::detect_with(&skylake_x().with_xcr0(0x07), options);
    assert_eq!(no_zmm.tiers, SupportedTiers::AVX2 | SupportedTiers::SSE4);
    assert_eq!(KernelSelector::choose(no_zmm.tiers), Tier::Avx2);
}

#[test]
fn query_agrees_across_threads() {
    let handles: Vec<_> = (0..16).map(|_| thread::spawn(CapabilityDetector::query)).collect();
    let first = CapabilityDetector::query();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), first);
    }
}

#[test]
fn forced_tier_round_trip() {
    let supported = CapabilityDetector::query();
    for name in ["scalar", "sse4", "avx2", "avx512"] {
        let tier: Tier = name.parse().unwrap();
        let result = Kernel::new(tier);
        assert_eq!(result.is_ok(), supported.supports(tier), "{}", name);
        if let Err(DispatchError::Unsupported { tier: t, .. }) = result {
            assert_eq!(t, tier);
        }
    }
    assert!("mmx".parse::<Tier>().is_err());
}
