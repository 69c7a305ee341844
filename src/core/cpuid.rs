//! Processor Identification Sources
//! Raw CPUID / XGETBV access behind a trait, so detection can run against
//! the real host or a synthetic register file.

/// Basic leaf: reports the highest supported standard leaf in register A.
pub const LEAF_MAX: u32 = 0;
/// Standard feature flags (SSE family, AVX, FMA, OSXSAVE).
pub const LEAF_FEATURES: u32 = 1;
/// Structured extended feature flags (AVX2, BMI, AVX-512).
pub const LEAF_EXTENDED_FEATURES: u32 = 7;
/// Extended processor signature and feature bits (LZCNT).
pub const LEAF_EXTENDED_SIGNATURE: u32 = 0x8000_0001;

/// Output register of a CPUID query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    B,
    C,
    D,
}

/// Result of a single CPUID query: EAX, EBX, ECX, EDX.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFeatureBits {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl RawFeatureBits {
    pub fn get(&self, reg: Register) -> u32 {
        match reg {
            Register::A => self.a,
            Register::B => self.b,
            Register::C => self.c,
            Register::D => self.d,
        }
    }

    pub fn is_bit_set(&self, reg: Register, index: u8) -> bool {
        self.get(reg) & (1u32 << index) != 0
    }

    pub fn set_bit(&mut self, reg: Register, index: u8) {
        let mask = 1u32 << index;
        match reg {
            Register::A => self.a |= mask,
            Register::B => self.b |= mask,
            Register::C => self.c |= mask,
            Register::D => self.d |= mask,
        }
    }
}

/// Anything that can answer CPUID queries and report XCR0.
pub trait FeatureSource {
    /// Runs CPUID with `eax = leaf`, `ecx = sub_leaf`.
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> RawFeatureBits;

    /// Lower 32 bits of extended control register 0.
    /// Only meaningful when leaf 1 reports OSXSAVE.
    fn xcr0(&self) -> u32;
}

/// The processor this process is running on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCpu;

#[cfg(target_arch = "x86")]
use std::arch::x86 as arch;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64 as arch;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl FeatureSource for HostCpu {
    #[allow(unused_unsafe)]
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> RawFeatureBits {
        // CPUID is part of the baseline for every target this builds for.
        let r = unsafe { arch::__cpuid_count(leaf, sub_leaf) };
        RawFeatureBits {
            a: r.eax,
            b: r.ebx,
            c: r.ecx,
            d: r.edx,
        }
    }

    fn xcr0(&self) -> u32 {
        // XGETBV raises #UD unless the OS has set CR4.OSXSAVE.
        if !self.cpuid(LEAF_FEATURES, 0).is_bit_set(Register::C, OSXSAVE_BIT) {
            return 0;
        }
        unsafe { read_xcr0() }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "xsave")]
unsafe fn read_xcr0() -> u32 {
    arch::_xgetbv(0) as u32
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
impl FeatureSource for HostCpu {
    fn cpuid(&self, _leaf: u32, _sub_leaf: u32) -> RawFeatureBits {
        RawFeatureBits::default()
    }

    fn xcr0(&self) -> u32 {
        0
    }
}

/// Leaf 1, ECX: OS has enabled XSAVE/XGETBV.
pub const OSXSAVE_BIT: u8 = 27;

/// A synthetic register file. Leaves that were never set read as zero.
#[derive(Debug, Clone, Default)]
pub struct FixedCpu {
    leaves: Vec<(u32, RawFeatureBits)>,
    xcr0: u32,
}

impl FixedCpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the registers returned for `leaf` (sub-leaf 0).
    pub fn with_leaf(mut self, leaf: u32, bits: RawFeatureBits) -> Self {
        match self.leaves.iter_mut().find(|(l, _)| *l == leaf) {
            Some(entry) => entry.1 = bits,
            None => self.leaves.push((leaf, bits)),
        }
        self
    }

    /// Sets one bit in `leaf`'s output, keeping everything else.
    pub fn with_bit(self, leaf: u32, reg: Register, index: u8) -> Self {
        let mut bits = self.leaf(leaf);
        bits.set_bit(reg, index);
        self.with_leaf(leaf, bits)
    }

    pub fn with_max_leaf(self, max_leaf: u32) -> Self {
        let mut bits = self.leaf(LEAF_MAX);
        bits.a = max_leaf;
        self.with_leaf(LEAF_MAX, bits)
    }

    /// Reports OSXSAVE and returns `xcr0` from XGETBV.
    pub fn with_xcr0(self, xcr0: u32) -> Self {
        let mut cpu = self.with_bit(LEAF_FEATURES, Register::C, OSXSAVE_BIT);
        cpu.xcr0 = xcr0;
        cpu
    }

    fn leaf(&self, leaf: u32) -> RawFeatureBits {
        self.leaves
            .iter()
            .find(|(l, _)| *l == leaf)
            .map(|(_, bits)| *bits)
            .unwrap_or_default()
    }
}

impl FeatureSource for FixedCpu {
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> RawFeatureBits {
        if sub_leaf != 0 {
            return RawFeatureBits::default();
        }
        self.leaf(leaf)
    }

    fn xcr0(&self) -> u32 {
        self.xcr0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_cpu_unset_leaves_read_zero() {
        let cpu = FixedCpu::new().with_max_leaf(7);
        assert_eq!(cpu.cpuid(LEAF_MAX, 0).a, 7);
        assert_eq!(cpu.cpuid(LEAF_FEATURES, 0), RawFeatureBits::default());
        assert_eq!(cpu.cpuid(LEAF_MAX, 1), RawFeatureBits::default());
        assert_eq!(cpu.xcr0(), 0);
    }

    #[test]
    fn test_with_xcr0_reports_osxsave() {
        let cpu = FixedCpu::new().with_xcr0(0x7);
        assert!(cpu.cpuid(LEAF_FEATURES, 0).is_bit_set(Register::C, OSXSAVE_BIT));
        assert_eq!(cpu.xcr0(), 0x7);
    }

    #[test]
    fn test_set_bit_targets_register() {
        let mut bits = RawFeatureBits::default();
        bits.set_bit(Register::D, 25);
        bits.set_bit(Register::B, 31);
        assert_eq!(bits.d, 1 << 25);
        assert_eq!(bits.b, 1 << 31);
        assert!(bits.is_bit_set(Register::D, 25));
        assert!(!bits.is_bit_set(Register::C, 25));
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn test_host_max_leaf_nonzero() {
        // Every x86 processor that runs this binary implements at least leaf 1.
        assert!(HostCpu.cpuid(LEAF_MAX, 0).a >= 1);
    }
}
