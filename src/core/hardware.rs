//! Hardware Detection Module
//! Queries CPU and OS support for SIMD tiers once, then serves the cached mask.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::core::cpuid::{
    FeatureSource, HostCpu, Register, LEAF_EXTENDED_FEATURES, LEAF_EXTENDED_SIGNATURE,
    LEAF_FEATURES, LEAF_MAX, OSXSAVE_BIT,
};
use crate::core::features::{apply_os_support, decode_leaf, tiers_for, DetectOptions, FeatureFlags};
use crate::core::tiers::SupportedTiers;

/// Everything one detection pass learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub max_leaf: u32,
    /// Flags as reported by CPUID, before the OS check.
    pub cpu_flags: FeatureFlags,
    pub osxsave: bool,
    /// Only read when `osxsave` is set.
    pub xcr0: Option<u32>,
    /// Flags left after dropping register state the OS does not save.
    pub usable_flags: FeatureFlags,
    pub tiers: SupportedTiers,
    pub options: DetectOptions,
}

const UNINITIALIZED: i32 = -1;

/// Process-wide compute-once slot for [`SupportedTiers`].
///
/// Racing first callers may each compute the value; they all store the
/// same bits, and readers only ever see a complete mask.
#[derive(Debug)]
pub struct DetectionCache {
    bits: AtomicI32,
}

impl DetectionCache {
    pub const fn new() -> Self {
        Self {
            bits: AtomicI32::new(UNINITIALIZED),
        }
    }

    pub fn get(&self) -> Option<SupportedTiers> {
        match self.bits.load(Ordering::Acquire) {
            UNINITIALIZED => None,
            bits => Some(SupportedTiers::from_bits_retain(bits as u32)),
        }
    }

    pub fn get_or_compute<F>(&self, compute: F) -> SupportedTiers
    where
        F: FnOnce() -> SupportedTiers,
    {
        if let Some(tiers) = self.get() {
            return tiers;
        }
        let tiers = compute();
        self.bits.store(tiers.bits() as i32, Ordering::Release);
        tiers
    }
}

impl Default for DetectionCache {
    fn default() -> Self {
        Self::new()
    }
}

// Not behind a OnceLock: no lock is taken on the slow path either.
static CACHE: DetectionCache = DetectionCache::new();

pub struct CapabilityDetector;

impl CapabilityDetector {
    /// Tiers the host CPU and OS jointly support. Computed on first call,
    /// identical for the rest of the process.
    pub fn query() -> SupportedTiers {
        CACHE.get_or_compute(|| Self::detect().tiers)
    }

    /// Uncached detection on the host with default options.
    pub fn detect() -> Detection {
        Self::detect_with(&HostCpu, DetectOptions::default())
    }

    /// Runs the full decode against any feature source.
    pub fn detect_with<S: FeatureSource + ?Sized>(source: &S, options: DetectOptions) -> Detection {
        let max_leaf = source.cpuid(LEAF_MAX, 0).a;

        let leaf1 = source.cpuid(LEAF_FEATURES, 0);
        let mut flags = decode_leaf(LEAF_FEATURES, &leaf1);
        let osxsave = leaf1.is_bit_set(Register::C, OSXSAVE_BIT);

        flags |= decode_leaf(LEAF_EXTENDED_SIGNATURE, &source.cpuid(LEAF_EXTENDED_SIGNATURE, 0));

        if max_leaf >= LEAF_EXTENDED_FEATURES {
            flags |= decode_leaf(LEAF_EXTENDED_FEATURES, &source.cpuid(LEAF_EXTENDED_FEATURES, 0));
        }

        let cpu_flags = flags;
        // Without OSXSAVE there is no XCR0 to consult; the flags stand as reported.
        let xcr0 = osxsave.then(|| source.xcr0());
        let usable_flags = match xcr0 {
            Some(xcr0) => apply_os_support(cpu_flags, xcr0, options),
            None => cpu_flags,
        };

        let tiers = tiers_for(usable_flags, options);

        tracing::debug!(
            max_leaf,
            cpu_flags = ?cpu_flags,
            xcr0 = ?xcr0,
            tiers = tiers.bits(),
            "detected SIMD tiers: {}",
            tiers
        );

        Detection {
            max_leaf,
            cpu_flags,
            osxsave,
            xcr0,
            usable_flags,
            tiers,
            options,
        }
    }
}
