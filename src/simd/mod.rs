pub mod scalar;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx2;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod avx512;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod sse4;

use rayon::prelude::*;

use crate::core::hardware::CapabilityDetector;
use crate::core::tiers::{SupportedTiers, Tier};
use crate::error::DispatchError;

/// Element-wise `c[i] = a[i] + b[i]` (wrapping).
///
/// # Safety
/// All three slices must have the same length, and the CPU must support the
/// instructions of the tier the pointer was taken from.
pub type VectorAddFunc = unsafe fn(&[i32], &[i32], &mut [i32]);

/// Elements per rayon task in [`Kernel::par_add`]. A multiple of every
/// tier's lane count so only the last chunk has a tail.
const PAR_CHUNK: usize = 1 << 16;

/// Picks a tier from a capability mask.
pub struct KernelSelector;

impl KernelSelector {
    /// AVX-512 > AVX2 > SSE4 > scalar.
    pub fn choose(tiers: SupportedTiers) -> Tier {
        tiers.best()
    }
}

/// A vector-add implementation whose tier the host reported as supported.
///
/// When leaf 1 reports OSXSAVE, AVX tiers are only granted if XCR0 shows
/// the OS saves the wider register state. When OSXSAVE is clear, XCR0 is
/// never read and the AVX2/AVX-512 tiers follow CPUID alone; on such a host
/// the AVX kernels are only safe to run if the OS does enable that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    tier: Tier,
}

impl Kernel {
    pub const SCALAR: Kernel = Kernel { tier: Tier::Scalar };

    /// The widest kernel the host supports.
    pub fn select() -> Self {
        let tier = KernelSelector::choose(CapabilityDetector::query());
        tracing::debug!(%tier, "selected vector-add kernel");
        Self { tier }
    }

    /// Forces `tier`, refusing tiers the host cannot execute.
    pub fn new(tier: Tier) -> Result<Self, DispatchError> {
        let supported = CapabilityDetector::query();
        if !supported.supports(tier) {
            return Err(DispatchError::Unsupported { tier, supported });
        }
        Ok(Self { tier })
    }

    /// Every kernel the host can run, narrowest first.
    pub fn available() -> Vec<Kernel> {
        CapabilityDetector::query()
            .runnable()
            .map(|tier| Kernel { tier })
            .collect()
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn as_fn(&self) -> VectorAddFunc {
        kernel_fn(self.tier)
    }

    pub fn add(&self, a: &[i32], b: &[i32], c: &mut [i32]) -> Result<(), DispatchError> {
        check_lengths(a, b, c)?;
        // Safety: lengths checked above; `tier` was validated against the
        // detected mask (see the OSXSAVE caveat on `Kernel`).
        unsafe { (self.as_fn())(a, b, c) };
        Ok(())
    }

    /// Like [`Kernel::add`], split across the rayon pool.
    pub fn par_add(&self, a: &[i32], b: &[i32], c: &mut [i32]) -> Result<(), DispatchError> {
        check_lengths(a, b, c)?;
        let func = self.as_fn();
        c.par_chunks_mut(PAR_CHUNK)
            .zip(a.par_chunks(PAR_CHUNK))
            .zip(b.par_chunks(PAR_CHUNK))
            .for_each(|((out, x), y)| unsafe { func(x, y, out) });
        Ok(())
    }
}

/// Function pointer for the host's best kernel.
pub fn get_vector_add() -> VectorAddFunc {
    Kernel::select().as_fn()
}

fn check_lengths(a: &[i32], b: &[i32], c: &[i32]) -> Result<(), DispatchError> {
    if a.len() != c.len() || b.len() != c.len() {
        return Err(DispatchError::LengthMismatch {
            a: a.len(),
            b: b.len(),
            out: c.len(),
        });
    }
    Ok(())
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn kernel_fn(tier: Tier) -> VectorAddFunc {
    match tier {
        Tier::Scalar => wrapper_scalar,
        Tier::Sse4 => sse4::vadd_sse4,
        Tier::Avx2 => avx2::vadd_avx2,
        Tier::Avx512 => avx512::vadd_avx512,
    }
}

// Detection reports nothing off x86, so only the scalar kernel is reachable.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn kernel_fn(_tier: Tier) -> VectorAddFunc {
    wrapper_scalar
}

unsafe fn wrapper_scalar(a: &[i32], b: &[i32], c: &mut [i32]) {
    scalar::vadd(a, b, c)
}
