#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::scalar::vadd_tail;

/// 512-bit kernel, 16 lanes per step.
///
/// # Safety
/// The CPU must support AVX-512F and all three slices must have the same length.
#[target_feature(enable = "avx512f")]
pub unsafe fn vadd_avx512(a: &[i32], b: &[i32], c: &mut [i32]) {
    let n = c.len();
    debug_assert!(a.len() == n && b.len() == n);
    let body = n / 16 * 16;

    let (pa, pb, pc) = (a.as_ptr(), b.as_ptr(), c.as_mut_ptr());
    let mut i = 0;
    while i < body {
        let va = _mm512_loadu_epi32(pa.add(i));
        let vb = _mm512_loadu_epi32(pb.add(i));
        _mm512_storeu_epi32(pc.add(i), _mm512_add_epi32(va, vb));
        i += 16;
    }

    vadd_tail(a, b, c, body);
}
