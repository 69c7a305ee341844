#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::scalar::vadd_tail;

/// 256-bit kernel, 8 lanes per step.
///
/// # Safety
/// The CPU must support AVX2 and all three slices must have the same length.
#[target_feature(enable = "avx2")]
pub unsafe fn vadd_avx2(a: &[i32], b: &[i32], c: &mut [i32]) {
    let n = c.len();
    debug_assert!(a.len() == n && b.len() == n);
    let body = n / 8 * 8;

    let (pa, pb, pc) = (a.as_ptr(), b.as_ptr(), c.as_mut_ptr());
    let mut i = 0;

    // Process 8 ints at a time
    while i < body {
        let va = _mm256_loadu_si256(pa.add(i) as *const __m256i);
        let vb = _mm256_loadu_si256(pb.add(i) as *const __m256i);
        _mm256_storeu_si256(pc.add(i) as *mut __m256i, _mm256_add_epi32(va, vb));
        i += 8;
    }

    // Handle remaining elements
    vadd_tail(a, b, c, body);
}
