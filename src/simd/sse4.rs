#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::scalar::vadd_tail;

/// 128-bit kernel, 4 lanes per step.
///
/// # Safety
/// The CPU must support SSE4.2 and all three slices must have the same length.
#[target_feature(enable = "sse4.2")]
pub unsafe fn vadd_sse4(a: &[i32], b: &[i32], c: &mut [i32]) {
    let n = c.len();
    debug_assert!(a.len() == n && b.len() == n);
    let body = n / 4 * 4;

    let (pa, pb, pc) = (a.as_ptr(), b.as_ptr(), c.as_mut_ptr());
    let mut i = 0;
    while i < body {
        let va = _mm_loadu_si128(pa.add(i) as *const __m128i);
        let vb = _mm_loadu_si128(pb.add(i) as *const __m128i);
        _mm_storeu_si128(pc.add(i) as *mut __m128i, _mm_add_epi32(va, vb));
        i += 4;
    }

    vadd_tail(a, b, c, body);
}
