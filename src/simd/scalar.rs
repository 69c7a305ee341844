/// Portable reference kernel. Every vector kernel must match it bit for bit,
/// including wrap-around on overflow.
pub fn vadd(a: &[i32], b: &[i32], c: &mut [i32]) {
    for ((out, x), y) in c.iter_mut().zip(a).zip(b) {
        *out = x.wrapping_add(*y);
    }
}

/// Scalar tail shared by the vector kernels: elements `start..` of the buffers.
#[inline(always)]
pub(crate) fn vadd_tail(a: &[i32], b: &[i32], c: &mut [i32], start: usize) {
    vadd(&a[start..], &b[start..], &mut c[start..]);
}
