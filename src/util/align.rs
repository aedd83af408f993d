use num_traits::{PrimInt, Unsigned};

/// Round `val` down to a multiple of `align`.
pub fn align_down<U: PrimInt + Unsigned>(val: U, align: U) -> U {
    val / align * align
}

/// Round `val` up to a multiple of `align`.
///
/// Returns `None` on overflow.
pub fn align_up<U: PrimInt + Unsigned>(val: U, align: U) -> Option<U> {
    let rem = val % align;
    if rem.is_zero() {
        Some(val)
    } else {
        val.checked_add(&(align - rem))
    }
}

/// Check whether `val` is a multiple of `align`.
pub fn is_aligned<U: PrimInt + Unsigned>(val: U, align: U) -> bool {
    (val % align).is_zero()
}
