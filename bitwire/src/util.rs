/// Number of bits needed to represent `value`, i.e. the position of the
/// highest set bit plus one. Zero for zero.
#[inline(always)]
pub(crate) const fn bit_width(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}

/// Round `value` up to the next multiple of `POW2`.
#[inline(always)]
pub(crate) const fn ceil_to_multiple_of<const POW2: u64>(value: u64) -> u64 {
    assert!(POW2.is_power_of_two());
    (value + (POW2 - 1)) & !(POW2 - 1)
}
