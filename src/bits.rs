/// Set bit `bit` of `x` on if `toggle` is true, otherwise off.
pub fn bit(bit: u32, x: u32, toggle: bool) -> u32 {
    if toggle {
        x | (1 << bit)
    } else {
        x & !(1 << bit)
    }
}

/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u32, x: u32) -> bool {
    (x >> bit) & 1 == 1
}

/// Pack `flags` into a bitmap, flag `i` landing on bit `i`.
pub fn pack_bits(flags: &[bool]) -> u32 {
    flags
        .iter()
        .enumerate()
        .fold(0, |acc, (i, f)| bit(i as u32, acc, *f))
}
