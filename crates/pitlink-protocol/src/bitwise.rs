//! Bit helpers for protocol bytes.
//!
//! Bit numbers are counted from the least significant bit. A bit number
//! outside the byte leaves the value untouched and tests as unset.

/// Mask with only bit `n` set, `None` when `n` is outside a byte
pub const fn bit(n: u32) -> Option<u8> {
    if n < u8::BITS {
        Some(1 << n)
    } else {
        None
    }
}

/// Whether bit `n` of `value` is set
pub const fn test_bit(value: u8, n: u32) -> bool {
    match bit(n) {
        Some(mask) => value & mask != 0,
        None => false,
    }
}

/// Set or clear bit `n` of `value`
pub const fn modify_bit(value: u8, n: u32, set: bool) -> u8 {
    match bit(n) {
        Some(mask) if set => value | mask,
        Some(mask) => value & !mask,
        None => value,
    }
}

/// Set bit `n` of `value`
pub const fn set_bit(value: u8, n: u32) -> u8 {
    modify_bit(value, n, true)
}

/// Clear bit `n` of `value`
pub const fn unset_bit(value: u8, n: u32) -> u8 {
    modify_bit(value, n, false)
}

/// Flip bit `n` of `value`
pub const fn toggle_bit(value: u8, n: u32) -> u8 {
    match bit(n) {
        Some(mask) => value ^ mask,
        None => value,
    }
}

/// Exchange the high and low nibbles
pub const fn swap_nibbles(value: u8) -> u8 {
    value.rotate_left(4)
}
