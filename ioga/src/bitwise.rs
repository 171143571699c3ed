/// Helpers to manipulate bits and bytes of register values,
/// the index (`bit_idx`) is supposed to be from lsb to msb (right to left)
pub trait Bits: Copy {
    fn get_bit(self, bit_idx: u8) -> bool;

    fn set_bit(&mut self, bit_idx: u8, value: bool);

    fn get_byte(self, byte_nth: u8) -> u8;

    fn set_byte(&mut self, byte_nth: u8, value: u8);

    /// Bits set in `self` and clear in `next`, i.e. the 1 -> 0 transitions of a write.
    fn falling_edges(self, next: Self) -> Self;
}

macro_rules! impl_bits {
    ($($t:ty),*) => {
        $(
            impl Bits for $t {
                fn get_bit(self, bit_idx: u8) -> bool {
                    debug_assert!(u32::from(bit_idx) < <$t>::BITS);
                    (self >> bit_idx) & 1 == 1
                }

                fn set_bit(&mut self, bit_idx: u8, value: bool) {
                    debug_assert!(u32::from(bit_idx) < <$t>::BITS);
                    let mask: $t = 1 << bit_idx;
                    if value {
                        *self |= mask;
                    } else {
                        *self &= !mask;
                    }
                }

                fn get_byte(self, byte_nth: u8) -> u8 {
                    debug_assert!(u32::from(byte_nth) * 8 < <$t>::BITS);

                    // We access the byte_nth octet:
                    // from the byte_nth*8 bit to the byte_nth*8+7 bit (inclusive)
                    (self >> (8 * byte_nth)).to_le_bytes()[0]
                }

                fn set_byte(&mut self, byte_nth: u8, value: u8) {
                    debug_assert!(u32::from(byte_nth) * 8 < <$t>::BITS);

                    // Clear the octet, then OR the new one shifted in place.
                    let mask: $t = !(0xFF << (8 * byte_nth));
                    *self = (*self & mask) | (<$t>::from(value) << (8 * byte_nth));
                }

                fn falling_edges(self, next: Self) -> Self {
                    self & !next
                }
            }
        )*
    };
}

impl_bits!(u8, u16, u32);
