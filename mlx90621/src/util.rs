// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The word size of the sensor in terms of 8-bit bytes.
pub(crate) const WORD_SIZE: usize = (u16::BITS / u8::BITS) as usize;

#[doc(hidden)]
#[macro_export]
macro_rules! expose_member {
    ($name:ident, $typ:ty) => {
        pub fn $name(&self) -> $typ {
            self.$name
        }
    };
    (&$name:ident, $typ:ty) => {
        pub fn $name(&self) -> &$typ {
            &self.$name
        }
    };
}

/// Sequential little-endian reads off the front of a byte slice, in the style of [bytes::Buf].
///
/// The MLX90621 stores (and sends) everything least significant byte first.
///
/// [bytes::Buf]: https://docs.rs/bytes/*/bytes/trait.Buf.html
pub(crate) trait Buffer {
    fn get_u8(&mut self) -> u8;
    fn get_i8(&mut self) -> i8;
    fn get_u16_le(&mut self) -> u16;
    fn get_i16_le(&mut self) -> i16;
}

impl Buffer for &[u8] {
    fn get_u8(&mut self) -> u8 {
        let (byte, rest) = self.split_at(1);
        *self = rest;
        byte[0]
    }

    fn get_i8(&mut self) -> i8 {
        let (byte, rest) = self.split_at(1);
        *self = rest;
        i8::from_le_bytes([byte[0]])
    }

    fn get_u16_le(&mut self) -> u16 {
        let (bytes, rest) = self.split_at(WORD_SIZE);
        *self = rest;
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn get_i16_le(&mut self) -> i16 {
        let (bytes, rest) = self.split_at(WORD_SIZE);
        *self = rest;
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

/// Split a byte into its (high, low) nibbles.
///
/// The calibration memory packs pairs of scale exponents into single bytes this way.
pub(crate) fn nibbles(byte: u8) -> (u8, u8) {
    ((byte & 0xF0) >> 4, byte & 0x0F)
}
