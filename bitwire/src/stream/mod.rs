//! Bit-granular stream types: [`BitWriter`], [`BitReader`] and [`BitMeasurer`].
//!
//! Streams view their buffer as a sequence of 32-bit words in little-endian
//! byte order, packed LSB-first: the first value written lands in the lowest
//! bits of word 0, and a value that crosses a word boundary continues at bit 0
//! of the next word. Any writer/reader pair honoring this layout interoperates
//! byte-for-byte across hosts of either endianness.
use crate::util::bit_width;

mod measurer;
mod reader;
mod writer;

pub use {measurer::BitMeasurer, reader::BitReader, writer::BitWriter};

/// The fixed-size unit at which the writer drains and the reader fetches.
pub type Word = u32;

/// Staging register for partial words; must be exactly twice the word size
/// so a value can straddle a word boundary without spilling.
pub(crate) type Scratch = u64;

pub(crate) const WORD_BITS: u32 = Word::BITS;
pub(crate) const WORD_BYTES: usize = size_of::<Word>();

const _: () = assert!(size_of::<Scratch>() == 2 * size_of::<Word>());

/// Width of the tag selecting the string length field width.
pub(crate) const LENGTH_TAG_BITS: u32 = 2;

/// Pick the smallest length field for `len`: returns `(tag, field_bits)`
/// where `field_bits == 8 << tag`.
#[inline]
pub(crate) const fn length_prefix(len: u64) -> (u64, u32) {
    match len {
        0..=0xFF => (0, 8),
        0x100..=0xFFFF => (1, 16),
        0x1_0000..=0xFFFF_FFFF => (2, 32),
        _ => (3, 64),
    }
}

/// Total bit cost of a length-prefixed string of `len` elements of
/// `elem_bits` each. Saturates instead of overflowing so that capacity
/// checks against absurd lengths still trip.
#[inline]
pub(crate) const fn string_bits(len: u64, elem_bits: u32) -> u64 {
    let (_, field_bits) = length_prefix(len);
    ((LENGTH_TAG_BITS + field_bits) as u64).saturating_add(len.saturating_mul(elem_bits as u64))
}

mod sealed {
    pub trait Sealed {}
}

/// Integers that can be range-packed into a bit stream.
///
/// A value `v` declared to lie in `[min, max]` is transported as the unsigned
/// offset `v - min` in exactly `bit_width(max - min)` bits, so a two-value
/// range costs a single bit and a full-width range costs the full width.
/// Implemented for all fixed-width integers up to 64 bits; sealed because the
/// wire format fixes the set of transportable widths.
pub trait RangedInt: Copy + PartialOrd + sealed::Sealed {
    #[doc(hidden)]
    fn to_wire(self, min: Self) -> u64;
    #[doc(hidden)]
    fn from_wire(raw: u64, min: Self) -> Self;
    #[doc(hidden)]
    fn range_bits(min: Self, max: Self) -> u32;
}

macro_rules! impl_ranged_int {
    ($($ty:ty as $uty:ty),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl RangedInt for $ty {
            #[inline(always)]
            fn to_wire(self, min: Self) -> u64 {
                (self as $uty).wrapping_sub(min as $uty) as u64
            }

            #[inline(always)]
            fn from_wire(raw: u64, min: Self) -> Self {
                (min as $uty).wrapping_add(raw as $uty) as $ty
            }

            #[inline(always)]
            fn range_bits(min: Self, max: Self) -> u32 {
                bit_width((max as $uty).wrapping_sub(min as $uty) as u64)
            }
        }
    )*};
}

impl_ranged_int!(
    u8 as u8,
    u16 as u16,
    u32 as u32,
    u64 as u64,
    i8 as u8,
    i16 as u16,
    i32 as u32,
    i64 as u64,
);
