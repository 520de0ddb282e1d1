use crate::{
    error::{
        exhausted, invalid_buffer, invalid_range, invalid_scalar, invalid_utf8,
        malformed_length_prefix, string_too_long, value_out_of_range, StreamError,
    },
    stream::{RangedInt, Scratch, Word, LENGTH_TAG_BITS, WORD_BITS, WORD_BYTES},
    util::ceil_to_multiple_of,
};

/// Unpacks typed values from a word buffer written by
/// [`BitWriter`](crate::BitWriter).
///
/// Words are fetched into a 64-bit scratch register on demand; values up to a
/// word wide need at most one fetch, wider values at most two. Like the
/// writer, failure is sticky: after the first failure every operation is a
/// no-op and ranged reads return `min`, so a chain needs only one
/// [`fail`](Self::fail) check at the end. Out-parameters are left untouched
/// when an operation fails.
///
/// # Examples
///
/// ```
/// use bitwire::{BitReader, BitWriter};
///
/// let mut words = [0u32; 2];
/// let mut writer = BitWriter::new(&mut words, 8);
/// writer.write(42u8, 0, 63).write_bool(true).flush_final();
/// let used = writer.used_bytes() as usize;
///
/// let mut reader = BitReader::new(&words, used);
/// assert_eq!(reader.read(0u8, 63), 42);
/// assert!(reader.read_bool());
/// assert!(!reader.fail());
/// ```
pub struct BitReader<'buf> {
    scratch: Scratch,
    scratch_bits: u32,
    words: &'buf [Word],
    word_idx: usize,
    logical_total_bits: u64,
    logical_used_bits: u64,
    init_fail: bool,
    error: Option<StreamError>,
}

impl<'buf> BitReader<'buf> {
    /// Creates a reader over `words`, allowing reads from the first
    /// `logical_bytes` bytes only.
    ///
    /// The reader is born failed if `words` is empty or `logical_bytes`
    /// exceeds the byte length of `words`.
    pub fn new(words: &'buf [Word], logical_bytes: usize) -> Self {
        let mut reader = Self::default();
        reader.reset_with(words, logical_bytes);
        reader
    }

    /// Creates a reader over a received byte buffer.
    ///
    /// `bytes` must be word-aligned and a whole number of words long (the
    /// sender's payload path guarantees both); otherwise the reader is born
    /// failed.
    pub fn from_bytes(bytes: &'buf [u8], logical_bytes: usize) -> Self {
        match bytemuck::try_cast_slice(bytes) {
            Ok(words) => Self::new(words, logical_bytes),
            Err(_) => Self::default(),
        }
    }

    /// Restarts the stream so that it can read from the beginning again.
    pub fn restart(&mut self) {
        self.scratch = 0;
        self.scratch_bits = 0;
        self.word_idx = 0;
        self.logical_used_bits = 0;
        self.error = if self.init_fail {
            Some(invalid_buffer())
        } else {
            None
        };
    }

    /// Drops the buffer binding; the reader fails until rebound.
    pub fn reset(&mut self) {
        self.words = &[];
        self.logical_total_bits = 0;
        self.init_fail = true;
        self.restart();
    }

    /// Rebinds the stream to `words` and restarts it.
    pub fn reset_with(&mut self, words: &'buf [Word], logical_bytes: usize) {
        self.init_fail = words.is_empty() || logical_bytes > words.len() * WORD_BYTES;
        self.words = words;
        self.logical_total_bits = 8 * logical_bytes as u64;
        self.restart();
    }

    /// Whether reading has failed. Once `true`, all operations are no-ops
    /// until [`restart`](Self::restart) or a rebind.
    #[inline]
    pub fn fail(&self) -> bool {
        self.error.is_some()
    }

    /// The first failure recorded on this stream, if any.
    #[inline]
    pub fn error(&self) -> Option<StreamError> {
        self.error
    }

    /// Fails the stream deliberately. Later operations become no-ops.
    pub fn set_fail(&mut self) {
        if self.error.is_none() {
            self.error = Some(StreamError::Aborted);
        }
    }

    /// Number of total bytes in the stream.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.logical_total_bits / 8
    }

    /// Number of total bits in the stream.
    #[inline]
    pub fn total_bits(&self) -> u64 {
        self.logical_total_bits
    }

    /// Number of consumed bytes in the stream (partial trailing bytes count).
    #[inline]
    pub fn used_bytes(&self) -> u64 {
        ceil_to_multiple_of::<8>(self.logical_used_bits) / 8
    }

    /// Number of consumed bits in the stream.
    #[inline]
    pub fn used_bits(&self) -> u64 {
        self.logical_used_bits
    }

    /// Number of remaining bytes in the stream.
    #[inline]
    pub fn unused_bytes(&self) -> u64 {
        self.total_bytes() - self.used_bytes()
    }

    /// Number of remaining bits in the stream.
    #[inline]
    pub fn unused_bits(&self) -> u64 {
        self.total_bits() - self.used_bits()
    }

    /// Reads a value declared to lie in `[min, max]`, consuming exactly as
    /// many bits as the range spans.
    ///
    /// Returns `min` and fails the stream if `min >= max`, not enough bits
    /// remain, or the decoded value falls outside the range (a corrupt or
    /// malicious stream can produce one, since the field width rounds up).
    /// Returns `min` without consuming anything once the stream has failed.
    pub fn read<T: RangedInt>(&mut self, min: T, max: T) -> T {
        if self.fail() {
            return min;
        }
        if min >= max {
            self.error = Some(invalid_range());
            return min;
        }
        let bits = T::range_bits(min, max);
        let Some(raw) = self.read_raw(bits) else {
            return min;
        };
        let value = T::from_wire(raw, min);
        if value < min || value > max {
            self.error = Some(value_out_of_range());
            return min;
        }
        value
    }

    /// Reads a bool from a single bit. Returns `false` once failed.
    pub fn read_bool(&mut self) -> bool {
        self.read(0u8, 1) != 0
    }

    /// Reads 32 bits and reinterprets them as an IEEE-754 float.
    /// Returns `0.0` once failed.
    pub fn read_f32(&mut self) -> f32 {
        match self.read_raw(32) {
            Some(raw) => f32::from_bits(raw as u32),
            None => 0.0,
        }
    }

    /// Reads 64 bits and reinterprets them as an IEEE-754 double.
    /// Returns `0.0` once failed.
    pub fn read_f64(&mut self) -> f64 {
        match self.read_raw(64) {
            Some(raw) => f64::from_bits(raw),
            None => 0.0,
        }
    }

    /// Reads `data.len()` raw bytes, each from an 8-bit field, in wire order.
    /// `data` is left untouched on failure.
    pub fn read_bytes(&mut self, data: &mut [u8]) -> &mut Self {
        if self.fail() {
            return self;
        }
        let bits = 8 * data.len() as u64;
        if self.logical_used_bits.saturating_add(bits) > self.logical_total_bits {
            self.error = Some(exhausted());
            return self;
        }
        for byte in data.iter_mut() {
            *byte = self.pull_bits(8) as u8;
        }
        self.logical_used_bits += bits;
        self
    }

    /// Reads a length-prefixed UTF-8 string into `out`.
    ///
    /// Fails (leaving `out` untouched) if the prefix is malformed, the length
    /// exceeds `max_length` bytes, the stream runs out of bits, or the bytes
    /// are not valid UTF-8.
    pub fn read_string(&mut self, out: &mut String, max_length: usize) -> &mut Self {
        if self.fail() {
            return self;
        }
        let Some(len) = self.read_length_prefix(max_length as u64) else {
            return self;
        };
        let len = len as usize;
        let bits = 8 * len as u64;
        if self.logical_used_bits.saturating_add(bits) > self.logical_total_bits {
            self.error = Some(exhausted());
            return self;
        }
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.pull_bits(8) as u8);
        }
        self.logical_used_bits += bits;
        match String::from_utf8(bytes) {
            Ok(string) => *out = string,
            Err(_) => self.error = Some(invalid_utf8()),
        }
        self
    }

    /// Reads a length-prefixed UTF-16 string into `out`.
    ///
    /// `max_length` bounds the number of 16-bit code units. Code units are
    /// not validated; unpaired surrogates pass through as written.
    pub fn read_utf16_string(&mut self, out: &mut Vec<u16>, max_length: usize) -> &mut Self {
        if self.fail() {
            return self;
        }
        let Some(len) = self.read_length_prefix(max_length as u64) else {
            return self;
        };
        let len = len as usize;
        let bits = 16 * len as u64;
        if self.logical_used_bits.saturating_add(bits) > self.logical_total_bits {
            self.error = Some(exhausted());
            return self;
        }
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.pull_bits(16) as u16);
        }
        self.logical_used_bits += bits;
        *out = units;
        self
    }

    /// Reads a length-prefixed UTF-32 string into `out`.
    ///
    /// `max_length` bounds the number of scalars. Fails (leaving `out`
    /// untouched) if any 32-bit field is not a valid Unicode scalar value.
    pub fn read_utf32_string(&mut self, out: &mut Vec<char>, max_length: usize) -> &mut Self {
        if self.fail() {
            return self;
        }
        let Some(len) = self.read_length_prefix(max_length as u64) else {
            return self;
        };
        let len = len as usize;
        let bits = 32 * len as u64;
        if self.logical_used_bits.saturating_add(bits) > self.logical_total_bits {
            self.error = Some(exhausted());
            return self;
        }
        let mut scalars = Vec::with_capacity(len);
        for _ in 0..len {
            let raw = self.pull_bits(32) as u32;
            match char::from_u32(raw) {
                Some(ch) => scalars.push(ch),
                None => {
                    self.error = Some(invalid_scalar());
                    return self;
                }
            }
        }
        self.logical_used_bits += bits;
        *out = scalars;
        self
    }

    /// Peeks the string length prefix at the current position without
    /// consuming it.
    ///
    /// Returns the element count a following `read_*_string` would see, or a
    /// negative value (failing the stream) if no valid prefix is readable.
    /// The stream position is restored either way. If the current position is
    /// not actually on a string prefix, the returned length is garbage.
    pub fn peek_string_length(&mut self) -> i64 {
        if self.fail() {
            return -1;
        }
        let saved = (
            self.scratch,
            self.scratch_bits,
            self.word_idx,
            self.logical_used_bits,
        );
        let peeked = self.peek_prefix();
        (
            self.scratch,
            self.scratch_bits,
            self.word_idx,
            self.logical_used_bits,
        ) = saved;
        peeked.unwrap_or(-1)
    }

    fn peek_prefix(&mut self) -> Option<i64> {
        let tag = self.read_raw(LENGTH_TAG_BITS)?;
        let len = self.read_raw(8 << tag)?;
        if len > i64::MAX as u64 {
            self.error = Some(malformed_length_prefix());
            return None;
        }
        Some(len as i64)
    }

    fn read_length_prefix(&mut self, max_length: u64) -> Option<u64> {
        let tag = self.read_raw(LENGTH_TAG_BITS)?;
        let len = self.read_raw(8 << tag)?;
        if len > i64::MAX as u64 {
            self.error = Some(malformed_length_prefix());
            return None;
        }
        if len > max_length {
            self.error = Some(string_too_long(len, max_length));
            return None;
        }
        Some(len)
    }

    /// Reads the low `bits` bits of a value, low word half first for values
    /// wider than a word. `None` (with the stream failed) on exhaustion.
    fn read_raw(&mut self, bits: u32) -> Option<u64> {
        if self.fail() {
            return None;
        }
        if self.logical_used_bits + bits as u64 > self.logical_total_bits {
            self.error = Some(exhausted());
            return None;
        }
        let low_bits = bits.min(WORD_BITS);
        let mut value = self.pull_bits(low_bits);
        let high_bits = bits - low_bits;
        if high_bits > 0 {
            value |= self.pull_bits(high_bits) << WORD_BITS;
        }
        self.logical_used_bits += bits as u64;
        Some(value)
    }

    /// Takes `bits` bits out of scratch, fetching one word first if scratch
    /// runs short. Callers must have bounds-checked against the logical
    /// length, which also guarantees the word fetch stays inside the buffer.
    fn pull_bits(&mut self, bits: u32) -> u64 {
        debug_assert!(bits >= 1 && bits <= WORD_BITS);
        if self.scratch_bits < bits {
            self.fetch_word();
        }
        let value = self.scratch & ((1u64 << bits) - 1);
        self.scratch >>= bits;
        self.scratch_bits -= bits;
        value
    }

    fn fetch_word(&mut self) {
        let word = Word::from_le(self.words[self.word_idx]);
        self.word_idx += 1;
        self.scratch |= (word as Scratch) << self.scratch_bits;
        self.scratch_bits += WORD_BITS;
    }
}

impl Default for BitReader<'_> {
    /// A reader with no buffer; it fails until rebound with
    /// [`reset_with`](Self::reset_with).
    fn default() -> Self {
        Self {
            scratch: 0,
            scratch_bits: 0,
            words: &[],
            word_idx: 0,
            logical_total_bits: 0,
            logical_used_bits: 0,
            init_fail: true,
            error: Some(invalid_buffer()),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::BitWriter};

    fn written(build: impl FnOnce(&mut BitWriter<'_>), words: &mut [Word]) -> usize {
        let logical = words.len() * WORD_BYTES;
        let mut writer = BitWriter::new(words, logical);
        build(&mut writer);
        writer.flush_final();
        assert!(!writer.fail());
        writer.used_bytes() as usize
    }

    #[test]
    fn exhaustion_fails_and_returns_min() {
        let words = [0 as Word; 1];
        let mut reader = BitReader::new(&words, 4);
        assert_eq!(reader.read(7u64, u64::MAX), 7);
        assert_eq!(reader.error(), Some(StreamError::Exhausted));

        // Sticky: a read that would fit also fails now.
        assert_eq!(reader.read(0u8, 3), 0);
        assert_eq!(reader.error(), Some(StreamError::Exhausted));
    }

    #[test]
    fn out_of_range_bit_pattern_is_rejected() {
        let mut words = [0 as Word; 1];
        let used = written(|w| { w.write(7u8, 0, 7); }, &mut words);

        // Same 3-bit field, tighter declared range.
        let mut reader = BitReader::new(&words, used);
        assert_eq!(reader.read(0u8, 5), 0);
        assert_eq!(reader.error(), Some(StreamError::ValueOutOfRange));
    }

    #[test]
    fn invalid_range_fails() {
        let words = [0 as Word; 1];
        let mut reader = BitReader::new(&words, 4);
        assert_eq!(reader.read(3u8, 3), 3);
        assert_eq!(reader.error(), Some(StreamError::InvalidRange));
    }

    #[test]
    fn peek_then_read_string() {
        let mut words = [0 as Word; 2];
        let used = written(|w| { w.write_string("hey"); }, &mut words);

        let mut reader = BitReader::new(&words, used);
        assert_eq!(reader.peek_string_length(), 3);
        // Position is restored, so the full string still reads.
        let mut out = String::new();
        reader.read_string(&mut out, 3);
        assert!(!reader.fail());
        assert_eq!(out, "hey");
    }

    #[test]
    fn peek_on_exhausted_stream_is_negative_and_fails() {
        let words = [0 as Word; 1];
        let mut reader = BitReader::new(&words, 1);
        // One logical byte cannot hold a 2-bit tag plus an 8-bit length.
        assert!(reader.peek_string_length() < 0);
        assert_eq!(reader.error(), Some(StreamError::Exhausted));
    }

    #[test]
    fn string_longer_than_max_length_fails_untouched() {
        let mut words = [0 as Word; 2];
        let used = written(|w| { w.write_string("hello"); }, &mut words);

        let mut reader = BitReader::new(&words, used);
        let mut out = String::from("sentinel");
        reader.read_string(&mut out, 4);
        assert_eq!(reader.error(), Some(StreamError::StringTooLong {
            length: 5,
            max_length: 4,
        }));
        assert_eq!(out, "sentinel");
    }

    #[test]
    fn non_utf8_string_bytes_fail() {
        let mut words = [0 as Word; 1];
        // Hand-rolled prefix: tag 0, length 1, then an invalid lone 0xFF.
        let used = written(
            |w| {
                w.write(0u8, 0, 3).write(1u8, 0, u8::MAX).write(0xFFu8, 0, u8::MAX);
            },
            &mut words,
        );

        let mut reader = BitReader::new(&words, used);
        let mut out = String::from("sentinel");
        reader.read_string(&mut out, 16);
        assert_eq!(reader.error(), Some(StreamError::InvalidUtf8));
        assert_eq!(out, "sentinel");
    }

    #[test]
    fn invalid_scalar_fails_utf32_read() {
        let mut words = [0 as Word; 2];
        // Tag 0, length 1, then a surrogate code point.
        let used = written(
            |w| {
                w.write(0u8, 0, 3)
                    .write(1u8, 0, u8::MAX)
                    .write(0xD800u32, 0, u32::MAX);
            },
            &mut words,
        );

        let mut reader = BitReader::new(&words, used);
        let mut out = Vec::new();
        reader.read_utf32_string(&mut out, 16);
        assert_eq!(reader.error(), Some(StreamError::InvalidScalar));
        assert!(out.is_empty());
    }

    #[test]
    fn read_bytes_round_trips_and_stays_untouched_on_failure() {
        let payload = [1u8, 2, 3, 4, 5];
        let mut words = [0 as Word; 2];
        let used = written(|w| { w.write_bytes(&payload); }, &mut words);

        let mut reader = BitReader::new(&words, used);
        let mut out = [0u8; 5];
        reader.read_bytes(&mut out);
        assert!(!reader.fail());
        assert_eq!(out, payload);

        let mut too_much = [0xAAu8; 8];
        reader.read_bytes(&mut too_much);
        assert_eq!(reader.error(), Some(StreamError::Exhausted));
        assert_eq!(too_much, [0xAAu8; 8]);
    }

    #[test]
    fn restart_rewinds_to_the_start() {
        let mut words = [0 as Word; 1];
        let used = written(|w| { w.write(123u8, 0, u8::MAX); }, &mut words);

        let mut reader = BitReader::new(&words, used);
        assert_eq!(reader.read(0u8, u8::MAX), 123);
        reader.restart();
        assert_eq!(reader.read(0u8, u8::MAX), 123);
        assert!(!reader.fail());
    }

    #[test]
    fn from_bytes_rejects_partial_words() {
        let bytes = [0u8; 6];
        let reader = BitReader::from_bytes(&bytes, 6);
        assert!(reader.fail());
    }

    #[test]
    fn from_bytes_rejects_misaligned_buffers() {
        let words = [0 as Word; 3];
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        let reader = BitReader::from_bytes(&bytes[1..9], 8);
        assert!(reader.fail());
    }

    #[test]
    fn from_bytes_accepts_word_shaped_buffers() {
        let mut words = [0 as Word; 1];
        let used = written(|w| { w.write(9u8, 0, 15); }, &mut words);

        let bytes: &[u8] = bytemuck::cast_slice(&words);
        let mut reader = BitReader::from_bytes(bytes, used.max(1));
        assert_eq!(reader.read(0u8, 15), 9);
        assert!(!reader.fail());
    }

    #[test]
    fn set_fail_poisons_the_stream() {
        let words = [0 as Word; 1];
        let mut reader = BitReader::new(&words, 4);
        reader.set_fail();
        assert_eq!(reader.error(), Some(StreamError::Aborted));
        assert_eq!(reader.read(0u8, 3), 0);
    }
}
