use crate::{
    error::{
        invalid_buffer, invalid_range, overflow, value_out_of_range, write_after_final_flush,
        StreamError,
    },
    payload::SharedPayload,
    stream::{
        length_prefix, string_bits, RangedInt, Scratch, Word, LENGTH_TAG_BITS, WORD_BITS,
        WORD_BYTES,
    },
    util::ceil_to_multiple_of,
};

/// Packs typed values into a word buffer at single-bit granularity.
///
/// Values accumulate in a 64-bit scratch register and drain to the buffer one
/// little-endian word at a time, so the final few bits stay in scratch until
/// [`flush_final`](Self::flush_final) is called. All write operations return
/// `&mut Self` for chaining; after the first failure every operation is a
/// no-op, so a chain needs only one [`fail`](Self::fail) check at the end.
///
/// # Examples
///
/// ```
/// use bitwire::BitWriter;
///
/// let mut words = [0u32; 2];
/// let mut writer = BitWriter::new(&mut words, 8);
/// writer
///     .write(42u8, 0, 63)
///     .write_bool(true)
///     .write(-3i32, -8, 7)
///     .flush_final();
/// assert!(!writer.fail());
/// assert_eq!(writer.used_bits(), 6 + 1 + 4);
/// ```
pub struct BitWriter<'buf> {
    scratch: Scratch,
    scratch_bits: u32,
    words: &'buf mut [Word],
    word_idx: usize,
    // The logical length may be shorter than the word view so that only part
    // of the trailing word is writable.
    logical_total_bits: u64,
    logical_used_bits: u64,
    init_fail: bool,
    error: Option<StreamError>,
    final_flushed: bool,
}

impl<'buf> BitWriter<'buf> {
    /// Creates a writer over `words`, allowing writes into the first
    /// `logical_bytes` bytes only.
    ///
    /// The writer is born failed if `words` is empty or `logical_bytes`
    /// exceeds the byte length of `words`.
    pub fn new(words: &'buf mut [Word], logical_bytes: usize) -> Self {
        let mut writer = Self::default();
        writer.reset_with(words, logical_bytes);
        writer
    }

    /// Creates a writer over the data region of `payload`.
    ///
    /// Marks the payload as filled via a bit stream, so that
    /// [`add_to_message`](SharedPayload::add_to_message) rounds the on-wire
    /// length up to a word multiple and the receiving reader can always fetch
    /// the trailing word.
    pub fn from_payload(payload: &'buf mut SharedPayload, logical_bytes: usize) -> Self {
        let mut writer = Self::default();
        writer.reset_with_payload(payload, logical_bytes);
        writer
    }

    /// Restarts the stream so that it can write from the beginning again.
    ///
    /// Does not flush; call [`flush_final`](Self::flush_final) first if the
    /// pending bits matter.
    pub fn restart(&mut self) {
        self.scratch = 0;
        self.scratch_bits = 0;
        self.word_idx = 0;
        self.logical_used_bits = 0;
        self.final_flushed = false;
        self.error = if self.init_fail {
            Some(invalid_buffer())
        } else {
            None
        };
    }

    /// Drops the buffer binding; the writer fails until rebound.
    pub fn reset(&mut self) {
        self.words = &mut [];
        self.logical_total_bits = 0;
        self.init_fail = true;
        self.restart();
    }

    /// Rebinds the stream to `words` and restarts it.
    pub fn reset_with(&mut self, words: &'buf mut [Word], logical_bytes: usize) {
        self.init_fail = words.is_empty() || logical_bytes > words.len() * WORD_BYTES;
        self.words = words;
        self.logical_total_bits = 8 * logical_bytes as u64;
        self.restart();
    }

    /// Rebinds the stream to the data region of `payload` and restarts it.
    ///
    /// See [`from_payload`](Self::from_payload).
    pub fn reset_with_payload(&mut self, payload: &'buf mut SharedPayload, logical_bytes: usize) {
        payload.mark_bit_stream_used();
        self.reset_with(payload.data_words_mut(), logical_bytes);
    }

    /// Whether writing has failed. Once `true`, all operations are no-ops
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

    /// Whether [`flush_final`](Self::flush_final) has been called.
    #[inline]
    pub fn flushed(&self) -> bool {
        self.final_flushed
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

    /// Number of used bytes in the stream (partial trailing bytes count).
    #[inline]
    pub fn used_bytes(&self) -> u64 {
        ceil_to_multiple_of::<8>(self.logical_used_bits) / 8
    }

    /// Number of used bits in the stream.
    #[inline]
    pub fn used_bits(&self) -> u64 {
        self.logical_used_bits
    }

    /// Number of unused bytes in the stream.
    #[inline]
    pub fn unused_bytes(&self) -> u64 {
        self.total_bytes() - self.used_bytes()
    }

    /// Number of unused bits in the stream.
    #[inline]
    pub fn unused_bits(&self) -> u64 {
        self.total_bits() - self.used_bits()
    }

    /// Flushes the bits remaining in scratch to the buffer as one trailing
    /// word.
    ///
    /// Call exactly when done writing: any later write fails the stream.
    /// Idempotent; no-op if the stream has failed.
    pub fn flush_final(&mut self) -> &mut Self {
        if self.fail() {
            return self;
        }
        self.final_flushed = true;
        if self.scratch_bits > 0 {
            self.flush_word_unchecked();
        }
        self
    }

    /// Writes `data`, which must lie in `[min, max]`, using exactly as many
    /// bits as the range spans.
    ///
    /// Fails the stream if `min >= max`, `data` is outside the range, the
    /// stream was already finalized, or the write would exceed capacity; in
    /// every failure case nothing is written.
    pub fn write<T: RangedInt>(&mut self, data: T, min: T, max: T) -> &mut Self {
        if self.fail() {
            return self;
        }
        if self.final_flushed {
            self.error = Some(write_after_final_flush());
            return self;
        }
        if min >= max {
            self.error = Some(invalid_range());
            return self;
        }
        if data < min || data > max {
            self.error = Some(value_out_of_range());
            return self;
        }

        let bits = T::range_bits(min, max);
        if self.logical_used_bits + bits as u64 > self.logical_total_bits {
            self.error = Some(overflow());
            return self;
        }

        self.push_bits(data.to_wire(min), bits);
        self.logical_used_bits += bits as u64;
        self
    }

    /// Writes a bool as a single bit.
    pub fn write_bool(&mut self, data: bool) -> &mut Self {
        self.write(data as u8, 0, 1)
    }

    /// Writes the IEEE-754 bit pattern of `data` in 32 bits.
    pub fn write_f32(&mut self, data: f32) -> &mut Self {
        self.push_checked(data.to_bits() as u64, 32)
    }

    /// Writes the IEEE-754 bit pattern of `data` in 64 bits.
    pub fn write_f64(&mut self, data: f64) -> &mut Self {
        self.push_checked(data.to_bits(), 64)
    }

    /// Writes raw bytes, each as an 8-bit field, in caller order.
    ///
    /// Unlike the word drain, raw bytes are never byteswapped; if the bytes
    /// encode multi-byte values, portability is the caller's concern.
    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        if self.fail() {
            return self;
        }
        if self.final_flushed {
            self.error = Some(write_after_final_flush());
            return self;
        }
        let bits = 8 * data.len() as u64;
        if self.logical_used_bits.saturating_add(bits) > self.logical_total_bits {
            self.error = Some(overflow());
            return self;
        }
        for &byte in data {
            self.push_bits(byte as u64, 8);
        }
        self.logical_used_bits += bits;
        self
    }

    /// Writes a length-prefixed UTF-8 string, one 8-bit field per byte.
    pub fn write_string(&mut self, data: &str) -> &mut Self {
        self.write_prefixed(data.len(), 8, data.bytes().map(u64::from))
    }

    /// Writes a length-prefixed UTF-16 string, one 16-bit field per code unit.
    pub fn write_utf16_string(&mut self, data: &[u16]) -> &mut Self {
        self.write_prefixed(data.len(), 16, data.iter().map(|&unit| unit as u64))
    }

    /// Writes a length-prefixed UTF-32 string, one 32-bit field per scalar.
    pub fn write_utf32_string(&mut self, data: &[char]) -> &mut Self {
        self.write_prefixed(data.len(), 32, data.iter().map(|&ch| ch as u64))
    }

    fn write_prefixed<I>(&mut self, len: usize, elem_bits: u32, elems: I) -> &mut Self
    where
        I: IntoIterator<Item = u64>,
    {
        if self.fail() {
            return self;
        }
        if self.final_flushed {
            self.error = Some(write_after_final_flush());
            return self;
        }
        let total_bits = string_bits(len as u64, elem_bits);
        if self.logical_used_bits.saturating_add(total_bits) > self.logical_total_bits {
            self.error = Some(overflow());
            return self;
        }

        let (tag, field_bits) = length_prefix(len as u64);
        self.push_bits(tag, LENGTH_TAG_BITS);
        self.push_bits(len as u64, field_bits);
        for elem in elems {
            self.push_bits(elem, elem_bits);
        }
        self.logical_used_bits += total_bits;
        self
    }

    fn push_checked(&mut self, value: u64, bits: u32) -> &mut Self {
        if self.fail() {
            return self;
        }
        if self.final_flushed {
            self.error = Some(write_after_final_flush());
            return self;
        }
        if self.logical_used_bits + bits as u64 > self.logical_total_bits {
            self.error = Some(overflow());
            return self;
        }
        self.push_bits(value, bits);
        self.logical_used_bits += bits as u64;
        self
    }

    /// Appends the low `bits` bits of `value` to scratch, draining full words
    /// to the buffer. Values wider than a word go low half first, then the
    /// high half, through the same drain.
    fn push_bits(&mut self, value: u64, bits: u32) {
        debug_assert!(bits >= 1 && bits <= 64);
        debug_assert!(bits == 64 || value < (1u64 << bits));

        let low = value & Word::MAX as Scratch;
        let low_bits = bits.min(WORD_BITS);
        self.scratch |= low << self.scratch_bits;
        self.scratch_bits += low_bits;
        self.flush_on_scratch_overflow();

        let high_bits = bits - low_bits;
        if high_bits > 0 {
            let high = value >> WORD_BITS;
            self.scratch |= high << self.scratch_bits;
            self.scratch_bits += high_bits;
            self.flush_on_scratch_overflow();
        }
    }

    #[inline]
    fn flush_on_scratch_overflow(&mut self) {
        if self.scratch_bits >= WORD_BITS {
            self.flush_word_unchecked();
        }
    }

    /// Stores the low word of scratch as-is, so calling this mid-write would
    /// inject stray zero bits; only the drain and the final flush may call it.
    fn flush_word_unchecked(&mut self) {
        let word = (self.scratch & Word::MAX as Scratch) as Word;
        self.words[self.word_idx] = word.to_le();
        self.word_idx += 1;
        self.scratch >>= WORD_BITS;
        self.scratch_bits = self.scratch_bits.saturating_sub(WORD_BITS);
    }
}

impl Default for BitWriter<'_> {
    /// A writer with no buffer; it fails until rebound with
    /// [`reset_with`](Self::reset_with).
    fn default() -> Self {
        Self {
            scratch: 0,
            scratch_bits: 0,
            words: &mut [],
            word_idx: 0,
            logical_total_bits: 0,
            logical_used_bits: 0,
            init_fail: true,
            error: Some(invalid_buffer()),
            final_flushed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::error::StreamError};

    #[test]
    fn default_writer_is_born_failed() {
        let mut writer = BitWriter::default();
        assert!(writer.fail());
        assert_eq!(writer.error(), Some(StreamError::InvalidBuffer));
        writer.write(1u8, 0, 3);
        assert_eq!(writer.used_bits(), 0);

        let mut words = [0 as Word; 1];
        writer.reset_with(&mut words, 4);
        assert!(!writer.fail());
        writer.write(1u8, 0, 3);
        assert_eq!(writer.used_bits(), 2);
    }

    #[test]
    fn logical_length_beyond_buffer_is_init_failure() {
        let mut words = [0 as Word; 1];
        let writer = BitWriter::new(&mut words, 5);
        assert!(writer.fail());
        assert_eq!(writer.error(), Some(StreamError::InvalidBuffer));
    }

    #[test]
    fn overflow_is_sticky_and_leaves_prior_bytes_valid() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write(0xDEAD_BEEFu32, 0, u32::MAX);
        assert!(!writer.fail());
        assert_eq!(writer.used_bits(), 32);

        writer.write(0u8, 0, u8::MAX);
        assert!(writer.fail());
        assert_eq!(writer.error(), Some(StreamError::Overflow));
        assert_eq!(writer.used_bits(), 32);

        // Still failed after more attempts; the full first word remains intact.
        writer.write_bool(true).write_f64(1.0);
        assert_eq!(writer.error(), Some(StreamError::Overflow));
        assert_eq!(Word::from_le(words[0]), 0xDEAD_BEEF);
    }

    #[test]
    fn restart_clears_failure() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write(1u8, 1, 0);
        assert!(writer.fail());
        writer.restart();
        assert!(!writer.fail());
        writer.write(7u8, 0, 7).flush_final();
        assert!(!writer.fail());
    }

    #[test]
    fn invalid_range_writes_nothing() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write(5u8, 5, 5);
        assert_eq!(writer.error(), Some(StreamError::InvalidRange));
        assert_eq!(writer.used_bits(), 0);

        writer.restart();
        writer.write(9u16, 10, 100);
        assert_eq!(writer.error(), Some(StreamError::ValueOutOfRange));
        assert_eq!(writer.used_bits(), 0);
    }

    #[test]
    fn flush_final_is_idempotent() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write(3u8, 0, 7).flush_final();
        let image = words[0];

        let mut words2 = [0 as Word; 1];
        let mut writer2 = BitWriter::new(&mut words2, 4);
        writer2.write(3u8, 0, 7).flush_final().flush_final();
        assert!(!writer2.fail());
        assert!(writer2.flushed());
        assert_eq!(words2[0], image);
    }

    #[test]
    fn write_after_final_flush_fails() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.flush_final();
        writer.write(1u8, 0, 3);
        assert_eq!(writer.error(), Some(StreamError::WriteAfterFinalFlush));
    }

    #[test]
    fn set_fail_poisons_the_stream() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.set_fail();
        assert_eq!(writer.error(), Some(StreamError::Aborted));
        writer.write(1u8, 0, 3);
        assert_eq!(writer.used_bits(), 0);
    }

    #[test]
    fn accounting_matches_drained_words_plus_scratch() {
        let mut words = [0 as Word; 4];
        let mut writer = BitWriter::new(&mut words, 16);
        writer
            .write(u16::MAX, 0, u16::MAX)
            .write(1u8, 0, 1)
            .write(0x1234_5678_9ABCu64, 0, u64::MAX)
            .write_bool(false);
        assert!(!writer.fail());
        assert_eq!(
            writer.used_bits(),
            WORD_BITS as u64 * writer.word_idx as u64 + writer.scratch_bits as u64
        );
        assert!(writer.scratch <= Word::MAX as Scratch);
        assert_eq!(writer.unused_bits(), writer.total_bits() - writer.used_bits());
    }

    #[test]
    fn string_overflow_writes_nothing() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write_string("abcd");
        assert_eq!(writer.error(), Some(StreamError::Overflow));
        assert_eq!(writer.used_bits(), 0);

        writer.restart();
        writer.write_string("ab");
        assert!(!writer.fail());
        assert_eq!(writer.used_bits(), 10 + 16);
    }

    #[test]
    fn reset_drops_the_binding() {
        let mut words = [0 as Word; 1];
        let mut writer = BitWriter::new(&mut words, 4);
        writer.write(1u8, 0, 3);
        writer.reset();
        assert!(writer.fail());
        assert_eq!(writer.total_bits(), 0);
    }
}
