//! Reference-counted payload allocations shared across outbound messages.
use {
    crate::{
        error::{out_of_memory, PayloadError},
        message::OutgoingMessage,
        stream::{Word, WORD_BYTES},
        util::ceil_to_multiple_of,
    },
    core::{
        ptr::NonNull,
        slice,
        sync::atomic::{AtomicI32, AtomicU32, Ordering},
    },
    std::alloc::{alloc_zeroed, dealloc, Layout},
};

/// The transport's per-message byte ceiling; larger allocations are refused.
pub const MAX_MSG_SEND_SIZE: u32 = 512 * 1024;

const SIZE_MASK: u32 = 0x7FFF_FFFF;
const BIT_STREAM_FLAG: u32 = 0x8000_0000;

/// Hidden bookkeeping stored directly in front of the data region, in the
/// same allocation.
///
/// `size_and_flag` keeps the requested payload size in the low 31 bits and a
/// "filled via bit stream" marker in the high bit.
#[repr(C)]
struct PayloadHeader {
    ref_count: AtomicI32,
    size_and_flag: AtomicU32,
}

const HEADER_BYTES: usize = size_of::<PayloadHeader>();

// The data region must start word-aligned right after the header, or writer
// word stores would be misaligned.
const _: () = assert!(HEADER_BYTES % WORD_BYTES == 0);
const _: () = assert!(align_of::<PayloadHeader>() % align_of::<Word>() == 0);
const _: () = assert!(WORD_BYTES == 4);

/// A heap buffer whose data region can back any number of outbound messages
/// and is freed when the last of them releases it.
///
/// The handle points at the data region; the reference count and size live in
/// a hidden header in front of it, so the whole payload is one allocation.
/// The count starts at zero: allocating yields a bare handle, and each
/// [`add_to_message`](Self::add_to_message) takes one reference that the
/// message's release hook gives back. Dropping the handle itself frees
/// nothing; a payload that is never sent must be explicitly returned with
/// [`force_deallocate`](Self::force_deallocate).
///
/// # Examples
///
/// ```
/// use bitwire::{BitWriter, SharedPayload};
///
/// let mut payload = SharedPayload::allocate(16).unwrap();
/// let mut writer = BitWriter::from_payload(&mut payload, 16);
/// writer.write(777u16, 0, 999).flush_final();
/// assert!(!writer.fail());
/// assert!(payload.used_bit_stream());
///
/// // Never sent, so give it back explicitly.
/// payload.force_deallocate();
/// ```
pub struct SharedPayload {
    data: NonNull<u8>,
}

// SAFETY: the handle addresses a refcounted allocation; the count is atomic
// and synchronization of the data region is the sender/transport handoff's
// concern, as for any shared buffer.
unsafe impl Send for SharedPayload {}
// SAFETY: all shared-reference methods only load atomics or read the data
// region.
unsafe impl Sync for SharedPayload {}

impl SharedPayload {
    /// Allocates a payload of `size` bytes with a zero reference count.
    ///
    /// The data region is rounded up to a whole number of words so a bit
    /// stream writer's final word flush stays inside the allocation.
    pub fn allocate(size: u32) -> Result<Self, PayloadError> {
        if size == 0 {
            return Err(PayloadError::ZeroSize);
        }
        if size > MAX_MSG_SEND_SIZE {
            return Err(PayloadError::ExceedsSendLimit {
                requested: size,
                limit: MAX_MSG_SEND_SIZE,
            });
        }

        let data_bytes = ceil_to_multiple_of::<4>(size as u64) as usize;
        let total = HEADER_BYTES + data_bytes;
        // SAFETY: the alignment is a nonzero power of two and `total` is
        // bounded by MAX_MSG_SEND_SIZE plus the header.
        let layout = unsafe { Layout::from_size_align_unchecked(total, align_of::<PayloadHeader>()) };
        // Zeroed, so the byte views never expose uninitialized memory.
        // SAFETY: `layout` has nonzero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(base) = NonNull::new(raw) else {
            return Err(out_of_memory(total));
        };
        // SAFETY: `base` is freshly allocated with room and alignment for the
        // header.
        unsafe {
            base.cast::<PayloadHeader>().write(PayloadHeader {
                ref_count: AtomicI32::new(0),
                size_and_flag: AtomicU32::new(size),
            });
        }
        #[cfg(test)]
        alloc_stats::ALLOCS.fetch_add(1, Ordering::SeqCst);

        // SAFETY: the data region starts `HEADER_BYTES` into the allocation.
        Ok(Self {
            data: unsafe { base.add(HEADER_BYTES) },
        })
    }

    /// Frees a payload that was never handed to a message.
    ///
    /// Once sent, the transport owns the references and frees the payload
    /// when the last message releases; calling this afterwards would be a
    /// double free, so it panics if any reference is outstanding.
    pub fn force_deallocate(self) {
        let refs = self.header().ref_count.load(Ordering::Relaxed);
        assert!(
            refs == 0,
            "payload still referenced by {refs} in-flight message(s)"
        );
        // SAFETY: the count is zero, so no message references the allocation,
        // and `self` is consumed, so no handle outlives it.
        unsafe { deallocate(self.data.as_ptr()) };
    }

    /// The requested payload size in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.header().size_and_flag.load(Ordering::Relaxed) & SIZE_MASK
    }

    /// [`size`](Self::size) rounded up to a word multiple: the upper bound a
    /// bit stream writer may touch.
    #[inline]
    pub fn word_ceiled_size(&self) -> u32 {
        ceil_to_multiple_of::<4>(self.size() as u64) as u32
    }

    /// Whether this payload was filled through a bit stream writer.
    #[inline]
    pub fn used_bit_stream(&self) -> bool {
        self.header().size_and_flag.load(Ordering::Relaxed) & BIT_STREAM_FLAG != 0
    }

    /// Size of the whole backing allocation, header included.
    #[inline]
    pub fn internal_alloc_size(&self) -> usize {
        HEADER_BYTES + self.word_ceiled_size() as usize
    }

    /// Raw pointer to the data region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// The data region as bytes ([`size`](Self::size) of them).
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the allocation covers `size()` bytes from `data` and the
        // handle keeps it alive.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.size() as usize) }
    }

    /// The data region as mutable bytes, for filling a payload directly
    /// instead of through a bit stream writer.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes this the only live view through
        // the handle.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.size() as usize) }
    }

    /// The full word-ceiled data region as words, for binding a bit stream
    /// writer.
    pub(crate) fn data_words_mut(&mut self) -> &mut [Word] {
        // SAFETY: the allocation covers `word_ceiled_size()` bytes from
        // `data`, which is word-aligned by the header layout assertions.
        unsafe {
            slice::from_raw_parts_mut(
                self.data.as_ptr().cast::<Word>(),
                self.word_ceiled_size() as usize / WORD_BYTES,
            )
        }
    }

    /// Marks the payload as written via a bit stream.
    pub(crate) fn mark_bit_stream_used(&self) {
        self.header()
            .size_and_flag
            .fetch_or(BIT_STREAM_FLAG, Ordering::Relaxed);
    }

    /// Attaches this payload to an outbound message, taking one reference.
    ///
    /// `logical_bytes` is the caller's on-wire length; when the payload was
    /// filled via a bit stream it is rounded up to a word multiple so the
    /// receiver's reader can always fetch the trailing word. The message's
    /// release hook gives the reference back, and the last release frees the
    /// allocation.
    pub fn add_to_message(&self, message: &mut OutgoingMessage, logical_bytes: u32) {
        let on_wire = if self.used_bit_stream() {
            ceil_to_multiple_of::<4>(logical_bytes as u64) as u32
        } else {
            logical_bytes
        };
        self.header().ref_count.fetch_add(1, Ordering::Relaxed);
        message.attach(self.data.as_ptr(), on_wire, release_payload);
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> i32 {
        self.header().ref_count.load(Ordering::Relaxed)
    }

    #[inline]
    fn header(&self) -> &PayloadHeader {
        // SAFETY: `data` always points exactly `HEADER_BYTES` past the start
        // of a live allocation that begins with a `PayloadHeader`.
        unsafe { self.data.cast::<PayloadHeader>().sub(1).as_ref() }
    }
}

impl core::fmt::Debug for SharedPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedPayload")
            .field("size", &self.size())
            .field("used_bit_stream", &self.used_bit_stream())
            .finish_non_exhaustive()
    }
}

/// Message release hook: reconstructs the header from the data pointer and
/// gives one reference back. The decrement that observes the previous count
/// of 1 frees.
///
/// # Safety
///
/// `data` must be the data pointer of a live payload allocation holding at
/// least one reference.
pub(crate) unsafe fn release_payload(data: *mut u8) {
    // SAFETY: per the contract, `data` points just past a live header.
    let header = unsafe { &*data.sub(HEADER_BYTES).cast::<PayloadHeader>() };
    // Relaxed suffices: the refcount does not gate data visibility, the
    // transport's message handoff does.
    if header.ref_count.fetch_sub(1, Ordering::Relaxed) == 1 {
        // SAFETY: we observed the last reference, so nothing else can touch
        // the allocation anymore.
        unsafe { deallocate(data) };
    }
}

/// # Safety
///
/// `data` must be the data pointer of a live payload allocation with no
/// remaining references, and must not be used afterwards.
unsafe fn deallocate(data: *mut u8) {
    let base = unsafe { data.sub(HEADER_BYTES) };
    let stored = unsafe { &*base.cast::<PayloadHeader>() }
        .size_and_flag
        .load(Ordering::Relaxed)
        & SIZE_MASK;
    let total = HEADER_BYTES + ceil_to_multiple_of::<4>(stored as u64) as usize;
    #[cfg(test)]
    alloc_stats::FREES.fetch_add(1, Ordering::SeqCst);
    // SAFETY: `base` and the recomputed layout are exactly what `allocate`
    // produced.
    unsafe {
        dealloc(
            base,
            Layout::from_size_align_unchecked(total, align_of::<PayloadHeader>()),
        );
    }
}
