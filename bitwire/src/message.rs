//! The outbound message record handed to the transport.
use core::{ptr, slice};

/// Opaque peer identifier, assigned by the transport.
pub type ConnectionId = u32;

/// Hook that gives a payload reference back; installed by
/// [`SharedPayload::add_to_message`](crate::SharedPayload::add_to_message)
/// together with the data pointer it receives.
pub(crate) type FreeHook = unsafe fn(*mut u8);

/// One queued send: payload bytes plus the addressing the transport needs.
///
/// A message holds at most one payload reference. [`release`](Self::release)
/// gives it back and runs at most once; dropping the message releases too, so
/// a transport that simply drops every message it was handed keeps the
/// payload refcount balanced.
pub struct OutgoingMessage {
    data: *mut u8,
    size: u32,
    free_hook: Option<FreeHook>,
    /// Peer to deliver to.
    pub connection: ConnectionId,
    /// Transport send flags (reliable/unreliable and friends); opaque here.
    pub flags: i32,
    /// Optional transport priority lane.
    pub lane: u16,
    /// Opaque value echoed back by the transport.
    pub user_data: i64,
}

// SAFETY: `data` points into a refcounted allocation that may be released
// from any thread; the remaining fields are plain values.
unsafe impl Send for OutgoingMessage {}

impl OutgoingMessage {
    pub fn new(connection: ConnectionId, flags: i32, lane: u16, user_data: i64) -> Self {
        Self {
            data: ptr::null_mut(),
            size: 0,
            free_hook: None,
            connection,
            flags,
            lane,
            user_data,
        }
    }

    /// Number of payload bytes to put on the wire.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The payload bytes to put on the wire; empty if nothing is attached.
    #[inline]
    pub fn payload_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: while the hook is pending this message holds one payload
        // reference, which keeps `size` bytes at `data` alive.
        unsafe { slice::from_raw_parts(self.data, self.size as usize) }
    }

    /// Releases the attached payload reference, if any. Runs at most once;
    /// also called on drop.
    pub fn release(&mut self) {
        if let Some(hook) = self.free_hook.take() {
            // SAFETY: `data` was installed together with `hook` and the
            // reference has not been given back yet.
            unsafe { hook(self.data) };
        }
        self.data = ptr::null_mut();
        self.size = 0;
    }

    /// Points the message at `size` bytes of payload and installs the release
    /// hook. Any previously attached payload is released first.
    pub(crate) fn attach(&mut self, data: *mut u8, size: u32, free_hook: FreeHook) {
        self.release();
        self.data = data;
        self.size = size;
        self.free_hook = Some(free_hook);
    }
}

impl Drop for OutgoingMessage {
    fn drop(&mut self) {
        self.release();
    }
}

/// The transport seam: anything that can queue outbound messages.
///
/// The core never talks to sockets; it hands fully-populated messages to a
/// sink in one call and lets the sink deliver them however it likes.
pub trait MessageSink {
    /// Queues `messages` for delivery, writing for each one its assigned
    /// message number (or a negative result code) into the matching slot of
    /// `out_results`.
    ///
    /// Implementations take ownership of the messages and must eventually
    /// drop (or [`release`](OutgoingMessage::release)) every one exactly
    /// once; that is what keeps shared payload refcounts balanced.
    fn send_messages(&mut self, messages: Vec<OutgoingMessage>, out_results: &mut [i64]);
}
