//! bitwire packs game-networking messages down to the bit: a writer/reader
//! pair that serializes typed values into word buffers one bit at a time,
//! and a reference-counted payload allocation that lets one packed blob back
//! many outbound messages.
//!
//! Integers are range-coded: a value declared to lie in `[min, max]` costs
//! exactly as many bits as the range spans, so a health value in `[0, 1000]`
//! travels in 10 bits instead of 32. Strings carry a self-describing length
//! prefix (2-bit width tag plus an 8/16/32/64-bit length), keeping tiny
//! strings tiny while still admitting huge ones. The wire format is fixed
//! little-endian at 32-bit word granularity and reproduces byte-for-byte on
//! hosts of either endianness.
//!
//! # Quickstart
//!
//! Writes chain; failure is sticky, so one [`fail`](BitWriter::fail) check at
//! the end covers the whole chain.
//!
//! ```
//! use bitwire::{BitReader, BitWriter};
//!
//! let mut words = [0u32; 4];
//! let mut writer = BitWriter::new(&mut words, 16);
//! writer
//!     .write(200u8, 0, u8::MAX)
//!     .write_bool(true)
//!     .write(1000u16, 0, 1023)
//!     .write_string("hi")
//!     .flush_final();
//! assert!(!writer.fail());
//!
//! let used = writer.used_bytes() as usize;
//! let mut reader = BitReader::new(&words, used);
//! assert_eq!(reader.read(0u8, u8::MAX), 200);
//! assert!(reader.read_bool());
//! assert_eq!(reader.read(0u16, 1023), 1000);
//! let mut out = String::new();
//! reader.read_string(&mut out, 16);
//! assert_eq!(out, "hi");
//! assert!(!reader.fail());
//! ```
//!
//! # Sizing before allocating
//!
//! [`BitMeasurer`] accepts the same `write_*` calls as the writer but only
//! counts bits, so a payload can be allocated at exactly the right size.
//!
//! ```
//! use bitwire::{BitMeasurer, BitWriter, SharedPayload};
//!
//! let mut measurer = BitMeasurer::new();
//! measurer.write(3u8, 0, 7).write_f32(0.25).write_string("pos");
//!
//! let mut payload = SharedPayload::allocate(measurer.used_bytes() as u32).unwrap();
//! let size = payload.size() as usize;
//! let mut writer = BitWriter::from_payload(&mut payload, size);
//! writer.write(3u8, 0, 7).write_f32(0.25).write_string("pos").flush_final();
//! assert!(!writer.fail());
//! assert_eq!(writer.used_bytes(), measurer.used_bytes());
//!
//! // Never handed to a message in this example, so give it back explicitly.
//! payload.force_deallocate();
//! ```
//!
//! # One payload, many peers
//!
//! [`multicast`] attaches the *same* payload to one message per connection:
//! the bytes are packed once, the refcount goes to N, and the allocation is
//! freed exactly once when the transport releases the last message.
//!
//! ```
//! use bitwire::{multicast, BitWriter, MessageSink, OutgoingMessage, SharedPayload};
//!
//! /// A sink that delivers nowhere and releases everything immediately.
//! struct NullSink;
//!
//! impl MessageSink for NullSink {
//!     fn send_messages(&mut self, messages: Vec<OutgoingMessage>, out_results: &mut [i64]) {
//!         for (slot, _message) in out_results.iter_mut().zip(&messages) {
//!             *slot = 1;
//!         }
//!         // Dropping the messages releases their payload references.
//!     }
//! }
//!
//! let mut payload = SharedPayload::allocate(8).unwrap();
//! let mut writer = BitWriter::from_payload(&mut payload, 8);
//! writer.write(12345u32, 0, u32::MAX).flush_final();
//! assert!(!writer.fail());
//! let used = writer.used_bytes() as u32;
//!
//! let mut results = [0i64; 3];
//! multicast(&mut NullSink, [1u32, 2, 3], &payload, used, 0, 0, 0, &mut results);
//! assert_eq!(results, [1, 1, 1]);
//! // The last release freed the allocation; the bare handle just goes away.
//! ```

pub mod error;
pub use error::{PayloadError, StreamError};
pub mod stream;
pub use stream::{BitMeasurer, BitReader, BitWriter, RangedInt, Word};
mod payload;
pub use payload::{SharedPayload, MAX_MSG_SEND_SIZE};
mod message;
pub use message::{ConnectionId, MessageSink, OutgoingMessage};
mod send;
pub use send::{multicast, unicast};
#[cfg(test)]
mod proptest_config;
mod util;
