//! Hands shared payloads to a transport sink, one peer or many.
use crate::{
    message::{ConnectionId, MessageSink, OutgoingMessage},
    payload::SharedPayload,
};

/// Sends `payload` to a single connection.
///
/// Builds one message holding one payload reference and hands it to the sink
/// in a single call; `out_result` receives the message number or a negative
/// result code.
#[allow(clippy::too_many_arguments)]
pub fn unicast<S>(
    sink: &mut S,
    connection: ConnectionId,
    payload: &SharedPayload,
    logical_bytes: u32,
    flags: i32,
    lane: u16,
    user_data: i64,
    out_result: &mut i64,
) where
    S: MessageSink + ?Sized,
{
    let mut message = OutgoingMessage::new(connection, flags, lane, user_data);
    payload.add_to_message(&mut message, logical_bytes);
    sink.send_messages(vec![message], core::slice::from_mut(out_result));
}

/// Sends one `payload` to every connection, sharing the allocation.
///
/// Each of the N messages holds its own reference to the same payload, so the
/// bytes are packed once, handed to the sink in one call, and freed exactly
/// once when the transport releases the last message. `out_results` should
/// have one slot per connection; extra connections beyond its length still
/// send, their results are just not recorded.
#[allow(clippy::too_many_arguments)]
pub fn multicast<S, I>(
    sink: &mut S,
    connections: I,
    payload: &SharedPayload,
    logical_bytes: u32,
    flags: i32,
    lane: u16,
    user_data: i64,
    out_results: &mut [i64],
) where
    S: MessageSink + ?Sized,
    I: IntoIterator<Item = ConnectionId>,
{
    let messages: Vec<OutgoingMessage> = connections
        .into_iter()
        .map(|connection| {
            let mut message = OutgoingMessage::new(connection, flags, lane, user_data);
            payload.add_to_message(&mut message, logical_bytes);
            message
        })
        .collect();
    sink.send_messages(messages, out_results);
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{payload::alloc_stats, BitReader, BitWriter},
        serial_test::serial,
    };

    /// Sink that keeps every message and assigns increasing message numbers.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<OutgoingMessage>,
        next_number: i64,
    }

    impl MessageSink for RecordingSink {
        fn send_messages(&mut self, messages: Vec<OutgoingMessage>, out_results: &mut [i64]) {
            for (index, message) in messages.into_iter().enumerate() {
                if let Some(slot) = out_results.get_mut(index) {
                    *slot = self.next_number;
                }
                self.next_number += 1;
                self.sent.push(message);
            }
        }
    }

    fn bit_stream_payload(bytes: &[u8]) -> (SharedPayload, u32) {
        let mut payload = SharedPayload::allocate(bytes.len() as u32).unwrap();
        let mut writer = BitWriter::from_payload(&mut payload, bytes.len());
        writer.write_bytes(bytes).flush_final();
        assert!(!writer.fail());
        let used = writer.used_bytes() as u32;
        (payload, used)
    }

    #[test]
    #[serial]
    fn unicast_builds_one_addressed_message() {
        let (payload, used) = bit_stream_payload(&[0xAB; 12]);

        let mut sink = RecordingSink::default();
        let mut result = -1i64;
        unicast(&mut sink, 42, &payload, used, 3, 2, 777, &mut result);
        drop(payload);

        assert_eq!(result, 0);
        assert_eq!(sink.sent.len(), 1);
        let message = &sink.sent[0];
        assert_eq!(message.connection, 42);
        assert_eq!(message.flags, 3);
        assert_eq!(message.lane, 2);
        assert_eq!(message.user_data, 777);
        assert_eq!(message.payload_bytes(), &[0xAB; 12]);
    }

    #[test]
    #[serial]
    fn multicast_shares_one_allocation_across_peers() {
        let (allocs_before, frees_before) = alloc_stats::snapshot();

        let (payload, used) = bit_stream_payload(&[1, 2, 3, 4]);
        assert_eq!(payload.ref_count(), 0);

        let mut sink = RecordingSink::default();
        let mut results = [0i64; 4];
        multicast(
            &mut sink,
            [10u32, 11, 12, 13],
            &payload,
            used,
            0,
            0,
            0,
            &mut results,
        );
        assert_eq!(payload.ref_count(), 4);
        drop(payload);

        assert_eq!(results, [0, 1, 2, 3]);
        assert_eq!(sink.sent.len(), 4);
        let data = payload_ptrs(&sink);
        assert!(data.windows(2).all(|pair| pair[0] == pair[1]));
        for (message, connection) in sink.sent.iter().zip([10u32, 11, 12, 13]) {
            assert_eq!(message.connection, connection);
            assert_eq!(message.payload_bytes(), &[1, 2, 3, 4]);
        }

        drop(sink);
        let (allocs, frees) = alloc_stats::snapshot();
        assert_eq!(allocs - allocs_before, 1);
        assert_eq!(frees - frees_before, 1);
    }

    fn payload_ptrs(sink: &RecordingSink) -> Vec<*const u8> {
        sink.sent
            .iter()
            .map(|message| message.payload_bytes().as_ptr())
            .collect()
    }

    #[test]
    #[serial]
    fn bit_stream_payload_sends_word_ceiled_length() {
        let (payload, used) = bit_stream_payload(&[7; 5]);
        assert_eq!(used, 5);

        let mut sink = RecordingSink::default();
        let mut result = 0i64;
        unicast(&mut sink, 1, &payload, used, 0, 0, 0, &mut result);
        drop(payload);

        // 5 logical bytes round up to 8 on the wire so the receiving reader
        // can fetch the trailing word.
        assert_eq!(sink.sent[0].size(), 8);
    }

    #[test]
    #[serial]
    fn packed_payload_reads_back_from_the_delivered_bytes() {
        let mut payload = SharedPayload::allocate(16).unwrap();
        let mut writer = BitWriter::from_payload(&mut payload, 16);
        writer
            .write(200u8, 0, u8::MAX)
            .write_bool(true)
            .write(1000u16, 0, 1023)
            .flush_final();
        assert!(!writer.fail());
        let used = writer.used_bytes() as u32;

        let mut sink = RecordingSink::default();
        let mut result = 0i64;
        unicast(&mut sink, 9, &payload, used, 0, 0, 0, &mut result);
        drop(payload);

        // The delivered length is word-ceiled, so the reader can bind to the
        // exact bytes the peer would receive.
        let message = &sink.sent[0];
        assert_eq!(message.size(), 4);
        let mut reader = BitReader::from_bytes(message.payload_bytes(), message.size() as usize);
        assert_eq!(reader.read(0u8, u8::MAX), 200);
        assert!(reader.read_bool());
        assert_eq!(reader.read(0u16, 1023), 1000);
        assert!(!reader.fail());
    }

    #[test]
    #[serial]
    fn multicast_to_nobody_still_balances() {
        let (allocs_before, frees_before) = alloc_stats::snapshot();

        let (payload, used) = bit_stream_payload(&[1]);
        let mut sink = RecordingSink::default();
        multicast(&mut sink, [0u32; 0], &payload, used, 0, 0, 0, &mut [0i64; 0]);
        assert_eq!(sink.sent.len(), 0);
        payload.force_deallocate();

        let (allocs, frees) = alloc_stats::snapshot();
        assert_eq!(allocs - allocs_before, 1);
        assert_eq!(frees - frees_before, 1);
    }
}
