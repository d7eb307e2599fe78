//! Go-Back-N receiver: accepts frames strictly in order and discards
//! anything else. An in-order accept or a duplicate re-acks with the
//! frame's own sequence number; an out-of-order frame re-acks with
//! `expected_seq - 1` (or sends nothing at all if nothing has been
//! accepted yet).

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::channel::Channel;
use crate::frame::Frame;
use crate::sink::Sink;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverConfig {}

struct Inner {
    expected_seq: u32,
    ack_sink: Option<Arc<dyn Sink>>,
}

/// The receiving end of one direction of a reliable stream.
///
/// Implements [`Sink`] to accept incoming DATA packets directly off a
/// `Channel`; delivers reassembled payloads, in order, to `data_sink`; and
/// sends ACK packets back over `backward` to whatever sink is registered
/// with [`Receiver::set_ack_sink`].
pub struct Receiver {
    #[allow(dead_code)]
    config: ReceiverConfig,
    backward: Arc<Channel>,
    data_sink: Arc<dyn Sink>,
    inner: Mutex<Inner>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig, backward: Arc<Channel>, data_sink: Arc<dyn Sink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            backward,
            data_sink,
            inner: Mutex::new(Inner {
                expected_seq: 0,
                ack_sink: None,
            }),
        })
    }

    /// Register where ACK packets should be delivered. Must be called
    /// before any DATA packets arrive if ACKs are to reach their sender.
    pub fn set_ack_sink(&self, sink: Arc<dyn Sink>) {
        self.inner.lock().ack_sink = Some(sink);
    }

    fn handle_data(&self, seq: u32, payload: Bytes) {
        let (should_deliver, ack_seq, ack_sink) = {
            let mut inner = self.inner.lock();
            if seq == inner.expected_seq {
                inner.expected_seq += 1;
                (true, Some(seq), inner.ack_sink.clone())
            } else if seq < inner.expected_seq {
                tracing::trace!(seq, expected = inner.expected_seq, "discarding duplicate frame");
                (false, Some(seq), inner.ack_sink.clone())
            } else {
                tracing::debug!(seq, expected = inner.expected_seq, "discarding out-of-order frame");
                (false, inner.expected_seq.checked_sub(1), inner.ack_sink.clone())
            }
        };

        if should_deliver {
            self.data_sink.deliver(payload);
        }
        if let Some(ack_seq) = ack_seq {
            self.send_ack(ack_seq, ack_sink);
        }
    }

    fn send_ack(&self, seq: u32, ack_sink: Option<Arc<dyn Sink>>) {
        let Some(ack_sink) = ack_sink else {
            tracing::error!("no ack sink registered; dropping ack");
            return;
        };
        match (Frame::Ack { seq }).to_wire() {
            Ok(packet) => self.backward.send(packet, ack_sink),
            Err(err) => tracing::error!(seq, %err, "failed to encode ack"),
        }
    }
}

impl Sink for Receiver {
    fn deliver(&self, packet: Bytes) {
        match Frame::from_wire(&packet) {
            Some(Frame::Data { seq, payload }) => self.handle_data(seq, payload),
            Some(Frame::Ack { .. }) => {
                tracing::trace!("receiver ignoring stray ack on the forward channel");
            }
            None => {
                tracing::trace!("receiver discarding unparseable packet");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use parking_lot::Mutex as PlMutex;

    struct RecordingSink(PlMutex<Vec<u8>>);
    impl Sink for RecordingSink {
        fn deliver(&self, packet: Bytes) {
            self.0.lock().push(packet[0]);
        }
    }

    struct CapturingAckSink(PlMutex<Vec<u32>>);
    impl Sink for CapturingAckSink {
        fn deliver(&self, packet: Bytes) {
            if let Some(Frame::Ack { seq }) = Frame::from_wire(&packet) {
                self.0.lock().push(seq);
            }
        }
    }

    fn data_packet(seq: u32, byte: u8) -> Bytes {
        Frame::Data {
            seq,
            payload: Bytes::from(vec![byte]),
        }
        .to_wire()
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn in_order_frames_are_delivered_and_acked() {
        let backward = Channel::new(ChannelConfig::default());
        backward.spawn();
        let data = Arc::new(RecordingSink(PlMutex::new(Vec::new())));
        let receiver = Receiver::new(ReceiverConfig::default(), backward, data.clone());
        let acks = Arc::new(CapturingAckSink(PlMutex::new(Vec::new())));
        receiver.set_ack_sink(acks.clone());

        receiver.deliver(data_packet(0, b'a'));
        receiver.deliver(data_packet(1, b'b'));

        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        assert_eq!(data.0.lock().clone(), vec![b'a', b'b']);
        assert_eq!(acks.0.lock().clone(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_frame_before_anything_is_accepted_emits_no_ack() {
        let backward = Channel::new(ChannelConfig::default());
        backward.spawn();
        let data = Arc::new(RecordingSink(PlMutex::new(Vec::new())));
        let receiver = Receiver::new(ReceiverConfig::default(), backward, data.clone());
        let acks = Arc::new(CapturingAckSink(PlMutex::new(Vec::new())));
        receiver.set_ack_sink(acks.clone());

        receiver.deliver(data_packet(2, b'c'));

        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        assert!(data.0.lock().is_empty());
        assert!(acks.0.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_frame_after_progress_reacks_with_expected_minus_one() {
        let backward = Channel::new(ChannelConfig::default());
        backward.spawn();
        let data = Arc::new(RecordingSink(PlMutex::new(Vec::new())));
        let receiver = Receiver::new(ReceiverConfig::default(), backward, data.clone());
        let acks = Arc::new(CapturingAckSink(PlMutex::new(Vec::new())));
        receiver.set_ack_sink(acks.clone());

        receiver.deliver(data_packet(0, b'a'));
        receiver.deliver(data_packet(3, b'd'));

        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        assert_eq!(data.0.lock().clone(), vec![b'a']);
        assert_eq!(acks.0.lock().clone(), vec![0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_frame_is_discarded_and_reacked() {
        let backward = Channel::new(ChannelConfig::default());
        backward.spawn();
        let data = Arc::new(RecordingSink(PlMutex::new(Vec::new())));
        let receiver = Receiver::new(ReceiverConfig::default(), backward, data.clone());
        let acks = Arc::new(CapturingAckSink(PlMutex::new(Vec::new())));
        receiver.set_ack_sink(acks.clone());

        receiver.deliver(data_packet(0, b'a'));
        receiver.deliver(data_packet(0, b'a'));

        // §8 S6: injecting DATA(seq=0) twice must emit exactly two ACK(0).
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        assert_eq!(data.0.lock().clone(), vec![b'a']);
        assert_eq!(acks.0.lock().clone(), vec![0, 0]);
    }
}
