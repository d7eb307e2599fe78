//! Wiring: a forward channel, a return channel, a `Sender`, and a
//! `Receiver`, driven together as one reliable byte-stream session.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use crate::channel::{Channel, ChannelConfig};
use crate::receiver::{Receiver, ReceiverConfig};
use crate::segmenter::segment;
use crate::sender::{Sender, SenderConfig, SenderStats};
use crate::sink::Sink;

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Applied to both the forward (DATA) and return (ACK) channel. The
    /// two directions of a link share the same physical degradation in
    /// this simulator; nothing in the model requires them to differ.
    pub channel: ChannelConfig,
    pub sender: SenderConfig,
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            sender: SenderConfig::default(),
            chunk_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_retransmitted: u64,
    pub acks_received: u64,
    pub duration: Duration,
    /// `false` if the deadline elapsed before every chunk was
    /// cumulatively acknowledged. This is the only failure a caller ever
    /// observes; framing and channel errors never surface past this
    /// boundary.
    pub success: bool,
}

struct CollectingSink {
    bytes: Mutex<BytesMut>,
}

impl Sink for CollectingSink {
    fn deliver(&self, packet: Bytes) {
        self.bytes.lock().extend_from_slice(&packet);
    }
}

pub struct Session {
    sender: Arc<Sender>,
    collected: Arc<CollectingSink>,
    chunk_size: usize,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let forward = Channel::new(config.channel);
        forward.spawn();
        let backward = Channel::new(config.channel);
        backward.spawn();

        let collected = Arc::new(CollectingSink {
            bytes: Mutex::new(BytesMut::new()),
        });
        let receiver = Receiver::new(ReceiverConfig::default(), backward, collected.clone());
        let sender = Sender::new(config.sender, forward, receiver.clone());
        receiver.set_ack_sink(sender.clone());

        Self {
            sender,
            collected,
            chunk_size: config.chunk_size,
        }
    }

    /// Send `data` end to end, giving up once `deadline` elapses without
    /// every chunk having been cumulatively acknowledged.
    pub async fn run(&self, data: &[u8], deadline: Duration) -> (SessionStats, Bytes) {
        let chunks = segment(data, self.chunk_size);
        let start = Instant::now();

        let completed = tokio::time::timeout(deadline, self.sender.send_all(chunks))
            .await
            .is_ok();
        let duration = start.elapsed();
        let SenderStats {
            frames_sent,
            frames_retransmitted,
            acks_received,
        } = self.sender.stats();

        let stats = SessionStats {
            frames_sent,
            frames_retransmitted,
            acks_received,
            duration,
            success: completed,
        };
        let reassembled = self.collected.bytes.lock().clone().freeze();
        (stats, reassembled)
    }
}
