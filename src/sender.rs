//! Go-Back-N sender: slides a fixed-size window over a buffer of chunks.
//! Every outstanding frame carries its own retransmit timer, armed at its
//! own transmission time; when any of them fires for a frame still
//! outstanding, the whole window from `base` is retransmitted.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

use crate::channel::Channel;
use crate::frame::Frame;
use crate::sink::Sink;
use crate::timer::TimerService;

#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    /// Maximum number of frames outstanding (sent, unacknowledged) at once.
    pub window: u32,
    /// How long to wait for a cumulative ACK before retransmitting the
    /// whole outstanding window.
    pub timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window: 4,
            timeout: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub frames_retransmitted: u64,
    pub acks_received: u64,
}

struct Inner {
    base: u32,
    next_seq: u32,
    /// One past the highest sequence number ever transmitted; used to tell
    /// a first transmission from a retransmission.
    max_sent_seq: u32,
    buffer: Vec<Bytes>,
    stats: SenderStats,
}

/// Drives one direction of a reliable stream: segments already chunked by
/// the caller, Go-Back-N windowing, and timeout-driven retransmission.
///
/// Also serves as the [`Sink`] that receives ACK packets off the return
/// channel.
pub struct Sender {
    config: SenderConfig,
    forward: Arc<Channel>,
    receiver_sink: Arc<dyn Sink>,
    timers: Arc<TimerService>,
    inner: Mutex<Inner>,
    advanced: Notify,
}

impl Sender {
    pub fn new(config: SenderConfig, forward: Arc<Channel>, receiver_sink: Arc<dyn Sink>) -> Arc<Self> {
        Arc::new(Self {
            config,
            forward,
            receiver_sink,
            timers: TimerService::new(),
            inner: Mutex::new(Inner {
                base: 0,
                next_seq: 0,
                max_sent_seq: 0,
                buffer: Vec::new(),
                stats: SenderStats::default(),
            }),
            advanced: Notify::new(),
        })
    }

    /// Send every chunk in `chunks`, in order, returning once all have been
    /// cumulatively acknowledged.
    pub async fn send_all(self: &Arc<Self>, chunks: Vec<Bytes>) -> SenderStats {
        let total = chunks.len() as u32;
        {
            let mut inner = self.inner.lock();
            inner.buffer = chunks;
        }

        loop {
            self.refill_window(total);

            if self.inner.lock().base >= total {
                break;
            }

            tokio::select! {
                seq = self.timers.next_expired() => {
                    self.handle_timeout(seq);
                }
                _ = self.advanced.notified() => {}
            }
        }

        self.inner.lock().stats
    }

    fn refill_window(&self, total: u32) {
        loop {
            let seq = {
                let inner = self.inner.lock();
                if inner.next_seq < total && inner.next_seq < inner.base + self.config.window {
                    Some(inner.next_seq)
                } else {
                    None
                }
            };
            let Some(seq) = seq else { break };
            self.transmit(seq);
            self.inner.lock().next_seq += 1;
        }
    }

    /// Transmit (or retransmit) `seq` and arm its own retransmit timer at
    /// this moment, independent of every other outstanding frame's
    /// deadline.
    fn transmit(&self, seq: u32) {
        let payload = {
            let mut inner = self.inner.lock();
            let is_retransmit = seq < inner.max_sent_seq;
            if !is_retransmit {
                inner.max_sent_seq = seq + 1;
            }
            inner.stats.frames_sent += 1;
            if is_retransmit {
                inner.stats.frames_retransmitted += 1;
                tracing::debug!(seq, "retransmitting frame");
            } else {
                tracing::trace!(seq, "transmitting frame");
            }
            inner.buffer[seq as usize].clone()
        };

        let frame = Frame::Data { seq, payload };
        match frame.to_wire() {
            Ok(packet) => {
                self.forward.send(packet, self.receiver_sink.clone());
                self.timers.arm(seq, Instant::now() + self.config.timeout);
            }
            Err(err) => tracing::error!(seq, %err, "failed to encode outgoing frame"),
        }
    }

    /// A specific frame's timer fired. If it's still outstanding (not yet
    /// acknowledged), retransmit the whole window from `base` on the next
    /// refill pass; a timer that fires for an already-acked frame is a
    /// no-op.
    fn handle_timeout(&self, seq: u32) {
        let mut inner = self.inner.lock();
        if seq >= inner.base {
            tracing::debug!(seq, base = inner.base, next_seq = inner.next_seq, "retransmit timeout");
            inner.next_seq = inner.base;
        }
    }

    /// A snapshot of the counters so far. Safe to call concurrently with
    /// [`Sender::send_all`], including after it has been cancelled by a
    /// timeout, since the stats live behind the same lock as the window
    /// state rather than inside the `send_all` future.
    pub fn stats(&self) -> SenderStats {
        self.inner.lock().stats
    }

    /// Cumulative ACK: `ack_seq` is the sequence number of the
    /// just-accepted frame on the receiver side, so every seq in
    /// `[base, ack_seq]` is now acknowledged. ACKs with `ack_seq < base`
    /// are stale and ignored; `base` never decreases.
    fn on_ack(&self, ack_seq: u32) {
        let advanced = {
            let mut inner = self.inner.lock();
            inner.stats.acks_received += 1;
            if ack_seq >= inner.base {
                let old_base = inner.base;
                inner.base = ack_seq + 1;
                for acked in old_base..=ack_seq {
                    self.timers.cancel(acked);
                }
                true
            } else {
                false
            }
        };
        if advanced {
            self.advanced.notify_one();
        }
    }
}

impl Sink for Sender {
    fn deliver(&self, packet: Bytes) {
        if let Some(Frame::Ack { seq }) = Frame::from_wire(&packet) {
            self.on_ack(seq);
        }
    }
}
