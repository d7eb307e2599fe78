//! Unreliable channel simulator: per-packet loss, single-bit corruption,
//! and bounded random delay, with a FIFO delivery guarantee.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

use crate::sink::Sink;

/// Minimum real-time gap enforced between two scheduled deliveries so
/// that a later `send` whose sampled delay would land it ahead of (or
/// tied with) an earlier one is pushed just behind it instead.
const FIFO_EPSILON: Duration = Duration::from_micros(10);

/// Tunables for a single `Channel` instance.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Probability a transmitted packet has one bit flipped.
    pub p_error: f64,
    /// Probability a transmitted packet is dropped entirely.
    pub p_loss: f64,
    /// Upper bound (exclusive) of the uniform delivery delay.
    pub max_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            p_error: 0.0,
            p_loss: 0.0,
            max_delay: Duration::ZERO,
        }
    }
}

struct Scheduled {
    deliver_at: Instant,
    counter: u64,
    packet: Bytes,
    sink: Arc<dyn Sink>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at == other.deliver_at && self.counter == other.counter
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deliver_at, self.counter).cmp(&(other.deliver_at, other.counter))
    }
}

/// One direction of the simulated link.
///
/// Internally a mutex-guarded binary heap keyed by `(deliver_at, counter)`
/// — a genuine priority queue, per the data model — though the FIFO clamp
/// in [`Channel::send`] means it is, in practice, always popped in
/// insertion order.
pub struct Channel {
    config: ChannelConfig,
    heap: Mutex<BinaryHeap<Reverse<Scheduled>>>,
    last_arrival: Mutex<Option<Instant>>,
    counter: AtomicU64,
    notify: Notify,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            heap: Mutex::new(BinaryHeap::new()),
            last_arrival: Mutex::new(None),
            counter: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    /// Spawn the background delivery task. Keep the returned handle (or
    /// drop it and let the task run detached) for the lifetime of the
    /// session.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Submit a packet for delivery to `sink`. Never blocks.
    pub fn send(&self, packet: Bytes, sink: Arc<dyn Sink>) {
        let mut rng = rand::rng();

        if rng.random_bool(self.config.p_loss) {
            tracing::trace!(len = packet.len(), "channel dropped packet (loss)");
            return;
        }

        let packet = if !packet.is_empty() && rng.random_bool(self.config.p_error) {
            let mut mutated = BytesMut::from(&packet[..]);
            let byte_idx = rng.random_range(0..mutated.len());
            let bit_idx = rng.random_range(0..8u8);
            mutated[byte_idx] ^= 1 << bit_idx;
            tracing::trace!(byte_idx, bit_idx, "channel corrupted one bit");
            mutated.freeze()
        } else {
            packet
        };

        let delay = if self.config.max_delay.is_zero() {
            Duration::ZERO
        } else {
            let max_nanos = self.config.max_delay.as_nanos() as u64;
            Duration::from_nanos(rng.random_range(0..max_nanos))
        };

        let mut deliver_at = Instant::now() + delay;
        let mut last = self.last_arrival.lock();
        if let Some(prev) = *last {
            if deliver_at < prev {
                deliver_at = prev + FIFO_EPSILON;
            }
        }
        *last = Some(deliver_at);
        drop(last);

        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(Reverse(Scheduled {
            deliver_at,
            counter,
            packet,
            sink,
        }));
        self.notify.notify_one();
    }

    async fn run(self: Arc<Self>) {
        loop {
            let next_deadline = { self.heap.lock().peek().map(|Reverse(s)| s.deliver_at) };
            match next_deadline {
                None => self.notify.notified().await,
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            let popped = self.heap.lock().pop();
                            if let Some(Reverse(scheduled)) = popped {
                                self.deliver(scheduled);
                            }
                        }
                        _ = self.notify.notified() => {
                            // Loop around: a new (possibly sooner) entry may
                            // have been enqueued while we were sleeping.
                        }
                    }
                }
            }
        }
    }

    fn deliver(&self, scheduled: Scheduled) {
        let Scheduled { packet, sink, .. } = scheduled;
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(packet)));
        if outcome.is_err() {
            tracing::error!("channel sink panicked delivering a packet; channel continues");
        }
    }
}
