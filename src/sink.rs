//! The `Sink` capability: a single-operation delivery target.
//!
//! Per the re-architecture note on callback chaining, every consumer of a
//! packet (a `Receiver` consuming DATA frames, a `Sender` consuming ACK
//! frames) is addressed through this one trait instead of a captured
//! closure, so `Channel::send` doesn't need to know what's on the other
//! end.

use bytes::Bytes;

/// Something a `Channel` can hand a delivered packet to.
pub trait Sink: Send + Sync {
    /// Accept one on-wire packet. Must be non-blocking beyond its own
    /// short internal critical section — it runs synchronously on the
    /// channel's delivery task.
    fn deliver(&self, packet: Bytes);
}
