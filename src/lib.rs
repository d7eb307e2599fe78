//! HDLC-style framing and Go-Back-N automatic repeat request over a
//! simulated unreliable channel.
//!
//! Layers, bottom to top:
//! - **bits**: packed bit buffer and HDLC bit stuffing/destuffing
//! - **crc**: CRC-32/IEEE-802.3 integrity check
//! - **frame**: header + payload + CRC codec and the flag-delimited wire
//!   envelope built on top of it
//! - **channel**: per-packet loss, corruption, and delay, FIFO-ordered
//! - **timer**: single shared retransmit-deadline service
//! - **sender** / **receiver**: the Go-Back-N state machines
//! - **segmenter**: splits an application buffer into frame-sized chunks
//! - **session**: wires the above into one end-to-end reliable transfer

pub mod bits;
pub mod channel;
pub mod crc;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod segmenter;
pub mod sender;
pub mod session;
pub mod sink;
pub mod timer;

pub use channel::{Channel, ChannelConfig};
pub use error::{Result, TransportError};
pub use frame::Frame;
pub use receiver::{Receiver, ReceiverConfig};
pub use sender::{Sender, SenderConfig, SenderStats};
pub use session::{Session, SessionConfig, SessionStats};
pub use sink::Sink;
