//! Frame codec: header framing, CRC-32 trailer, and the on-wire HDLC
//! envelope (flag delimiters + bit stuffing) built on top of it.
//!
//! Wire layout (see spec §4.3/§6):
//!
//! ```text
//! 0x7E | bit-stuffed( header(7B) | payload(L B) | crc32(4B) ) | 0x7E
//! header, big-endian: kind:u8 | seq:u32 | length:u16
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::bits::{destuff, stuff, BitBuf};
use crate::crc::crc32;
use crate::error::{Result, TransportError};

/// Literal flag byte delimiting a wire packet. Never appears inside the
/// stuffed region because bit stuffing forbids a run of six 1s, and
/// `0x7E` (`01111110`) contains one.
pub const FLAG: u8 = 0x7E;

/// Fixed header size in bytes: kind(1) + seq(4) + length(2).
const HEADER_LEN: usize = 7;
/// CRC-32 trailer size in bytes.
const CRC_LEN: usize = 4;
/// Minimum valid frame size: empty-payload header + CRC.
const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;
/// Maximum DATA payload size: the length field is 16 bits wide.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    Data = 0,
    Ack = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Ack),
            other => Err(TransportError::UnknownFrameKind(other)),
        }
    }
}

/// A frame exchanged between `Sender` and `Receiver`.
///
/// ACK frames always carry an empty payload; the length field on the wire
/// equals the payload length, so ACKs encode a length of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: u32, payload: Bytes },
    Ack { seq: u32 },
}

impl Frame {
    fn kind(&self) -> FrameKind {
        match self {
            Frame::Data { .. } => FrameKind::Data,
            Frame::Ack { .. } => FrameKind::Ack,
        }
    }

    fn seq(&self) -> u32 {
        match self {
            Frame::Data { seq, .. } => *seq,
            Frame::Ack { seq } => *seq,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Frame::Data { payload, .. } => payload,
            Frame::Ack { .. } => &[],
        }
    }

    /// Serialize header ∥ payload ∥ CRC-32(header ∥ payload).
    pub fn encode(&self) -> Result<Bytes> {
        let payload = self.payload();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        buf.put_u8(self.kind() as u8);
        buf.put_u32(self.seq());
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);

        let crc = crc32(&buf);
        buf.put_u32(crc);
        Ok(buf.freeze())
    }

    /// Parse `(kind, seq, payload)` out of a raw byte buffer.
    ///
    /// Trailing bytes beyond the length declared in the header are
    /// tolerated and ignored — they are framing pad bits introduced by
    /// byte-alignment after bit stuffing, not part of the frame.
    pub fn decode(data: &[u8]) -> Result<Frame> {
        if data.len() < MIN_FRAME_LEN {
            return Err(TransportError::FrameTooShort {
                expected: MIN_FRAME_LEN,
                actual: data.len(),
            });
        }

        let mut header = &data[..HEADER_LEN];
        let kind = FrameKind::try_from(header.get_u8())?;
        let seq = header.get_u32();
        let length = header.get_u16() as usize;

        let expected = HEADER_LEN + length + CRC_LEN;
        if data.len() < expected {
            return Err(TransportError::FrameTooShort {
                expected,
                actual: data.len(),
            });
        }
        let frame_bytes = &data[..expected];

        let body = &frame_bytes[..HEADER_LEN + length];
        let mut crc_bytes = &frame_bytes[HEADER_LEN + length..];
        let received_crc = crc_bytes.get_u32();
        if crc32(body) != received_crc {
            return Err(TransportError::CrcMismatch);
        }

        let payload = Bytes::copy_from_slice(&frame_bytes[HEADER_LEN..HEADER_LEN + length]);
        match kind {
            FrameKind::Data => Ok(Frame::Data { seq, payload }),
            FrameKind::Ack => Ok(Frame::Ack { seq }),
        }
    }

    /// Wrap this frame as a complete on-wire packet: flag, bit-stuffed
    /// header/payload/CRC, flag.
    pub fn to_wire(&self) -> Result<Bytes> {
        let raw = self.encode()?;
        let bits = BitBuf::from_bytes(&raw);
        let stuffed = stuff(&bits);
        let stuffed_bytes = stuffed.into_bytes();

        let mut out = BytesMut::with_capacity(stuffed_bytes.len() + 2);
        out.put_u8(FLAG);
        out.put_slice(&stuffed_bytes);
        out.put_u8(FLAG);
        Ok(out.freeze())
    }

    /// Parse a complete on-wire packet back into a frame.
    ///
    /// Returns `None` on any framing, destuffing, or codec failure — per
    /// spec §4.3/§7 none of these surface as errors to the caller; they
    /// are simply "no frame".
    pub fn from_wire(packet: &[u8]) -> Option<Frame> {
        if packet.len() < 2 || packet[0] != FLAG || packet[packet.len() - 1] != FLAG {
            return None;
        }
        let interior = &packet[1..packet.len() - 1];
        let stuffed_bits = BitBuf::from_bytes(interior);
        let destuffed_bits = destuff(&stuffed_bits);
        let raw = destuffed_bits.into_bytes();
        Frame::decode(&raw).ok()
    }
}
