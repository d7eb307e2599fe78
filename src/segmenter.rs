//! Chunking of an application byte buffer into fixed-size pieces a
//! `Sender` can number and transmit one per frame.

use bytes::Bytes;

/// Split `data` into chunks of at most `chunk_size` bytes, in order.
/// The final chunk may be shorter. `chunk_size` must be nonzero.
pub fn segment(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    assert!(chunk_size > 0, "chunk_size must be nonzero");
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(chunk_size)
        .map(|c| Bytes::copy_from_slice(c))
        .collect()
}
