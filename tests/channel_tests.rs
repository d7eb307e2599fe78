//! Channel-level delivery guarantees exercised through real wire packets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arqframe::channel::{Channel, ChannelConfig};
use arqframe::frame::Frame;
use arqframe::sink::Sink;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Duration;

struct RecordingSink {
    seqs: Mutex<Vec<u32>>,
}

impl Sink for RecordingSink {
    fn deliver(&self, packet: Bytes) {
        if let Some(Frame::Data { seq, .. }) = Frame::from_wire(&packet) {
            self.seqs.lock().push(seq);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn fifo_order_holds_even_with_randomized_delay() {
    let chan = Channel::new(ChannelConfig {
        max_delay: Duration::from_millis(40),
        ..ChannelConfig::default()
    });
    chan.spawn();

    let sink = Arc::new(RecordingSink { seqs: Mutex::new(Vec::new()) });
    for seq in 0..50u32 {
        let packet = Frame::Data { seq, payload: Bytes::new() }.to_wire().unwrap();
        chan.send(packet, sink.clone());
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let seqs = sink.seqs.lock().clone();
    assert_eq!(seqs.len(), 50);
    assert_eq!(seqs, (0..50u32).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn loss_probability_is_approximately_respected_over_many_packets() {
    let chan = Channel::new(ChannelConfig { p_loss: 0.5, ..ChannelConfig::default() });
    chan.spawn();

    let delivered = Arc::new(AtomicUsize::new(0));
    struct CountingSink(Arc<AtomicUsize>);
    impl Sink for CountingSink {
        fn deliver(&self, _packet: Bytes) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    let sink = Arc::new(CountingSink(delivered.clone()));

    const N: usize = 2000;
    for seq in 0..N as u32 {
        let packet = Frame::Data { seq, payload: Bytes::new() }.to_wire().unwrap();
        chan.send(packet, sink.clone());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let delivered = delivered.load(Ordering::SeqCst) as f64;
    let rate = delivered / N as f64;
    assert!((0.4..0.6).contains(&rate), "observed delivery rate {rate}");
}

#[tokio::test(start_paused = true)]
async fn corruption_flips_bits_without_ever_dropping_the_packet() {
    // p_error only ever mutates a byte; it never causes a drop. So with
    // p_loss at zero and p_error at 1, every packet still arrives, just
    // possibly mangled (and therefore rejected at the frame layer).
    let chan = Channel::new(ChannelConfig { p_error: 1.0, ..ChannelConfig::default() });
    chan.spawn();

    let arrivals = Arc::new(AtomicUsize::new(0));
    struct CountingSink(Arc<AtomicUsize>);
    impl Sink for CountingSink {
        fn deliver(&self, _packet: Bytes) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    let sink = Arc::new(CountingSink(arrivals.clone()));

    for seq in 0..20u32 {
        let packet = Frame::Data { seq, payload: Bytes::from_static(b"payload") }
            .to_wire()
            .unwrap();
        chan.send(packet, sink.clone());
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(arrivals.load(Ordering::SeqCst), 20);
}
