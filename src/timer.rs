//! Single shared timer service for a `Sender`'s per-sequence retransmit
//! deadlines.
//!
//! Rather than spawning one `tokio::time::sleep` per outstanding frame,
//! every armed deadline lives in one min-heap and a single task waits on
//! whichever is soonest. Re-arming or cancelling a sequence number doesn't
//! touch the heap directly — it bumps a generation counter, and a popped
//! entry whose generation no longer matches is simply stale and ignored.
//! This keeps cancellation O(1) without a heap removal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Entry {
    deadline: Instant,
    seq: u32,
    generation: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<Entry>>,
    generations: HashMap<u32, u64>,
}

/// A min-heap of retransmit deadlines, one entry per outstanding sequence
/// number, shared by a single `Sender`.
pub struct TimerService {
    state: Mutex<State>,
    notify: Notify,
}

impl TimerService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        })
    }

    /// Arm (or re-arm) the timer for `seq` to fire at `deadline`. Any
    /// previously armed deadline for this `seq` is implicitly invalidated.
    pub fn arm(&self, seq: u32, deadline: Instant) {
        let mut state = self.state.lock();
        let generation = state.generations.entry(seq).or_insert(0);
        *generation += 1;
        let generation = *generation;
        state.heap.push(Reverse(Entry {
            deadline,
            seq,
            generation,
        }));
        drop(state);
        self.notify.notify_one();
    }

    /// Cancel any pending deadline for `seq`. Cheap: invalidates the
    /// generation rather than searching the heap.
    pub fn cancel(&self, seq: u32) {
        let mut state = self.state.lock();
        if let Some(generation) = state.generations.get_mut(&seq) {
            *generation += 1;
        }
    }

    /// Wait for the next sequence number whose armed deadline has both
    /// elapsed and is still current, skipping stale (cancelled/re-armed)
    /// entries along the way.
    pub async fn next_expired(&self) -> u32 {
        loop {
            let wait_target = {
                let state = self.state.lock();
                state.heap.peek().map(|Reverse(e)| e.deadline)
            };

            match wait_target {
                None => self.notify.notified().await,
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            let fired = {
                                let mut state = self.state.lock();
                                state.heap.pop()
                            };
                            if let Some(Reverse(entry)) = fired {
                                let current = {
                                    let state = self.state.lock();
                                    state.generations.get(&entry.seq).copied()
                                };
                                if current == Some(entry.generation) {
                                    return entry.seq;
                                }
                                // stale fire, loop around
                            }
                        }
                        _ = self.notify.notified() => {
                            // a sooner deadline may have just been armed
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let timers = TimerService::new();
        let now = Instant::now();
        timers.arm(2, now + Duration::from_millis(20));
        timers.arm(1, now + Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(timers.next_expired().await, 1);

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(timers.next_expired().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_a_stale_fire() {
        let timers = TimerService::new();
        let now = Instant::now();
        timers.arm(5, now + Duration::from_millis(10));
        timers.cancel(5);
        timers.arm(6, now + Duration::from_millis(15));

        tokio::time::advance(Duration::from_millis(15)).await;
        assert_eq!(timers.next_expired().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_invalidates_the_earlier_deadline() {
        let timers = TimerService::new();
        let now = Instant::now();
        timers.arm(3, now + Duration::from_millis(10));
        timers.arm(3, now + Duration::from_millis(30));

        tokio::time::advance(Duration::from_millis(30)).await;
        assert_eq!(timers.next_expired().await, 3);
    }
}
