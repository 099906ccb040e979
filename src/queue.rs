//! Handoff queue between the link reader and the frame parser.
//!
//! The queue decouples serial I/O latency from parsing latency. It is a plain FIFO behind a
//! `parking_lot` mutex with a condition variable, so the consumer blocks efficiently on an
//! empty queue instead of spinning.
//!
//! There is no capacity bound and no backpressure. The parser is expected to keep pace with
//! the link; if it does not, memory grows with the backlog. [`HandoffQueue::len`] exposes the
//! backlog so callers can watch for that.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One raw line read from the link, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Arrival order, starting at 0 for the first queued frame
    pub seq: u64,
    /// Raw line bytes, including any trailing line terminator
    pub data: Bytes,
}

impl Frame {
    /// Frame number `seq` carrying the raw line `data`.
    pub fn new(seq: u64, data: impl Into<Bytes>) -> Self {
        Self {
            seq,
            data: data.into(),
        }
    }
}

/// Result of a timed pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// The oldest queued frame
    Frame(Frame),
    /// Nothing arrived within the timeout
    Empty,
    /// The queue was closed and every frame has been drained
    Closed,
}

#[derive(Default)]
struct State {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Thread-safe FIFO carrying frames from exactly one producer to exactly one consumer.
#[derive(Default)]
pub struct HandoffQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl HandoffQueue {
    /// Empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame at the back of the queue.
    ///
    /// Frames pushed after [`close`](Self::close) are still delivered; closing only changes
    /// what the consumer sees once the queue runs dry.
    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock();
        state.frames.push_back(frame);
        drop(state);
        self.available.notify_one();
    }

    /// Remove the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<Frame> {
        self.state.lock().frames.pop_front()
    }

    /// Remove the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Pop::Frame(frame);
            }
            if state.closed {
                return Pop::Closed;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return match state.frames.pop_front() {
                    Some(frame) => Pop::Frame(frame),
                    None if state.closed => Pop::Closed,
                    None => Pop::Empty,
                };
            }
        }
    }

    /// Mark the producer side as finished and wake a waiting consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of frames waiting to be parsed.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Whether no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = HandoffQueue::new();
        for (seq, line) in ["a", "b", "c"].iter().enumerate() {
            queue.push(Frame::new(seq as u64, line.as_bytes().to_vec()));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop().unwrap().data, Bytes::from_static(b"a"));
        assert_eq!(queue.try_pop().unwrap().data, Bytes::from_static(b"b"));
        assert_eq!(queue.try_pop().unwrap().data, Bytes::from_static(b"c"));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = HandoffQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Pop::Empty);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_close_drains_before_reporting_closed() {
        let queue = HandoffQueue::new();
        queue.push(Frame::new(0, b"1,2,3".to_vec()));
        queue.close();

        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(1)),
            Pop::Frame(f) if f.seq == 0
        ));
        assert_eq!(queue.pop_timeout(Duration::from_millis(1)), Pop::Closed);
    }

    #[test]
    fn test_blocked_consumer_wakes_on_push() {
        let queue = Arc::new(HandoffQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(Frame::new(7, b"x".to_vec()));

        assert!(matches!(consumer.join().unwrap(), Pop::Frame(f) if f.seq == 7));
    }

    #[test]
    fn test_order_preserved_across_threads() {
        let queue = Arc::new(HandoffQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..1000u64 {
                    queue.push(Frame::new(seq, seq.to_string().into_bytes()));
                    if seq % 97 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                queue.close();
            })
        };

        let mut received = Vec::new();
        loop {
            match queue.pop_timeout(Duration::from_millis(50)) {
                Pop::Frame(frame) => received.push(frame.seq),
                Pop::Empty => continue,
                Pop::Closed => break,
            }
        }
        producer.join().unwrap();

        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
