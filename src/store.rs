//! Channel store: live sliding windows plus full per-channel history.
//!
//! The store is the single source of truth for ingested samples. For every channel it keeps
//!
//! - a fixed-capacity **window** of the most recent values (oldest evicted first), read by
//!   the live visualizer, and
//! - an append-only **history** of every accepted value, read by the session exporter,
//!
//! plus one **label** per accepted frame. All of it sits behind a single `RwLock`, so a frame
//! is applied to every channel, every history and the label log in one write. Readers never
//! observe a frame that is applied to some channels and not others.
//!
//! ```text
//! push([1, 2, 3], "-1")
//!      │
//!      ├─ window[0] ◀─ 1   history[0] ◀─ 1
//!      ├─ window[1] ◀─ 2   history[1] ◀─ 2
//!      ├─ window[2] ◀─ 3   history[2] ◀─ 3
//!      └─ labels    ◀─ "-1"
//! ```

use crate::error::{AppResult, DaqError};
use parking_lot::RwLock;
use ringbuf::{HeapRb, Rb};

/// Annotation recorded alongside every accepted frame.
pub type Label = String;

/// Fixed-capacity FIFO window over the most recent samples of one channel.
pub struct SlidingWindow {
    ring: HeapRb<i64>,
    capacity: usize,
    last: Option<i64>,
}

impl SlidingWindow {
    /// Create an empty window holding at most `capacity` samples.
    ///
    /// `capacity` must be at least 1; [`crate::config::Settings::validate`] enforces this
    /// for configured windows.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: HeapRb::new(capacity),
            capacity,
            last: None,
        }
    }

    /// Append a sample, evicting the oldest one when the window is full.
    ///
    /// Returns the evicted sample, if any.
    pub fn push(&mut self, value: i64) -> Option<i64> {
        self.last = Some(value);
        self.ring.push_overwrite(value)
    }

    /// Number of samples held, at most the capacity.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<i64> {
        self.last
    }

    /// Copy of the window contents, oldest first.
    pub fn to_vec(&self) -> Vec<i64> {
        self.ring.iter().copied().collect()
    }
}

impl std::fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("capacity", &self.capacity)
            .field("values", &self.to_vec())
            .finish()
    }
}

struct Inner {
    windows: Vec<SlidingWindow>,
    history: Vec<Vec<i64>>,
    labels: Vec<Label>,
}

/// Point-in-time copy of everything the exporter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// One history per channel, in channel-index order
    pub history: Vec<Vec<i64>>,
    /// One label per accepted frame
    pub labels: Vec<Label>,
}

impl StoreSnapshot {
    /// Number of accepted frames captured in the snapshot.
    pub fn sample_count(&self) -> usize {
        self.labels.len()
    }
}

/// Per-channel windows and histories for a fixed number of channels.
///
/// Shared as `Arc<ChannelStore>`: the frame parser is the only writer, the visualizer and the
/// exporter read through snapshot methods that copy under a read lock.
pub struct ChannelStore {
    num_channels: usize,
    window_size: usize,
    inner: RwLock<Inner>,
}

impl ChannelStore {
    /// Empty store with `num_channels` windows of `window_size` samples.
    pub fn new(num_channels: usize, window_size: usize) -> Self {
        let windows = (0..num_channels)
            .map(|_| SlidingWindow::new(window_size))
            .collect();
        Self {
            num_channels,
            window_size: window_size.max(1),
            inner: RwLock::new(Inner {
                windows,
                history: vec![Vec::new(); num_channels],
                labels: Vec::new(),
            }),
        }
    }

    /// Channels per frame.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Capacity of each live window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Apply one accepted frame to every channel and record its label.
    ///
    /// The frame is applied entirely or not at all: a value count that differs from the
    /// channel count is rejected before anything is touched.
    pub fn push(&self, values: &[i64], label: Label) -> AppResult<()> {
        if values.len() != self.num_channels {
            return Err(DaqError::FrameArity {
                expected: self.num_channels,
                received: values.len(),
            });
        }

        let mut inner = self.inner.write();
        let Inner {
            windows,
            history,
            labels,
        } = &mut *inner;
        for ((window, channel_history), &value) in
            windows.iter_mut().zip(history.iter_mut()).zip(values)
        {
            window.push(value);
            channel_history.push(value);
        }
        labels.push(label);
        Ok(())
    }

    /// Number of accepted frames.
    pub fn len(&self) -> usize {
        self.inner.read().labels.len()
    }

    /// Whether no frame has been accepted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of one channel's live window, oldest first.
    pub fn window(&self, channel: usize) -> Option<Vec<i64>> {
        self.inner.read().windows.get(channel).map(SlidingWindow::to_vec)
    }

    /// Copies of every live window, taken under a single read lock.
    pub fn windows(&self) -> Vec<Vec<i64>> {
        self.inner
            .read()
            .windows
            .iter()
            .map(SlidingWindow::to_vec)
            .collect()
    }

    /// Copy of one channel's full history.
    pub fn history(&self, channel: usize) -> Option<Vec<i64>> {
        self.inner.read().history.get(channel).cloned()
    }

    /// Copy of the label recorded for each accepted frame.
    pub fn labels(&self) -> Vec<Label> {
        self.inner.read().labels.clone()
    }

    /// Consistent copy of all histories and labels.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        StoreSnapshot {
            history: inner.history.clone(),
            labels: inner.labels.clone(),
        }
    }
}

impl std::fmt::Debug for ChannelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStore")
            .field("num_channels", &self.num_channels)
            .field("window_size", &self.window_size)
            .field("accepted", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut window = SlidingWindow::new(3);
        assert!(window.is_empty());
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);
        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.to_vec(), vec![2, 3, 4]);
        assert_eq!(window.latest(), Some(4));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_latest_follows_every_push() {
        let mut window = SlidingWindow::new(2);
        assert_eq!(window.latest(), None);
        for v in [5, -3, 9, 9, 0] {
            window.push(v);
            assert_eq!(window.latest(), Some(v));
        }
        assert_eq!(window.to_vec(), vec![9, 0]);
    }

    #[test]
    fn test_push_advances_all_channels_together() {
        let store = ChannelStore::new(3, 5);
        store.push(&[1, 2, 3], "-1".into()).unwrap();
        store.push(&[4, 5, 6], "7".into()).unwrap();

        assert_eq!(store.len(), 2);
        for c in 0..3 {
            assert_eq!(store.history(c).unwrap().len(), 2);
        }
        assert_eq!(store.history(1).unwrap(), vec![2, 5]);
        assert_eq!(store.labels(), vec!["-1".to_string(), "7".to_string()]);
    }

    #[test]
    fn test_wrong_arity_leaves_store_untouched() {
        let store = ChannelStore::new(3, 5);
        store.push(&[1, 2, 3], "-1".into()).unwrap();

        let err = store.push(&[9, 9], "x".into()).unwrap_err();
        assert!(matches!(
            err,
            DaqError::FrameArity {
                expected: 3,
                received: 2
            }
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.windows(), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_window_tracks_tail_of_history() {
        let store = ChannelStore::new(2, 4);
        for i in 0..10 {
            store.push(&[i, -i], i.to_string()).unwrap();
        }

        for c in 0..2 {
            let history = store.history(c).unwrap();
            let window = store.window(c).unwrap();
            assert_eq!(window.len(), 4);
            assert_eq!(window.as_slice(), &history[history.len() - 4..]);
        }
    }

    #[test]
    fn test_out_of_range_channel() {
        let store = ChannelStore::new(2, 4);
        assert!(store.window(2).is_none());
        assert!(store.history(5).is_none());
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_frame() {
        let store = Arc::new(ChannelStore::new(4, 8));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..5000 {
                    store.push(&[i, i, i, i], "-1".into()).unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let windows = store.windows();
            let first = &windows[0];
            assert!(windows.iter().all(|w| w == first));

            let snapshot = store.snapshot();
            assert!(snapshot
                .history
                .iter()
                .all(|h| h.len() == snapshot.sample_count()));
        }
        writer.join().unwrap();
        assert_eq!(store.len(), 5000);
    }
}
