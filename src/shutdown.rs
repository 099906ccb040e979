//! Session-wide stop signal shared by the reader and stimulus threads.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A one-shot, cloneable stop flag.
///
/// The flag itself is an atomic, so hot loops can poll [`StopSignal::is_stopped`] without
/// locking. Threads that sleep between actions use [`StopSignal::wait_timeout`], which wakes
/// as soon as [`StopSignal::stop`] is called instead of finishing the sleep.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl StopSignal {
    /// A signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Further calls are no-ops.
    pub fn stop(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.cvar.notify_all();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Sleep for up to `timeout`, returning early if the signal is raised.
    ///
    /// Returns `true` if the signal was raised before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_stopped() {
            if self.inner.cvar.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stopped()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_state() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_stopped());
        signal.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_wait_times_out_without_stop() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stop_wakes_waiter_early() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let stopped = signal.wait_timeout(Duration::from_secs(10));
                (stopped, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.stop();

        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }
}
