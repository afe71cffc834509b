// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Deferred disposal of large arenas on the rayon pool
//!
//! An instance that was last touched by parallel work can be handed off
//! here instead of being dropped inline. The owner keeps the returned
//! [`PendingRelease`] and must wait on it before relying on the memory being
//! returned.

use log::debug;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

/// Completion handle for a deferred release
#[must_use = "a deferred release must be waited on before the memory is reused"]
#[derive(Debug)]
pub struct PendingRelease {
    label: &'static str,
    receiver: Receiver<Duration>,
    completed: Option<Duration>,
}

impl PendingRelease {
    /// Block until the value has been dropped. Returns how long the drop took.
    pub fn wait(mut self) -> Duration {
        if let Some(elapsed) = self.completed {
            return elapsed;
        }
        // A disconnected sender means the task ran (and dropped) already
        let elapsed = self.receiver.recv().unwrap_or_default();
        self.completed = Some(elapsed);
        debug!("deferred release of {} finished in {:?}", self.label, elapsed);
        elapsed
    }

    /// Poll without blocking
    pub fn is_complete(&mut self) -> bool {
        if self.completed.is_some() {
            return true;
        }
        match self.receiver.try_recv() {
            Ok(elapsed) => {
                self.completed = Some(elapsed);
                true
            }
            Err(TryRecvError::Disconnected) => {
                self.completed = Some(Duration::default());
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Move `value` onto the rayon pool and drop it there
pub fn release_deferred<T>(label: &'static str, value: T) -> PendingRelease
where
    T: Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);
    rayon::spawn(move || {
        let start = Instant::now();
        drop(value);
        let _ = sender.send(start.elapsed());
    });
    PendingRelease {
        label,
        receiver,
        completed: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_wait_observes_drop() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pending = release_deferred("flag", DropFlag(dropped.clone()));
        assert_eq!(pending.label(), "flag");

        pending.wait();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_is_complete_eventually_true() {
        let mut pending = release_deferred("buffer", vec![0u8; 1 << 16]);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !pending.is_complete() {
            assert!(Instant::now() < deadline, "release never completed");
            std::thread::yield_now();
        }
        assert!(pending.is_complete());
    }
}
