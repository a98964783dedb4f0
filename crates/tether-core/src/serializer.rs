//! Write serialization.
//!
//! The transport does not protect concurrent writers, so data writes, pings
//! and pong replies all funnel through one [`WriteSerializer`]. At most one
//! write is inside the transport at any instant.

use std::future::Future;

use tokio::sync::Mutex;

/// Mutual exclusion over outbound writes on one transport.
///
/// Uses an async mutex because the guard is held across the awaited write.
#[derive(Debug, Default)]
pub struct WriteSerializer {
    lock: Mutex<()>,
}

impl WriteSerializer {
    /// Create an unlocked serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `write` while holding the write lock.
    ///
    /// `write` should perform exactly one transport write together with its
    /// deadline. The lock is released on every exit path: normal return,
    /// error return, panic unwind, and cancellation of the returned future.
    /// Errors from `write` pass through unchanged.
    pub async fn with_write_lock<F, Fut, R>(&self, write: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let _guard = self.lock.lock().await;
        write().await
    }
}
