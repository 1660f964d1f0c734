//! Cancellation and deadlines for blocking API calls.
//!
//! A [`CancelToken`] is handed to every outbound call. The HTTP client checks
//! it before each request and clamps its request timeout to the token's
//! remaining time; pollers sleep through [`CancelToken::sleep`] so that a
//! `cancel()` from another thread wakes them immediately.

use crate::error::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Flag {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cancellation signal plus an optional deadline.
///
/// Clones share the cancel flag. Tokens derived with
/// [`with_timeout`](Self::with_timeout) share the flag but carry their own,
/// never later, deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<Flag>,
    started: Option<Instant>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is never cancelled unless [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    #[must_use]
    pub fn with_deadline_in(timeout: Duration) -> Self {
        Self::new().with_timeout(timeout)
    }

    /// Derive a token sharing this token's flag, expiring at the earlier of
    /// the parent's deadline and `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let now = Instant::now();
        let candidate = now.checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };
        Self {
            flag: Arc::clone(&self.flag),
            started: Some(now),
            deadline,
        }
    }

    /// Signal cancellation to this token and every clone of it.
    pub fn cancel(&self) {
        let mut cancelled = self
            .flag
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.flag.wake.notify_all();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self
            .flag
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before the deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the token is cancelled or its deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(remaining) = self.remaining()
            && remaining.is_zero()
        {
            return Err(Error::DeadlineExceeded(self.elapsed()));
        }
        Ok(())
    }

    /// Sleep for `duration`, returning early with an error on cancellation.
    ///
    /// The sleep is cut short at the deadline; in that case the deadline error
    /// is returned.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        let wake_at = Instant::now() + duration;
        let mut cancelled = self
            .flag
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return Err(Error::Cancelled);
            }
            let now = Instant::now();
            if let Some(deadline) = self.deadline
                && deadline <= now
            {
                return Err(Error::DeadlineExceeded(self.elapsed()));
            }
            if wake_at <= now {
                return Ok(());
            }
            let mut until = wake_at;
            if let Some(deadline) = self.deadline {
                until = until.min(deadline);
            }
            let (guard, _) = self
                .flag
                .wake
                .wait_timeout(cancelled, until - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        assert!(token.remaining().is_none());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(matches!(clone.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_deadline_expires() {
        let token = CancelToken::with_deadline_in(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(10));
        assert!(matches!(token.check(), Err(Error::DeadlineExceeded(_))));
    }

    #[test]
    fn test_child_deadline_never_outlives_parent() {
        let parent = CancelToken::with_deadline_in(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(60));
        let remaining = child.remaining().unwrap();
        assert!(remaining <= Duration::from_millis(50));
    }

    #[test]
    fn test_sleep_completes() {
        let token = CancelToken::new();
        let start = Instant::now();
        token.sleep(Duration::from_millis(10)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        let result = token.sleep(Duration::from_secs(30));
        handle.join().unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_stops_at_deadline() {
        let token = CancelToken::with_deadline_in(Duration::from_millis(20));
        let start = Instant::now();
        let result = token.sleep(Duration::from_secs(30));
        assert!(matches!(result, Err(Error::DeadlineExceeded(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
