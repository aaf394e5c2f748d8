use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::time::deadline_after;
use crate::time::until;

/// Binary open/closed throttling scope with a reset deadline
///
/// Buckets carry no token count: the server tells us how many requests remain and
/// when the window resets, and the bucket only closes once that budget is spent or
/// a 429 arrives. Every waiter sleeps until the same shared deadline, so closing a
/// bucket releases all queued callers at once when it reopens.
#[derive(Debug)]
pub struct Bucket {
    name: String,
    state: Mutex<BucketState>,
    reopened: Notify,
}

#[derive(Debug, Default)]
struct BucketState {
    /// Set while closed, cleared lazily once passed
    closed_until: Option<Instant>,

    /// Last `X-RateLimit-Remaining` seen
    remaining: Option<u32>,

    /// Last `X-RateLimit-Reset-After` seen
    reset_after: Option<Duration>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Mutex::new(BucketState::default()), reopened: Notify::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until the bucket is open
    ///
    /// Suspends only the calling task. No reservation is made: any number of callers
    /// may pass an open bucket, matching the server's open/closed model.
    pub async fn acquire(&self) {
        loop {
            let reopened = self.reopened.notified();
            tokio::pin!(reopened);
            // Register before reading state so an `open()` in between is not missed
            reopened.as_mut().enable();

            let Some(deadline) = self.closed_deadline() else {
                return;
            };

            debug!(bucket = %self.name, wait_ms = until(deadline).as_millis() as u64, "Waiting for bucket to reopen");

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = reopened => {}
            }
        }
    }

    /// Pass only if the bucket is open right now
    pub fn try_acquire(&self) -> Result<()> {
        match self.closed_deadline() {
            None => Ok(()),
            Some(deadline) => Err(RateLimitError::Closed { bucket: self.name.clone(), reset_after: until(deadline) }),
        }
    }

    /// Close the bucket for at least `reset_after` from now
    ///
    /// A shorter window never shortens a closure already in progress. Returns the
    /// effective reopening deadline.
    pub fn close_for(&self, reset_after: Duration) -> Instant {
        let requested = deadline_after(reset_after);
        let mut state = self.state.lock();

        let deadline = match state.closed_until {
            Some(current) if current > requested => current,
            _ => requested,
        };
        state.closed_until = Some(deadline);
        state.reset_after = Some(reset_after);

        deadline
    }

    /// Record the budget reported by a successful response
    ///
    /// When the budget is spent the bucket is closed for this response's own reset
    /// window so the next caller waits instead of tripping a 429.
    pub fn record(&self, remaining: Option<u32>, reset_after: Option<Duration>) {
        {
            let mut state = self.state.lock();
            if remaining.is_some() {
                state.remaining = remaining;
            }
            if reset_after.is_some() {
                state.reset_after = reset_after;
            }
        }

        if remaining == Some(0) {
            match reset_after {
                Some(window) => {
                    warn!(bucket = %self.name, reset_after_secs = window.as_secs_f64(), "Bucket exhausted, pausing new requests");
                    self.close_for(window);
                }
                None => debug!(bucket = %self.name, "Bucket exhausted without a reset window"),
            }
        }
    }

    /// Reopen immediately and wake every waiter
    pub fn open(&self) {
        self.state.lock().closed_until = None;
        self.reopened.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed_deadline().is_some()
    }

    /// Time until the bucket reopens, `None` when open
    pub fn reopens_in(&self) -> Option<Duration> {
        self.closed_deadline().map(until)
    }

    /// Reopening deadline while closed
    pub fn deadline(&self) -> Option<Instant> {
        self.closed_deadline()
    }

    pub fn remaining(&self) -> Option<u32> {
        self.state.lock().remaining
    }

    /// Last reset window reported for this bucket
    pub fn reset_after(&self) -> Option<Duration> {
        self.state.lock().reset_after
    }

    fn closed_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        match state.closed_until {
            Some(deadline) if deadline > Instant::now() => Some(deadline),
            Some(_) => {
                state.closed_until = None;
                debug!(bucket = %self.name, "Bucket reopened");
                None
            }
            None => None,
        }
    }
}
