//! Single-shot deadline guarding the 2D pass.
//!
//! Once the 3D pass has reported, the tracker arms the guard so a lost 2D
//! result cannot stall the line. Every arm gets a fresh token; the fire
//! callback receives it and must confirm it is still current (see
//! [`TimeoutGuard::take_if_current`]) before acting.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use inspect_types::ChannelId;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

struct ArmedTimer {
    token: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// One armed-or-disarmed deadline.
pub struct TimeoutGuard {
    /// Channel that is force-completed on fire.
    guarded: ChannelId,

    armed: Mutex<Option<ArmedTimer>>,

    next_token: AtomicU64,
}

impl TimeoutGuard {
    pub fn new(guarded: ChannelId) -> Self {
        Self {
            guarded,
            armed: Mutex::new(None),
            next_token: AtomicU64::new(1),
        }
    }

    /// Start the deadline, replacing any timer already armed.
    ///
    /// Must be called from within a tokio runtime. Returns the arm token
    /// handed to `on_fire`.
    pub fn arm<F, Fut>(&self, duration: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + duration;

        let mut armed = self.lock();
        if let Some(previous) = armed.take() {
            previous.handle.abort();
            trace!(token = previous.token, "Replaced armed timeout");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire(token).await;
        });

        debug!(
            channel = %self.guarded,
            token = token,
            grace_ms = duration.as_millis() as u64,
            "Timeout armed"
        );

        *armed = Some(ArmedTimer {
            token,
            deadline,
            handle,
        });
        token
    }

    /// Cancel the armed timer, if any. Returns whether one was cancelled.
    pub fn disarm(&self) -> bool {
        match self.lock().take() {
            Some(timer) => {
                timer.handle.abort();
                debug!(channel = %self.guarded, token = timer.token, "Timeout disarmed");
                true
            }
            None => false,
        }
    }

    /// Claim the fire for `token`.
    ///
    /// Succeeds only if `token` is the currently armed timer; the guard is
    /// then disarmed without aborting the calling task.
    pub fn take_if_current(&self, token: u64) -> bool {
        let mut armed = self.lock();
        match armed.as_ref() {
            Some(timer) if timer.token == token => {
                *armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.lock().as_ref().map(|t| t.deadline)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ArmedTimer>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().take() {
            timer.handle.abort();
        }
    }
}
