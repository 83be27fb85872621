//! # Scheduler
//!
//! Deferred work on a single logical thread, expressed as plain state
//! machines driven by the caller's clock. Nothing here spawns, sleeps or
//! reads the system time; the driver passes `now` in.
//!
//! - [`Debouncer`]: restartable deadline, fires once after quiescence
//!   ("last write wins within the window").
//! - [`FrameThrottle`]: collapses any number of requests into one run per
//!   frame ("at most one evaluation in flight").

use std::time::{Duration, Instant};

// =============================================================================
// DEBOUNCER
// =============================================================================

/// A restartable one-shot deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the window at `now`. A pending deadline is replaced.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once, the first time `now` reaches the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// FRAME THROTTLE
// =============================================================================

/// Coalesces requests until the next frame.
#[derive(Debug, Clone, Default)]
pub struct FrameThrottle {
    scheduled: bool,
    dropped: u64,
}

impl FrameThrottle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a run on the next frame. Returns false if one was already
    /// queued and this request was absorbed.
    pub fn request(&mut self) -> bool {
        if self.scheduled {
            self.dropped += 1;
            false
        } else {
            self.scheduled = true;
            true
        }
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Called once per frame. True if the queued run should happen now.
    pub fn on_frame(&mut self) -> bool {
        std::mem::take(&mut self.scheduled)
    }

    /// Requests absorbed so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

// =============================================================================
// TESTS
// =============================================================================
