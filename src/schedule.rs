//! Timers driven by the caller's event loop. Nothing fires on its own: the
//! owner polls with the current `Instant`, so tests can step time exactly.

use std::time::{Duration, Instant};

/// A one-shot task. Scheduling again supersedes the pending run.
#[derive(Debug, Clone, Default)]
pub struct DelayedTask {
    due: Option<Instant>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.due = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn due(&self) -> Option<Instant> {
        self.due
    }

    /// True exactly once, on the first poll at or after the due time.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

/// A task that runs every `period`. Missed periods collapse into one run.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    period: Duration,
    next: Instant,
}

impl RepeatingTask {
    pub fn new(now: Instant, period: Duration) -> Self {
        RepeatingTask {
            period,
            next: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }
}
