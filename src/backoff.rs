//! Retry with exponential backoff.
//!
//! The delay starts at 1 ms and doubles after every failed attempt, capped at
//! 30 s. Time is read and slept through a [`Clock`] so the loop itself has no
//! I/O and can be driven by a fake clock in tests.

use std::time::{Duration, Instant};

use tracing::trace;

pub const INITIAL_DELAY: Duration = Duration::from_millis(1);
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Source of time and sleeping for retry loops.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// State of one in-flight retry loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    current_delay: Duration,
    max_delay: Duration,
    deadline: Option<Instant>,
}

impl Backoff {
    pub fn unbounded() -> Self {
        Self {
            current_delay: INITIAL_DELAY,
            max_delay: MAX_DELAY,
            deadline: None,
        }
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::unbounded()
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// How long to sleep before the next attempt, or `None` once the deadline
    /// has passed. Sleeps are clipped so they never overshoot the deadline.
    pub fn next_sleep(&self, now: Instant) -> Option<Duration> {
        match self.deadline {
            None => Some(self.current_delay),
            Some(deadline) => {
                let time_left = deadline.saturating_duration_since(now);
                if time_left.is_zero() {
                    None
                } else {
                    Some(time_left.min(self.current_delay))
                }
            }
        }
    }

    /// Double the delay after a failed attempt.
    pub fn record_failure(&mut self) {
        self.current_delay = (self.current_delay * 2).min(self.max_delay);
    }
}

/// Retry `attempt` until it succeeds or `max_duration` has elapsed.
///
/// Returns `false` without a further attempt once no time is left.
pub fn retry_with_backoff_for<C, F>(clock: &C, max_duration: Duration, mut attempt: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let mut backoff = Backoff::until(clock.now() + max_duration);

    while let Some(sleep_time) = backoff.next_sleep(clock.now()) {
        trace!(?sleep_time, "Backing off before retry");
        clock.sleep(sleep_time);
        if attempt() {
            return true;
        }
        backoff.record_failure();
    }
    false
}

/// Retry `attempt` until it succeeds, sleeping before every attempt.
pub fn retry_with_backoff<C, F>(clock: &C, mut attempt: F)
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let mut backoff = Backoff::unbounded();
    loop {
        let sleep_time = backoff.current_delay();
        trace!(?sleep_time, "Backing off before retry");
        clock.sleep(sleep_time);
        if attempt() {
            return;
        }
        backoff.record_failure();
    }
}
