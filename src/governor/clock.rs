//! Time source for the governor.
//!
//! Pacing and backoff both go through a [`Clock`] so tests can run against
//! virtual time and assert exact wait totals.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time used for interval arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock time used only for reporting
    fn wall(&self) -> DateTime<Utc>;

    /// Suspends the calling task
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns immediately and moves time forward.
///
/// Every sleep is recorded so callers can check how long the governor
/// would have waited.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Moves time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = self.lock().offset;
        self.wall_origin + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(5)).await;
        clock.advance(Duration::from_secs(1));

        assert_eq!(clock.now() - start, Duration::from_secs(6));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
        assert_eq!(clock.total_slept(), Duration::from_secs(5));
    }

    #[test]
    fn test_manual_clock_wall_tracks_offset() {
        let clock = ManualClock::new();
        let before = clock.wall();
        clock.advance(Duration::from_secs(3600));
        assert_eq!((clock.wall() - before).num_seconds(), 3600);
    }
}
