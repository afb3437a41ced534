use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::clock::Clock;

/// Length of the call-counting window
pub const BUDGET_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Process-wide pacing state
#[derive(Debug, Clone)]
pub struct CallBudget {
    last_call_at: Option<Instant>,
    last_call_wall: Option<DateTime<Utc>>,
    call_count: u32,
    window_started_at: Instant,
    window_started_wall: DateTime<Utc>,
}

impl CallBudget {
    fn new(now: Instant, wall: DateTime<Utc>) -> Self {
        Self {
            last_call_at: None,
            last_call_wall: None,
            call_count: 0,
            window_started_at: now,
            window_started_wall: wall,
        }
    }

    /// Starts a fresh window once the current one is 24h old
    fn roll_window(&mut self, now: Instant, wall: DateTime<Utc>) {
        if now.saturating_duration_since(self.window_started_at) >= BUDGET_WINDOW {
            tracing::info!(
                previous_count = self.call_count,
                "Call budget window rolled over"
            );
            self.call_count = 0;
            self.window_started_at = now;
            self.window_started_wall = wall;
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count
    }

    pub fn last_call_at(&self) -> Option<Instant> {
        self.last_call_at
    }
}

/// Reported by `GET /governor/status`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetSnapshot {
    pub calls_in_window: u32,
    pub daily_limit: Option<u32>,
    pub last_call_at: Option<DateTime<Utc>>,
    pub window_started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("daily call limit of {limit} reached")]
pub struct DailyLimitReached {
    pub limit: u32,
}

/// Enforces a minimum gap between the start of any two outbound calls.
///
/// The budget lock is held while waiting, so a second caller queues behind the
/// first and is spaced from its dispatch rather than racing it.
pub struct Pacer {
    clock: Arc<dyn Clock>,
    budget: Mutex<CallBudget>,
    daily_limit: Option<u32>,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, daily_limit: Option<u32>) -> Self {
        let budget = CallBudget::new(clock.now(), clock.wall());
        Self {
            clock,
            budget: Mutex::new(budget),
            daily_limit,
        }
    }

    /// Waits until `min_interval` has passed since the previous dispatch, then
    /// records a new dispatch and returns its instant.
    pub async fn acquire(&self, min_interval: Duration) -> Result<Instant, DailyLimitReached> {
        let mut budget = self.budget.lock().await;
        budget.roll_window(self.clock.now(), self.clock.wall());

        if let Some(limit) = self.daily_limit {
            if budget.call_count >= limit {
                tracing::error!(
                    current = budget.call_count,
                    limit,
                    "Daily provider call limit reached"
                );
                return Err(DailyLimitReached { limit });
            }
        }

        if let Some(last) = budget.last_call_at {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Pacing outbound call");
                self.clock.sleep(wait).await;
            }
        }

        let now = self.clock.now();
        let wall = self.clock.wall();
        budget.roll_window(now, wall);
        budget.last_call_at = Some(now);
        budget.last_call_wall = Some(wall);
        budget.call_count += 1;

        if let Some(limit) = self.daily_limit {
            if budget.call_count as f32 / limit as f32 > 0.8 {
                tracing::warn!(
                    current = budget.call_count,
                    limit,
                    remaining = limit.saturating_sub(budget.call_count),
                    "Daily provider call budget at 80%"
                );
            }
        }

        Ok(now)
    }

    pub async fn budget(&self) -> CallBudget {
        self.budget.lock().await.clone()
    }

    pub async fn snapshot(&self) -> BudgetSnapshot {
        let mut budget = self.budget.lock().await;
        budget.roll_window(self.clock.now(), self.clock.wall());
        BudgetSnapshot {
            calls_in_window: budget.call_count,
            daily_limit: self.daily_limit,
            last_call_at: budget.last_call_wall,
            window_started_at: budget.window_started_wall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::clock::ManualClock;

    fn pacer(limit: Option<u32>) -> (Arc<ManualClock>, Pacer) {
        let clock = Arc::new(ManualClock::new());
        let pacer = Pacer::new(clock.clone(), limit);
        (clock, pacer)
    }

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let (clock, pacer) = pacer(None);
        pacer.acquire(Duration::from_secs(5)).await.unwrap();
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_calls_are_spaced() {
        let (clock, pacer) = pacer(None);
        let interval = Duration::from_secs(5);

        let mut dispatches = Vec::new();
        for _ in 0..4 {
            dispatches.push(pacer.acquire(interval).await.unwrap());
            clock.advance(Duration::from_millis(700));
        }

        for pair in dispatches.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
        assert_eq!(pacer.budget().await.call_count(), 4);
    }

    #[tokio::test]
    async fn test_waits_only_for_the_remainder() {
        let (clock, pacer) = pacer(None);
        pacer.acquire(Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(4));
        pacer.acquire(Duration::from_secs(10)).await.unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(6)]);
    }

    #[tokio::test]
    async fn test_no_wait_once_interval_elapsed() {
        let (clock, pacer) = pacer(None);
        pacer.acquire(Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(30));
        pacer.acquire(Duration::from_secs(5)).await.unwrap();
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_budget() {
        let clock = Arc::new(ManualClock::new());
        let pacer = Arc::new(Pacer::new(clock.clone(), None));
        let interval = Duration::from_secs(5);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move { pacer.acquire(interval).await.unwrap() })
            })
            .collect();

        let mut dispatches = Vec::new();
        for handle in handles {
            dispatches.push(handle.await.unwrap());
        }
        dispatches.sort();

        for pair in dispatches.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test]
    async fn test_daily_limit_refuses_without_waiting() {
        let (clock, pacer) = pacer(Some(2));
        pacer.acquire(Duration::ZERO).await.unwrap();
        pacer.acquire(Duration::ZERO).await.unwrap();

        let err = pacer.acquire(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, DailyLimitReached { limit: 2 });
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        let (clock, pacer) = pacer(Some(1));
        pacer.acquire(Duration::ZERO).await.unwrap();
        assert!(pacer.acquire(Duration::ZERO).await.is_err());

        clock.advance(BUDGET_WINDOW);
        pacer.acquire(Duration::ZERO).await.unwrap();
        assert_eq!(pacer.budget().await.call_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_reports_last_call() {
        let (_clock, pacer) = pacer(Some(100));
        let before = pacer.snapshot().await;
        assert_eq!(before.calls_in_window, 0);
        assert!(before.last_call_at.is_none());

        pacer.acquire(Duration::ZERO).await.unwrap();
        let after = pacer.snapshot().await;
        assert_eq!(after.calls_in_window, 1);
        assert_eq!(after.daily_limit, Some(100));
        assert!(after.last_call_at.is_some());
    }
}
