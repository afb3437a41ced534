use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult, ProviderFailure};

use super::classify::{classify, summarize, ProviderErrorKind};
use super::clock::Clock;
use super::pacer::Pacer;

/// Advisory shown when the provider refuses on content-policy grounds
pub const BLOCKED_ADVISORY: &str =
    "Request blocked by content policy. Please adjust your input and try again.";

/// Result of one logical call. Raw provider errors never escape the governor.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Blocked,
    Unavailable(String),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Converts into the HTTP-facing error type
    pub fn into_result(self) -> AppResult<T> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Blocked => Err(AppError::ContentBlocked(BLOCKED_ADVISORY.to_string())),
            Outcome::Unavailable(message) => Err(AppError::ServiceUnavailable(message)),
        }
    }
}

/// Attempt limit and the waits between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPlan {
    max_attempts: u32,
    backoff_schedule: Vec<Duration>,
}

impl RetryPlan {
    pub fn new(max_attempts: u32, backoff_schedule: Vec<Duration>) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Config("max_attempts must be at least 1".to_string()));
        }
        if backoff_schedule.len() < (max_attempts - 1) as usize {
            return Err(AppError::Config(format!(
                "backoff schedule has {} steps but {} attempts need {}",
                backoff_schedule.len(),
                max_attempts,
                max_attempts - 1
            )));
        }
        if backoff_schedule.windows(2).any(|w| w[1] < w[0]) {
            return Err(AppError::Config(
                "backoff schedule must be non-decreasing".to_string(),
            ));
        }

        Ok(Self {
            max_attempts,
            backoff_schedule,
        })
    }

    /// `steps` waits starting at `base`, each `multiplier` times the previous
    pub fn geometric(
        max_attempts: u32,
        base: Duration,
        multiplier: u32,
        steps: usize,
    ) -> AppResult<Self> {
        let multiplier = multiplier.max(1);
        let schedule = std::iter::successors(Some(base), |prev| prev.checked_mul(multiplier))
            .take(steps)
            .collect();
        Self::new(max_attempts, schedule)
    }

    /// A single attempt and no waits
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff_schedule: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_schedule(&self) -> &[Duration] {
        &self.backoff_schedule
    }

    /// Wait after the given failed attempt (1-based)
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_schedule
            .get((attempt - 1) as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Upper bound on time spent waiting between attempts
    pub fn total_backoff(&self) -> Duration {
        self.backoff_schedule
            .iter()
            .take((self.max_attempts - 1) as usize)
            .sum()
    }
}

impl Default for RetryPlan {
    /// Three attempts over a 5s, 10s, 20s, 40s, 80s schedule
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_schedule: [5, 10, 20, 40, 80]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

/// Runs one logical call through the pacer with classified retries
pub struct Retrier<'a> {
    pacer: &'a Pacer,
    clock: &'a dyn Clock,
    plan: &'a RetryPlan,
    min_interval: Duration,
    call_site: &'static str,
}

impl<'a> Retrier<'a> {
    pub fn new(
        pacer: &'a Pacer,
        clock: &'a dyn Clock,
        plan: &'a RetryPlan,
        min_interval: Duration,
        call_site: &'static str,
    ) -> Self {
        Self {
            pacer,
            clock,
            plan,
            min_interval,
            call_site,
        }
    }

    /// Invokes `work` up to `max_attempts` times, one attempt in flight at a time
    pub async fn run<T, F, Fut>(&self, mut work: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        let mut attempt = 1;

        loop {
            if let Err(e) = self.pacer.acquire(self.min_interval).await {
                tracing::warn!(call_site = self.call_site, error = %e, "Call budget exhausted");
                return Outcome::Unavailable(format!(
                    "Daily AI request budget used up ({}). Please try again tomorrow.",
                    e
                ));
            }

            tracing::debug!(call_site = self.call_site, attempt, "Dispatching provider call");

            let failure = match work().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(call_site = self.call_site, attempt, "Provider call succeeded after retry");
                    }
                    return Outcome::Success(value);
                }
                Err(failure) => failure,
            };

            let kind = classify(&failure);
            let summary = summarize(&failure);

            match kind {
                ProviderErrorKind::ContentBlocked => {
                    tracing::warn!(call_site = self.call_site, attempt, error = %summary, "Provider blocked request");
                    return Outcome::Blocked;
                }
                ProviderErrorKind::Unknown => {
                    tracing::error!(call_site = self.call_site, attempt, error = %failure, "Unclassified provider failure");
                    return Outcome::Unavailable(format!("AI error: {}", summary));
                }
                kind if kind.is_retryable() && attempt < self.plan.max_attempts => {
                    let backoff = self.plan.backoff_after(attempt);
                    tracing::warn!(
                        call_site = self.call_site,
                        attempt,
                        kind = %kind,
                        backoff_secs = backoff.as_secs_f64(),
                        "AI service busy, retrying"
                    );
                    self.clock.sleep(backoff).await;
                    attempt += 1;
                }
                _ => {
                    tracing::error!(
                        call_site = self.call_site,
                        attempts = attempt,
                        kind = %kind,
                        error = %failure,
                        "Provider retries exhausted"
                    );
                    return Outcome::Unavailable(exhausted_message(kind, &summary));
                }
            }
        }
    }
}

fn exhausted_message(kind: ProviderErrorKind, summary: &str) -> String {
    match kind {
        ProviderErrorKind::QuotaExhausted => format!(
            "AI quota exhausted. Please try again tomorrow. ({})",
            summary
        ),
        _ => format!("AI service is busy. Please try again later. ({})", summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    struct Harness {
        clock: Arc<ManualClock>,
        pacer: Pacer,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new());
            let pacer = Pacer::new(clock.clone(), None);
            Self { clock, pacer }
        }

        fn retrier<'a>(&'a self, plan: &'a RetryPlan) -> Retrier<'a> {
            Retrier::new(&self.pacer, self.clock.as_ref(), plan, Duration::ZERO, "test")
        }
    }

    #[test]
    fn test_plan_rejects_short_schedule() {
        let err = RetryPlan::new(3, secs(&[5])).unwrap_err();
        assert!(err.to_string().contains("backoff schedule"));
    }

    #[test]
    fn test_plan_rejects_decreasing_schedule() {
        assert!(RetryPlan::new(3, secs(&[10, 5])).is_err());
    }

    #[test]
    fn test_plan_rejects_zero_attempts() {
        assert!(RetryPlan::new(0, Vec::new()).is_err());
    }

    #[test]
    fn test_geometric_schedule() {
        let plan = RetryPlan::geometric(3, Duration::from_secs(5), 2, 5).unwrap();
        assert_eq!(plan.backoff_schedule(), secs(&[5, 10, 20, 40, 80]).as_slice());
        assert_eq!(plan.total_backoff(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_plan_matches_geometric() {
        let geometric = RetryPlan::geometric(3, Duration::from_secs(5), 2, 5).unwrap();
        assert_eq!(RetryPlan::default(), geometric);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();

        let outcome = harness
            .retrier(&plan)
            .run(|| async { Ok::<_, ProviderFailure>("done") })
            .await;

        assert_eq!(outcome, Outcome::Success("done"));
        assert!(harness.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_content_blocked_is_never_retried() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();
        let calls = AtomicU32::new(0);

        let outcome: Outcome<()> = harness
            .retrier(&plan)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderFailure::api("PROHIBITED_CONTENT")) }
            })
            .await;

        assert_eq!(outcome, Outcome::Blocked);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(harness.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_is_blocked() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();

        let outcome: Outcome<()> = harness
            .retrier(&plan)
            .run(|| async { Err(ProviderFailure::EmptyPayload) })
            .await;

        assert_eq!(outcome, Outcome::Blocked);
    }

    #[tokio::test]
    async fn test_rate_limited_backoff_totals_fifteen_seconds() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();
        let calls = AtomicU32::new(0);

        let outcome: Outcome<()> = harness
            .retrier(&plan)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderFailure::api("HTTP 429: Too Many Requests")) }
            })
            .await;

        assert!(matches!(outcome, Outcome::Unavailable(ref msg) if msg.contains("try again later")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(harness.clock.sleeps(), secs(&[5, 10]));
        assert_eq!(harness.clock.total_slept(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_suggests_tomorrow() {
        let harness = Harness::new();
        let plan = RetryPlan::new(2, secs(&[5])).unwrap();

        let outcome: Outcome<()> = harness
            .retrier(&plan)
            .run(|| async { Err(ProviderFailure::api("429 quota exceeded")) })
            .await;

        match outcome {
            Outcome::Unavailable(msg) => {
                assert!(msg.contains("try again tomorrow"));
                assert!(msg.contains("429 quota exceeded"));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_two_quota_failures() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();
        let calls = AtomicU32::new(0);

        let outcome = harness
            .retrier(&plan)
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(ProviderFailure::api("429 quota exceeded"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome, Outcome::Success(3));
        assert_eq!(harness.clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_failure_is_terminal_and_truncated() {
        let harness = Harness::new();
        let plan = RetryPlan::new(3, secs(&[5, 10])).unwrap();
        let calls = AtomicU32::new(0);
        let verbose = format!("invalid argument: {}", "detail ".repeat(60));

        let outcome: Outcome<()> = harness
            .retrier(&plan)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                let message = verbose.clone();
                async move { Err(ProviderFailure::api(message)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome {
            Outcome::Unavailable(msg) => {
                assert!(msg.starts_with("AI error: invalid argument"));
                assert!(msg.len() < verbose.len());
            }
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempts_are_paced() {
        let clock = Arc::new(ManualClock::new());
        let pacer = Pacer::new(clock.clone(), None);
        let plan = RetryPlan::new(3, secs(&[1, 1])).unwrap();
        let retrier = Retrier::new(&pacer, clock.as_ref(), &plan, Duration::from_secs(4), "test");

        let _: Outcome<()> = retrier
            .run(|| async { Err(ProviderFailure::api("HTTP 503")) })
            .await;

        // backoff of 1s, then the pacer tops up to the 4s interval
        assert_eq!(clock.sleeps(), secs(&[1, 3, 1, 3]));
        assert_eq!(pacer.budget().await.call_count(), 3);
    }

    #[tokio::test]
    async fn test_daily_limit_short_circuits() {
        let clock = Arc::new(ManualClock::new());
        let pacer = Pacer::new(clock.clone(), Some(0));
        let plan = RetryPlan::once();
        let retrier = Retrier::new(&pacer, clock.as_ref(), &plan, Duration::ZERO, "test");
        let calls = AtomicU32::new(0);

        let outcome: Outcome<()> = retrier
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(outcome, Outcome::Unavailable(ref msg) if msg.contains("tomorrow")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(Outcome::Success(1).into_result().unwrap(), 1);
        assert!(matches!(
            Outcome::<()>::Blocked.into_result(),
            Err(AppError::ContentBlocked(_))
        ));
        assert!(matches!(
            Outcome::<()>::Unavailable("busy".to_string()).into_result(),
            Err(AppError::ServiceUnavailable(_))
        ));
    }
}
