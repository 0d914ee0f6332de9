//! Retry logic with configurable backoff
//!
//! Wraps a single command attempt and re-runs it while its exit status is
//! listed as transient.

use crate::constants::DEFAULT_RETRYABLE_EXIT_CODES;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay progression between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Always `initial_delay`
    Fixed,
    /// `initial_delay * n`
    Linear,
    /// `initial_delay * 2^(n-1)`
    #[default]
    #[serde(alias = "exponential")]
    ExponentialBackoff,
    /// Uniform in `0..=max_delay`
    Random,
}

impl RetryStrategy {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::ExponentialBackoff => "exponential_backoff",
            Self::Random => "random",
        }
    }
}

impl std::str::FromStr for RetryStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential_backoff" | "exponential" => Ok(Self::ExponentialBackoff),
            "random" => Ok(Self::Random),
            other => Err(Error::InvalidInput(format!(
                "Unknown retry strategy '{}'. Valid: fixed, linear, exponential_backoff, random",
                other
            ))),
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retry at all
    pub enabled: bool,
    /// Delay progression
    pub strategy: RetryStrategy,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any delay in milliseconds
    pub max_delay_ms: u64,
    /// Exit codes worth another attempt
    pub retryable_exit_codes: BTreeSet<i32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: RetryStrategy::default(),
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            retryable_exit_codes: DEFAULT_RETRYABLE_EXIT_CODES.iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set maximum retries
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Replace the retryable exit codes
    #[must_use]
    pub fn with_retryable_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.retryable_exit_codes = codes.into_iter().collect();
        self
    }

    /// Delay before retry `retry` (1-indexed), capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let n = retry.max(1);
        let initial = self.initial_delay_ms;
        let ms = match self.strategy {
            RetryStrategy::Fixed => initial,
            RetryStrategy::Linear => initial.saturating_mul(u64::from(n)),
            RetryStrategy::ExponentialBackoff => {
                let factor = 1u64.checked_shl(n - 1).unwrap_or(u64::MAX);
                initial.saturating_mul(factor)
            }
            RetryStrategy::Random => rand::thread_rng().gen_range(0..=self.max_delay_ms),
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Whether an exit code is worth another attempt under this policy.
    #[must_use]
    pub fn is_retryable_code(&self, code: i32) -> bool {
        self.enabled && self.retryable_exit_codes.contains(&code)
    }
}

/// What the retry loop needs to know about an attempt's outcome.
pub trait RetryOutcome {
    /// Exit status used for the retry decision (timeouts report their
    /// timeout code).
    fn retry_exit_code(&self) -> Option<i32>;

    /// Outcomes that must never be retried (pending prompts, blocked
    /// commands).
    fn is_retry_exempt(&self) -> bool;

    /// Record how many attempts were made and whether the policy ran out.
    fn record_attempts(&mut self, attempts: u32, exhausted: bool);
}

/// Run `attempt` under `policy`.
///
/// `attempt` receives the shared state and the 1-indexed attempt number.
/// Errors from an attempt end the loop immediately; only outcomes with a
/// retryable exit code are retried. The wait between attempts stops early
/// when `cancel` fires.
pub async fn run_with_retry<S, T, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    state: &mut S,
    mut attempt: F,
) -> Result<T>
where
    S: Send,
    T: RetryOutcome,
    F: for<'a> FnMut(&'a mut S, u32) -> BoxFuture<'a, Result<T>>,
{
    let mut attempt_no: u32 = 1;
    loop {
        let mut outcome = attempt(state, attempt_no).await?;

        let code = outcome.retry_exit_code();
        let retryable = !outcome.is_retry_exempt() && code.is_some_and(|c| policy.is_retryable_code(c));
        if !retryable {
            if attempt_no > 1 {
                debug!(attempt = attempt_no, "Command settled after retry");
            }
            outcome.record_attempts(attempt_no, false);
            return Ok(outcome);
        }

        if attempt_no > policy.max_retries {
            warn!(
                attempts = attempt_no,
                exit_code = ?code,
                "Retries exhausted"
            );
            outcome.record_attempts(attempt_no, true);
            return Ok(outcome);
        }

        let delay = policy.delay_for(attempt_no);
        warn!(
            attempt = attempt_no,
            max_retries = policy.max_retries,
            exit_code = ?code,
            delay_ms = delay.as_millis() as u64,
            strategy = policy.strategy.as_str(),
            "Retryable exit code, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled("retry wait interrupted".to_string()));
            }
            _ = sleep(delay) => {}
        }
        attempt_no += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Debug)]
    struct Outcome {
        code: Option<i32>,
        exempt: bool,
        attempts: u32,
        exhausted: bool,
    }

    impl Outcome {
        fn exit(code: i32) -> Self {
            Self {
                code: Some(code),
                exempt: false,
                attempts: 0,
                exhausted: false,
            }
        }
    }

    impl RetryOutcome for Outcome {
        fn retry_exit_code(&self) -> Option<i32> {
            self.code
        }

        fn is_retry_exempt(&self) -> bool {
            self.exempt
        }

        fn record_attempts(&mut self, attempts: u32, exhausted: bool) {
            self.attempts = attempts;
            self.exhausted = exhausted;
        }
    }

    /// Replays `codes` in order and records when each attempt started.
    struct Script {
        codes: Vec<i32>,
        started: Vec<Instant>,
    }

    impl Script {
        fn new(codes: &[i32]) -> Self {
            Self {
                codes: codes.to_vec(),
                started: Vec::new(),
            }
        }
    }

    async fn run(policy: &RetryPolicy, script: &mut Script) -> Result<Outcome> {
        let cancel = CancellationToken::new();
        run_with_retry(policy, &cancel, script, |s, n| {
            Box::pin(async move {
                s.started.push(Instant::now());
                let code = s.codes[(n as usize - 1).min(s.codes.len() - 1)];
                Ok(Outcome::exit(code))
            })
        })
        .await
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.strategy, RetryStrategy::ExponentialBackoff);
        assert_eq!(policy.max_retries, 3);
        assert!(policy.retryable_exit_codes.contains(&124));
        assert!(!policy.retryable_exit_codes.contains(&1));
    }

    #[test]
    fn test_delay_progressions() {
        let base = RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1000));

        let fixed = base.clone().with_strategy(RetryStrategy::Fixed);
        assert_eq!(fixed.delay_for(1), Duration::from_millis(100));
        assert_eq!(fixed.delay_for(5), Duration::from_millis(100));

        let linear = base.clone().with_strategy(RetryStrategy::Linear);
        assert_eq!(linear.delay_for(1), Duration::from_millis(100));
        assert_eq!(linear.delay_for(3), Duration::from_millis(300));
        assert_eq!(linear.delay_for(50), Duration::from_millis(1000));

        let exp = base.clone().with_strategy(RetryStrategy::ExponentialBackoff);
        assert_eq!(exp.delay_for(1), Duration::from_millis(100));
        assert_eq!(exp.delay_for(2), Duration::from_millis(200));
        assert_eq!(exp.delay_for(3), Duration::from_millis(400));
        assert_eq!(exp.delay_for(4), Duration::from_millis(800));
        assert_eq!(exp.delay_for(5), Duration::from_millis(1000));
        assert_eq!(exp.delay_for(200), Duration::from_millis(1000));

        let random = base.with_strategy(RetryStrategy::Random);
        for n in 1..20 {
            assert!(random.delay_for(n) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "exponential_backoff".parse::<RetryStrategy>().unwrap(),
            RetryStrategy::ExponentialBackoff
        );
        assert_eq!("linear".parse::<RetryStrategy>().unwrap(), RetryStrategy::Linear);
        assert!("sometimes".parse::<RetryStrategy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_two_failures_then_success() {
        let policy = RetryPolicy::new()
            .with_strategy(RetryStrategy::ExponentialBackoff)
            .with_initial_delay(Duration::from_millis(1000));
        let mut script = Script::new(&[124, 124, 0]);

        let outcome = tokio_test::assert_ok!(run(&policy, &mut script).await);

        assert_eq!(outcome.code, Some(0));
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.exhausted);
        assert_eq!(script.started.len(), 3);
        let first_gap = script.started[1] - script.started[0];
        let second_gap = script.started[2] - script.started[1];
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_result() {
        let policy = RetryPolicy::new()
            .with_strategy(RetryStrategy::Fixed)
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(10));
        let mut script = Script::new(&[7, 7, 6]);

        let outcome = run(&policy, &mut script).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.exhausted);
        assert_eq!(outcome.code, Some(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_code_stops() {
        let policy = RetryPolicy::new();
        let mut script = Script::new(&[1, 0]);
        let outcome = run(&policy, &mut script).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.code, Some(1));
        assert!(!outcome.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_policy_runs_once() {
        let mut script = Script::new(&[124, 0]);
        let outcome = run(&RetryPolicy::disabled(), &mut script).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(script.started.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exempt_outcome_not_retried() {
        let policy = RetryPolicy::new();
        let cancel = CancellationToken::new();
        let mut calls = 0u32;
        let outcome = run_with_retry(&policy, &cancel, &mut calls, |calls, _| {
            Box::pin(async move {
                *calls += 1;
                Ok(Outcome {
                    exempt: true,
                    ..Outcome::exit(124)
                })
            })
        })
        .await
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_error_is_not_retried() {
        let policy = RetryPolicy::new();
        let cancel = CancellationToken::new();
        let mut calls = 0u32;
        let result: Result<Outcome> = run_with_retry(&policy, &cancel, &mut calls, |calls, _| {
            Box::pin(async move {
                *calls += 1;
                Err(Error::ProcessSpawn("no shell".into()))
            })
        })
        .await;
        assert!(matches!(result, Err(Error::ProcessSpawn(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let policy = RetryPolicy::new().with_initial_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let mut script = Script::new(&[75]);
        let started = Instant::now();
        let result = run_with_retry(&policy, &cancel, &mut script, |s, _| {
            Box::pin(async move {
                s.started.push(Instant::now());
                Ok(Outcome::exit(75))
            })
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(script.started.len(), 1);
    }
}
