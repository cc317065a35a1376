//! Retry eligibility, backoff and the per-call attempt state machine.

use std::time::Duration;

use reqwest::StatusCode;

use crate::{ApiError, ClientOptions};

/// Lifecycle of one logical call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttemptState {
    Initial,
    Dispatched,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

/// Why a call stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalReason {
    /// HTTP 401.
    Unauthorized,
    /// Failure the policy never retries (4xx, config, encode, cancel).
    NotRetryable,
    /// Retryable failure with no retries left.
    Exhausted,
}

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    RetryAfter(Duration),
    Terminal(TerminalReason),
}

/// Decides whether a failure is retried and how long to wait first.
///
/// Transport failures and 5xx are retried; 401, 403, 429 and other 4xx never are.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_options(options: &ClientOptions) -> Self {
        Self {
            max_retries: options.max_retries,
            base_delay: Duration::from_millis(options.retry_backoff_ms),
            max_delay: Duration::from_millis(options.max_backoff_ms),
            jitter: options.jitter,
        }
    }

    pub fn is_retryable(&self, err: &ApiError) -> bool {
        match err {
            ApiError::Transport(err) => should_retry_transport(err),
            ApiError::Http { status, .. } => StatusCode::from_u16(*status)
                .map(|status| status.is_server_error())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Delay before retry number `retry` (1-based): `min(base * 2^retry, max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.min(16);
        let multiplier = 1u32 << exp;
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    /// [`RetryPolicy::backoff`] with full jitter applied when enabled.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if !self.jitter {
            return delay;
        }
        let max_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(fastrand::u64(0..=max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&ClientOptions::default())
    }
}

fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Tracks one logical call across its attempts.
///
/// `attempt_count` counts retries, so total dispatches are `attempt_count + 1`
/// and never exceed `max_retries + 1`.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    attempt_count: u32,
    retrying: bool,
    state: AttemptState,
}

impl RequestDescriptor {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            retrying: false,
            state: AttemptState::Initial,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn dispatches(&self) -> u32 {
        self.attempt_count + 1
    }

    pub fn is_retrying(&self) -> bool {
        self.retrying
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Marks the descriptor in flight. No-op once it is finished.
    pub fn dispatch(&mut self) {
        if matches!(
            self.state,
            AttemptState::Initial | AttemptState::FailedRetryable
        ) {
            self.state = AttemptState::Dispatched;
        }
    }

    /// `true` once the call succeeded or failed for good.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            AttemptState::Succeeded | AttemptState::FailedTerminal
        )
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded;
    }

    /// Records a failed attempt and advances the retry counter when another attempt is allowed.
    pub fn fail(&mut self, policy: &RetryPolicy, err: &ApiError) -> Disposition {
        if matches!(err, ApiError::Unauthorized { .. }) {
            self.state = AttemptState::FailedTerminal;
            return Disposition::Terminal(TerminalReason::Unauthorized);
        }
        if !policy.is_retryable(err) {
            self.state = AttemptState::FailedTerminal;
            return Disposition::Terminal(TerminalReason::NotRetryable);
        }
        if self.attempt_count >= policy.max_retries {
            self.state = AttemptState::FailedTerminal;
            return Disposition::Terminal(TerminalReason::Exhausted);
        }

        self.attempt_count += 1;
        self.retrying = true;
        self.state = AttemptState::FailedRetryable;
        Disposition::RetryAfter(policy.delay_for(self.attempt_count))
    }

    /// Forces the terminal state, e.g. on cancellation.
    pub fn abandon(&mut self) {
        self.state = AttemptState::FailedTerminal;
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new()
    }
}
