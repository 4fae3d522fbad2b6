//! Retry policy: which outcomes are worth another attempt, and how long to wait.

use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::time::Duration;

use super::error::{RetryReason, TransportError, TransportErrorKind};
use super::transport::HttpResponse;

/// Maximum number of attempts, including the first one.
pub const MAX_TRIES: usize = 5;

/// Delay before the first retry.
pub const RETRY_DELAY: Duration = Duration::from_secs(90);

/// Factor applied to the delay after every retry.
pub const BACKOFF: f64 = 1.25;

/// Upper bound for any single delay.
pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

pub const RETRYABLE_STATUS_CODES: [u16; 5] = [429, 560, 502, 503, 500];

/// Body fragments (lowercase) that mark a response as transient.
pub const RETRYABLE_MESSAGES: [&str; 4] =
    ["retry in a few", "wait a few", "trying again", "try again"];

pub const RETRYABLE_ERROR_KINDS: [TransportErrorKind; 4] = [
    TransportErrorKind::Timeout,
    TransportErrorKind::Connect,
    TransportErrorKind::Protocol,
    TransportErrorKind::Body,
];

/// The verdict on a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    Retryable(RetryReason),
    Terminal,
}

/// Immutable retry configuration for a [`RequestExecutor`](super::RequestExecutor).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_tries: usize,
    delay: Duration,
    backoff: f64,
    max_delay: Duration,
    retryable_errors: BTreeSet<TransportErrorKind>,
    retryable_statuses: BTreeSet<u16>,
    retryable_messages: Vec<String>,
    raise_on_failure_status: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: MAX_TRIES,
            delay: RETRY_DELAY,
            backoff: BACKOFF,
            max_delay: MAX_DELAY,
            retryable_errors: RETRYABLE_ERROR_KINDS.into_iter().collect(),
            retryable_statuses: RETRYABLE_STATUS_CODES.into_iter().collect(),
            retryable_messages: RETRYABLE_MESSAGES.iter().map(|m| m.to_string()).collect(),
            raise_on_failure_status: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget. At least one attempt is always made.
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the delay multiplier. Non-finite or negative factors are treated as 1.
    #[must_use]
    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = if backoff.is_finite() && backoff >= 0.0 {
            backoff
        } else {
            1.0
        };
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_retryable_errors(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Set the retryable body fragments. Matching ignores case.
    #[must_use]
    pub fn with_retryable_messages<S: Into<String>>(
        mut self,
        messages: impl IntoIterator<Item = S>,
    ) -> Self {
        self.retryable_messages = messages
            .into_iter()
            .map(|m| m.into().to_lowercase())
            .collect();
        self
    }

    #[must_use]
    pub fn with_raise_on_failure_status(mut self, raise: bool) -> Self {
        self.raise_on_failure_status = raise;
        self
    }

    pub fn max_tries(&self) -> usize {
        self.max_tries
    }

    pub fn raise_on_failure_status(&self) -> bool {
        self.raise_on_failure_status
    }

    /// Delays to wait between consecutive attempts; one fewer than `max_tries`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        Backoff {
            next: self.delay,
            factor: self.backoff,
            max: self.max_delay,
        }
        .take(self.max_tries - 1)
    }

    /// Classifies a failed transport attempt.
    pub fn classify_error(&self, error: &TransportError) -> Classification {
        if self.retryable_errors.contains(&error.kind()) {
            Classification::Retryable(RetryReason::Transport(error.clone()))
        } else {
            Classification::Terminal
        }
    }

    /// Classifies a received response.
    ///
    /// Body text is only inspected for a non-200 status outside the retryable
    /// status set, so a single attempt never matches twice.
    pub fn classify_response(&self, response: &HttpResponse) -> Classification {
        let status = response.status();
        if status == StatusCode::OK {
            return Classification::Success;
        }

        if self.retryable_statuses.contains(&status.as_u16()) {
            return Classification::Retryable(RetryReason::Status {
                status,
                body: response.text().into_owned(),
            });
        }

        let text = response.text();
        let lowercase = text.to_lowercase();
        if self
            .retryable_messages
            .iter()
            .any(|message| lowercase.contains(message.as_str()))
        {
            return Classification::Retryable(RetryReason::Message {
                status,
                body: text.into_owned(),
            });
        }

        Classification::Terminal
    }
}

/// Capped exponential backoff: `min(delay * factor^n, max)`.
#[derive(Debug, Clone)]
struct Backoff {
    next: Duration,
    factor: f64,
    max: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        Some(current)
    }
}
