//! Retrying request executor.

use log::{debug, warn};
use reqwest::Client;

use super::error::{RequestError, RetryReason};
use super::retry::{Classification, RetryPolicy};
use super::transport::{HttpResponse, ReqwestTransport, RequestDescriptor, Transport};
use crate::runtime::{RealRuntime, Runtime};
use crate::time::time_api;

/// Performs one logical request with automatic retry on transient failures.
///
/// The executor holds no per-call state, so one instance can serve many
/// concurrent tasks. Backoff sleeps suspend only the calling task.
pub struct RequestExecutor<T: Transport, R: Runtime> {
    transport: T,
    runtime: R,
    policy: RetryPolicy,
}

impl RequestExecutor<ReqwestTransport, RealRuntime> {
    /// Executor over a shared reqwest client with the real clock.
    pub fn from_client(client: Client, policy: RetryPolicy) -> Self {
        Self::new(ReqwestTransport::new(client), RealRuntime, policy)
    }
}

impl<T: Transport, R: Runtime> RequestExecutor<T, R> {
    pub fn new(transport: T, runtime: R, policy: RetryPolicy) -> Self {
        Self {
            transport,
            runtime,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request`, retrying while the outcome is classified as retryable.
    ///
    /// Returns the 200 response, or the response of a non-retryable status
    /// when the policy does not raise on failure status.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, RequestError> {
        let max_tries = self.policy.max_tries();
        let mut delays = self.policy.delays();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                "Running request for url ({}), attempt {}/{}.",
                request.url, attempt, max_tries
            );

            let outcome = time_api("RequestExecutor::execute", self.transport.send(request)).await;

            let reason = match outcome {
                Err(error) => match self.policy.classify_error(&error) {
                    Classification::Retryable(reason) => reason,
                    Classification::Success | Classification::Terminal => {
                        debug!("Non-retryable error for url ({}): {}", request.url, error);
                        return Err(RequestError::Transport {
                            url: request.url.clone(),
                            source: error,
                        });
                    }
                },
                Ok(response) => match self.policy.classify_response(&response) {
                    Classification::Success => return Ok(response),
                    Classification::Retryable(reason) => reason,
                    Classification::Terminal => return self.terminal(request, response),
                },
            };

            match delays.next() {
                Some(delay) => {
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}...",
                        request.url, attempt, max_tries, reason, delay
                    );
                    self.runtime.sleep(delay).await;
                }
                None => return Err(self.exhausted(request, attempt, reason)),
            }
        }
    }

    /// Sends a plain GET to `url`.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, RequestError> {
        self.execute(&RequestDescriptor::get(url)).await
    }

    fn terminal(
        &self,
        request: &RequestDescriptor,
        response: HttpResponse,
    ) -> Result<HttpResponse, RequestError> {
        if !self.policy.raise_on_failure_status() {
            debug!(
                "Returning non-retryable status {} for url ({})",
                response.status(),
                request.url
            );
            return Ok(response);
        }

        Err(RequestError::FailureStatus {
            url: request.url.clone(),
            status: response.status(),
            body: response.text().into_owned(),
        })
    }

    fn exhausted(
        &self,
        request: &RequestDescriptor,
        attempts: usize,
        reason: RetryReason,
    ) -> RequestError {
        warn!(
            "{}: giving up after {} attempts ({})",
            request.url, attempts, reason
        );
        RequestError::RetriesExhausted {
            url: request.url.clone(),
            attempts,
            reason,
        }
    }
}
