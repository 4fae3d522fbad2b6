//! HTTP requests with classification-driven retry.

mod error;
mod executor;
mod retry;
mod session;
mod transport;

pub use error::{RequestError, RetryReason, TransportError, TransportErrorKind};
pub use executor::RequestExecutor;
pub use retry::{
    BACKOFF, Classification, MAX_DELAY, MAX_TRIES, RETRY_DELAY, RETRYABLE_ERROR_KINDS,
    RETRYABLE_MESSAGES, RETRYABLE_STATUS_CODES, RetryPolicy,
};
pub use session::{
    DEFAULT_USER_AGENT, SessionOptions, TCP_KEEPALIVE, TCP_KEEPALIVE_INTERVAL,
    TCP_KEEPALIVE_RETRIES, build_client, proxy_for,
};
pub use transport::{HttpResponse, ReqwestTransport, RequestDescriptor, Transport};

#[cfg(test)]
pub use transport::MockTransport;
