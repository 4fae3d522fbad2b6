//! Errors produced while executing a request.

use reqwest::StatusCode;

/// Coarse category of a failed transport attempt, used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportErrorKind {
    /// The attempt timed out.
    Timeout,
    /// A connection could not be established.
    Connect,
    /// The connection broke mid-exchange or the peer spoke invalid HTTP.
    Protocol,
    /// The response body could not be read.
    Body,
    /// The request itself is malformed (bad URL, header, proxy or redirect).
    InvalidRequest,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connection error",
            TransportErrorKind::Protocol => "protocol error",
            TransportErrorKind::Body => "body error",
            TransportErrorKind::InvalidRequest => "invalid request",
        };
        write!(f, "{}", name)
    }
}

/// A failed transport attempt: no usable HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else if error.is_builder() || error.is_redirect() {
            TransportErrorKind::InvalidRequest
        } else {
            TransportErrorKind::Protocol
        };

        // reqwest keeps the useful detail (e.g. "connection refused") in the source chain
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        TransportError::new(kind, message)
    }
}

/// Why an attempt was judged worth repeating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// The transport failed with a retryable error kind.
    Transport(TransportError),
    /// The response status is in the retryable set.
    Status { status: StatusCode, body: String },
    /// The response body contains a retryable message.
    Message { status: StatusCode, body: String },
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::Transport(error) => {
                write!(f, "Encountered retryable exception: {}", error)
            }
            RetryReason::Status { status, body } => {
                write!(
                    f,
                    "Encountered retryable status {}. Response: {}",
                    status.as_u16(),
                    body
                )
            }
            RetryReason::Message { status, body } => {
                write!(
                    f,
                    "Encountered an error message that looks retryable ({}). Message: {}",
                    status.as_u16(),
                    body
                )
            }
        }
    }
}

/// Terminal errors returned by [`RequestExecutor`](super::RequestExecutor).
#[derive(Debug)]
pub enum RequestError {
    /// Every attempt was retryable and the attempt budget is spent.
    RetriesExhausted {
        url: String,
        attempts: usize,
        reason: RetryReason,
    },
    /// The server answered with a status that retrying will not fix.
    FailureStatus {
        url: String,
        status: StatusCode,
        body: String,
    },
    /// The transport failed in a way that retrying will not fix.
    Transport { url: String, source: TransportError },
}

impl RequestError {
    pub fn url(&self) -> &str {
        match self {
            RequestError::RetriesExhausted { url, .. }
            | RequestError::FailureStatus { url, .. }
            | RequestError::Transport { url, .. } => url,
        }
    }

    /// The status of the last response, if the failure carried one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::FailureStatus { status, .. } => Some(*status),
            RequestError::RetriesExhausted {
                reason: RetryReason::Status { status, .. } | RetryReason::Message { status, .. },
                ..
            } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::RetriesExhausted {
                url,
                attempts,
                reason,
            } => {
                write!(
                    f,
                    "Request ({}) failed after {} attempts. {}",
                    url, attempts, reason
                )
            }
            RequestError::FailureStatus { url, status, body } => {
                write!(
                    f,
                    "Invalid response code from request ({}): {}. Response: {}",
                    url,
                    status.as_u16(),
                    body
                )
            }
            RequestError::Transport { url, source } => {
                write!(f, "Request ({}) failed: {}", url, source)
            }
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Transport { source, .. } => Some(source),
            RequestError::RetriesExhausted {
                reason: RetryReason::Transport(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}
