//! Construction of the shared, connection-pooling HTTP client.
//!
//! The client is an explicit value: build it once, clone it freely (clones share
//! one connection pool) and hand it to every transport that should reuse
//! connections. It is safe to use from many tasks at once.

use log::debug;
use reqwest::{Client, Proxy};
use std::collections::BTreeMap;
use std::time::Duration;

use super::error::{TransportError, TransportErrorKind};

/// Idle time before the first TCP keepalive probe.
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Time between unanswered keepalive probes.
pub const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Unanswered probes before the connection is dropped. With the values
/// above a dead peer is detected two minutes after the last traffic.
pub const TCP_KEEPALIVE_RETRIES: u32 = 6;

pub const DEFAULT_USER_AGENT: &str = concat!("corekit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub user_agent: Option<String>,
    /// Per-attempt timeout enforced by the client.
    pub timeout: Option<Duration>,
    /// Proxy URL per scheme: `http`, `https` or `all`.
    pub proxies: BTreeMap<String, String>,
}

/// Maps a scheme and URL to a reqwest proxy rule.
pub fn proxy_for(scheme: &str, url: &str) -> Result<Proxy, TransportError> {
    let proxy = match scheme.to_ascii_lowercase().as_str() {
        "http" => Proxy::http(url)?,
        "https" => Proxy::https(url)?,
        "all" => Proxy::all(url)?,
        other => {
            return Err(TransportError::new(
                TransportErrorKind::InvalidRequest,
                format!("Unsupported proxy scheme: {}", other),
            ));
        }
    };
    Ok(proxy)
}

/// Builds a client with TCP keepalive enabled, so dead connections are
/// dropped instead of lingering in the pool.
#[tracing::instrument]
pub fn build_client(options: &SessionOptions) -> Result<Client, TransportError> {
    let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .tcp_keepalive(TCP_KEEPALIVE)
        .tcp_keepalive_interval(TCP_KEEPALIVE_INTERVAL)
        .tcp_keepalive_retries(TCP_KEEPALIVE_RETRIES);

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    for (scheme, url) in &options.proxies {
        debug!("Using {} proxy {}", scheme, url);
        builder = builder.proxy(proxy_for(scheme, url)?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_for_known_schemes() {
        assert!(proxy_for("http", "http://127.0.0.1:3128").is_ok());
        assert!(proxy_for("HTTPS", "http://127.0.0.1:3128").is_ok());
        assert!(proxy_for("all", "http://127.0.0.1:3128").is_ok());
    }

    #[test]
    fn test_proxy_for_unknown_scheme() {
        let err = proxy_for("ftp", "http://127.0.0.1:3128").unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidRequest);
        assert!(err.message().contains("ftp"));
    }

    #[test]
    fn test_keepalive_detects_dead_peer_within_two_minutes() {
        let detection = TCP_KEEPALIVE + TCP_KEEPALIVE_INTERVAL * TCP_KEEPALIVE_RETRIES;
        assert_eq!(detection, Duration::from_secs(120));
    }

    #[test]
    fn test_build_client_with_defaults() {
        assert!(build_client(&SessionOptions::default()).is_ok());
    }

    #[tokio::test]
    async fn test_build_client_sends_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("user-agent", "corekit-test")
            .create_async()
            .await;

        let options = SessionOptions {
            user_agent: Some("corekit-test".to_string()),
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let client = build_client(&options).unwrap();
        let _ = client.get(server.url()).send().await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_build_client_default_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .create_async()
            .await;

        let client = build_client(&SessionOptions::default()).unwrap();
        let _ = client.get(server.url()).send().await;

        mock.assert_async().await;
    }
}
