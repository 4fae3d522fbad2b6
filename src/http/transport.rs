//! A single HTTP attempt: what to send, what came back, and who sends it.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::error::TransportError;
use super::session::{SessionOptions, build_client};

/// Everything needed to issue one logical request.
///
/// The same descriptor is sent unchanged on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Proxy URL per scheme: `http`, `https` or `all`.
    pub proxies: BTreeMap<String, String>,
    pub params: Vec<(String, String)>,
    /// Leave a 200 response body unread so it can be consumed in chunks.
    pub stream: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            proxies: BTreeMap::new(),
            params: Vec::new(),
            stream: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn proxy(mut self, scheme: impl Into<String>, url: impl Into<String>) -> Self {
        self.proxies.insert(scheme.into(), url.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

#[derive(Debug)]
enum Body {
    Buffered(Vec<u8>),
    Streaming(reqwest::Response),
}

/// An HTTP response whose body is either fully buffered or still streaming.
///
/// Only a 200 response to a streaming request keeps a live body; every other
/// response is buffered so its text can be inspected.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl HttpResponse {
    /// Creates a buffered response.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Buffered(body.into()),
        }
    }

    fn streaming(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: Body::Streaming(response),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Streaming(_))
    }

    /// The buffered body as text. Empty while the body is still streaming.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.body {
            Body::Buffered(bytes) => String::from_utf8_lossy(bytes),
            Body::Streaming(_) => Cow::Borrowed(""),
        }
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Vec<u8>, TransportError> {
        match self.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Streaming(response) => Ok(response.bytes().await?.to_vec()),
        }
    }

    /// Returns the next chunk of the body, or `None` once it is exhausted.
    ///
    /// A buffered body is returned as a single chunk.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match &mut self.body {
            Body::Buffered(bytes) if bytes.is_empty() => Ok(None),
            Body::Buffered(bytes) => Ok(Some(std::mem::take(bytes))),
            Body::Streaming(response) => Ok(response.chunk().await?.map(|c| c.to_vec())),
        }
    }
}

/// Issues a single HTTP attempt. Retrying is the caller's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

/// Proxy settings to the client built for them.
type ProxiedClients = BTreeMap<BTreeMap<String, String>, Client>;

/// [`Transport`] over a shared, connection-pooling reqwest [`Client`].
///
/// Clones share the pool and the proxied clients.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    options: SessionOptions,
    proxied: Arc<Mutex<ProxiedClients>>,
}

impl ReqwestTransport {
    /// Wraps an existing client. Requests that carry proxies get a
    /// dedicated client built from default [`SessionOptions`].
    pub fn new(client: Client) -> Self {
        Self::with_options(client, SessionOptions::default())
    }

    /// Wraps an existing client that was built from `options`. Proxied
    /// clients are built from the same options.
    pub fn with_options(client: Client, options: SessionOptions) -> Self {
        Self {
            client,
            options,
            proxied: Arc::default(),
        }
    }

    /// Builds the shared client from `options`.
    pub fn from_options(options: SessionOptions) -> Result<Self, TransportError> {
        let client = build_client(&options)?;
        Ok(Self::with_options(client, options))
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// reqwest binds proxies to a client, so proxied requests cannot use the
    /// shared one. One client is kept per proxy map so retries reuse its pool.
    fn client_for(&self, request: &RequestDescriptor) -> Result<Client, TransportError> {
        if request.proxies.is_empty() {
            return Ok(self.client.clone());
        }

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(&request.proxies) {
            return Ok(client.clone());
        }

        debug!("Building dedicated client for proxies {:?}", request.proxies);
        let mut options = self.options.clone();
        options.proxies.extend(request.proxies.clone());
        let client = build_client(&options)?;
        proxied.insert(request.proxies.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(request)?;

        let mut builder = client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let response = builder.send().await?;
        let status = response.status();

        if request.stream && status == StatusCode::OK {
            return Ok(HttpResponse::streaming(response));
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body: Body::Buffered(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportErrorKind;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_send_passes_headers_and_params() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .match_header("x-api-key", "secret")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("per_page".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get(format!("{}/test", url))
            .header("x-api-key", "secret")
            .param("page", "1")
            .param("per_page", "10");

        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.is_streaming());
        assert_eq!(response.text(), r#"{"ok": true}"#);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_send_uses_request_method() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("DELETE", "/items/1")
            .with_status(204)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::new(Method::DELETE, format!("{}/items/1", url));

        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_send_streams_successful_body() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.txt")
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get(format!("{}/file.txt", url)).stream(true);

        let mut response = transport.send(&request).await.unwrap();
        assert!(response.is_streaming());
        assert_eq!(response.text(), "");

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            body.extend_from_slice(&chunk);
        }

        mock.assert_async().await;
        assert_eq!(body, b"test content");
    }

    #[tokio::test]
    async fn test_send_buffers_failed_streaming_body() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/file.txt")
            .with_status(404)
            .with_body("no such file")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get(format!("{}/file.txt", url)).stream(true);

        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.is_streaming());
        assert_eq!(response.text(), "no such file");
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_connect_error() {
        // Bind then drop a listener so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get(format!("http://{}/", addr));

        let err = transport.send(&request).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Connect);
    }

    #[tokio::test]
    async fn test_send_invalid_url_is_invalid_request() {
        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get("not a url");

        let err = transport.send(&request).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_send_unknown_proxy_scheme_is_invalid_request() {
        let transport = ReqwestTransport::new(Client::new());
        let request =
            RequestDescriptor::get("http://example.com").proxy("gopher", "http://127.0.0.1:1");

        let err = transport.send(&request).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_send_through_proxy() {
        // mockito acts as a plain HTTP forward proxy: it receives the absolute-form request
        let mut proxy = mockito::Server::new_async().await;
        let mock = proxy
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body("proxied")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get("http://upstream.invalid/resource")
            .proxy("http", proxy.url());

        let response = transport.send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.text(), "proxied");
    }

    #[tokio::test]
    async fn test_proxied_client_is_reused_across_attempts() {
        let mut proxy = mockito::Server::new_async().await;
        let mock = proxy
            .mock("GET", Matcher::Any)
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Client::new());
        let request = RequestDescriptor::get("http://upstream.invalid/resource")
            .proxy("http", proxy.url());

        transport.send(&request).await.unwrap();
        // Clones share the cache
        transport.clone().send(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(transport.proxied.lock().unwrap().len(), 1);

        let other = request.clone().proxy("https", proxy.url());
        transport.client_for(&other).unwrap();
        assert_eq!(transport.proxied.lock().unwrap().len(), 2);

        // Unproxied requests stay on the shared client
        transport
            .client_for(&RequestDescriptor::get("http://example.com"))
            .unwrap();
        assert_eq!(transport.proxied.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_proxied_client_keeps_session_options() {
        let mut proxy = mockito::Server::new_async().await;
        let mock = proxy
            .mock("GET", Matcher::Any)
            .match_header("user-agent", "corekit-proxied")
            .with_status(200)
            .create_async()
            .await;

        let options = SessionOptions {
            user_agent: Some("corekit-proxied".to_string()),
            ..Default::default()
        };
        let transport = ReqwestTransport::with_options(build_client(&options).unwrap(), options);
        let request = RequestDescriptor::get("http://upstream.invalid/resource")
            .proxy("http", proxy.url());

        transport.send(&request).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_buffered_response_chunk_and_bytes() {
        let mut response = HttpResponse::new(StatusCode::OK, "abc");
        assert_eq!(response.chunk().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(response.chunk().await.unwrap(), None);

        let response = HttpResponse::new(StatusCode::OK, "xyz");
        assert_eq!(response.bytes().await.unwrap(), b"xyz");
    }

    #[test]
    fn test_request_descriptor_builder() {
        let request = RequestDescriptor::get("http://example.com")
            .header("Accept", "text/plain")
            .proxy("https", "http://proxy:3128")
            .param("q", "rust")
            .stream(true);

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, "http://example.com");
        assert_eq!(
            request.headers,
            vec![("Accept".to_string(), "text/plain".to_string())]
        );
        assert_eq!(
            request.proxies.get("https").map(String::as_str),
            Some("http://proxy:3128")
        );
        assert_eq!(request.params, vec![("q".to_string(), "rust".to_string())]);
        assert!(request.stream);
    }
}
