use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use reqwest::Method;
use std::io::Write;

use crate::http::{
    ReqwestTransport, RequestDescriptor, RequestExecutor, RetryPolicy, SessionOptions, Transport,
};
use crate::runtime::Runtime;

/// Everything the `request` command needs to run one call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub request: RequestDescriptor,
    pub policy: RetryPolicy,
    pub session: SessionOptions,
}

/// Runs `options.request` with retry and copies the body into `out`.
///
/// Returns the number of body bytes written.
#[tracing::instrument(skip(runtime, options, out), fields(url = %options.request.url))]
pub async fn request<R: Runtime, W: Write>(
    runtime: R,
    options: RequestOptions,
    out: &mut W,
) -> Result<u64> {
    let transport = ReqwestTransport::from_options(options.session)
        .context("Failed to build HTTP client")?;
    let executor = RequestExecutor::new(transport, runtime, options.policy);
    run(&executor, &options.request, out).await
}

pub(crate) async fn run<T: Transport, R: Runtime, W: Write>(
    executor: &RequestExecutor<T, R>,
    request: &RequestDescriptor,
    out: &mut W,
) -> Result<u64> {
    info!("{} {}", request.method, request.url);
    let mut response = executor.execute(request).await?;
    debug!(
        "Got status {} for url ({}), streaming: {}",
        response.status(),
        request.url,
        response.is_streaming()
    );

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("Failed to read response body from {}", request.url))?
    {
        out.write_all(&chunk)
            .context("Failed to write response body")?;
        written += chunk.len() as u64;
    }
    out.flush().context("Failed to flush output")?;

    debug!("Wrote {} bytes", written);
    Ok(written)
}

/// Parses an HTTP method name, case-insensitively.
pub fn parse_method(s: &str) -> Result<Method> {
    Method::from_bytes(s.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method {:?}", s))
}

/// Parses a `Name: value` header argument.
pub fn parse_header(s: &str) -> Result<(String, String)> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header {:?}, expected 'Name: value'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Invalid header {:?}, name is empty", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses a `key=value` argument. The value may be empty.
pub fn parse_key_value(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid argument {:?}, expected 'key=value'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid argument {:?}, key is empty", s));
    }
    Ok((key.to_string(), value.to_string()))
}
