//! Wire-level requests, responses and the transport that carries them.
//!
//! The API client and the retry manager only deal in [`HttpRequest`] and
//! [`HttpResponse`]; the [`Transport`] trait is the single seam where bytes
//! actually move. [`ReqwestTransport`] is the production implementation.

use crate::error::TransportError;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

/// A fully built HTTP request, ready to be sent (and re-sent).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP verb.
    pub method: Method,
    /// The absolute URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Creates a `GET` request without headers or body.
    pub fn new(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Returns a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Replaces the URL's host (and port, when given) with `domain`, which is
    /// `host` or `host:port`.
    pub(crate) fn with_domain(&self, domain: &str) -> Result<HttpRequest, url::ParseError> {
        let target = Url::parse(&format!("{}://{}", self.url.scheme(), domain))?;
        let mut url = self.url.clone();
        url.set_host(target.host_str())?;
        // Only fails for URLs that cannot carry a port, which `target` just proved this one can.
        let _ = url.set_port(target.port());
        Ok(HttpRequest {
            url,
            ..self.clone()
        })
    }
}

/// A response as received from the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The raw body text.
    pub body: String,
    /// The URL that produced the response (reflects fallback domains).
    pub url: Url,
}

impl HttpResponse {
    /// Returns a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the `Content-Type` header, or an empty string.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// The result of one exchange.
pub type HttpResult = Result<HttpResponse, TransportError>;

/// The final outcome of a dispatched request, across all of its attempts.
#[derive(Debug)]
pub struct HttpOutcome {
    /// The last attempt's result.
    pub result: HttpResult,
    /// Number of attempts made, including the first.
    pub attempts: u32,
    /// Time from the first attempt until completion.
    pub latency: Duration,
}

/// Consumes the outcome of a dispatched request. Called exactly once.
pub type Completion = Box<dyn FnOnce(HttpOutcome) + Send + 'static>;

/// A boxed, sendable transport future.
pub type TransportFuture = Pin<Box<dyn Future<Output = HttpResult> + Send + 'static>>;

/// Carries an [`HttpRequest`] to a server.
///
/// Implementations must not block: `execute` returns a future that the
/// dispatcher runs on a tokio task.
pub trait Transport: Send + Sync {
    /// Sends the request and resolves with the response or the reason none arrived.
    fn execute(&self, request: HttpRequest) -> TransportFuture;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Creates a transport with an optional per-attempt timeout.
    pub fn new(timeout: Option<Duration>) -> crate::Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            crate::Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client, timeout })
    }

    /// Wraps an existing client.
    pub fn from_client(client: reqwest::Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> TransportFuture {
        let url = request.url.clone();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Box::pin(async move {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await?;
            Ok::<_, TransportError>(HttpResponse {
                status,
                headers,
                body,
                url,
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_domain_swaps_host_and_port() {
        let request = HttpRequest::new(Url::parse("http://primary:8080/api/v0/payload?x=1").unwrap());

        let moved = request.with_domain("backup.local:9090").unwrap();
        assert_eq!(moved.url.as_str(), "http://backup.local:9090/api/v0/payload?x=1");

        let default_port = request.with_domain("backup.local").unwrap();
        assert_eq!(default_port.url.as_str(), "http://backup.local/api/v0/payload?x=1");
    }

    #[test]
    fn test_content_type_defaults_to_empty() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: String::new(),
            url: Url::parse("http://localhost/").unwrap(),
        };
        assert_eq!(response.content_type(), "");
    }
}
