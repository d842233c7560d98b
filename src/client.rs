//! The API client shared by every service façade.
//!
//! An [`ApiClient`] holds a base URL and client-wide default headers, turns
//! [`Request`]s into wire requests, dispatches them (through its
//! [`RetryManager`] when the request carries a [`RetryPolicy`](crate::RetryPolicy))
//! and hands each completion a typed [`Response`].
//!
//! Dispatch never blocks. Completions run from [`ApiClient::tick`], which the
//! host calls periodically from its update loop, or from
//! [`ApiClient::tick_until_idle`] in async code.

use crate::dispatch::{HttpDispatcher, RequestId};
use crate::request::{check_path, Request};
use crate::retry_manager::{RetryHandle, RetryManager};
use crate::transport::{Completion, HttpRequest, ReqwestTransport, Transport};
use crate::{Error, Response, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

/// Identifies a dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestHandle {
    /// Dispatched once, without a retry policy.
    Direct(RequestId),
    /// Tracked by a retry manager.
    Retry(RetryHandle),
}

/// An HTTP API client with client-wide default headers and optional retries.
///
/// # Examples
///
/// ```no_run
/// use ims_orchestration::ApiClient;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), ims_orchestration::Error> {
/// let mut client = ApiClient::builder()
///     .base_url("https://session-manager.example.com")?
///     .timeout(Duration::from_secs(30))
///     .build();
///
/// client.add_header_param("Authorization", "Bearer playfab/ticket")?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    url: Option<Url>,
    default_headers: HeaderMap,
    transport: OnceLock<Arc<dyn Transport>>,
    timeout: Option<Duration>,
    dispatcher: HttpDispatcher,
    retry_manager: OnceLock<Arc<RetryManager>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| Error::InvalidHeader(format!("invalid header name `{}`: {}", name, e)))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::try_from(value)
        .map_err(|e| Error::InvalidHeader(format!("invalid value for header `{}`: {}", name, e)))
}

impl ApiClient {
    /// Creates a client without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// The base URL, if set.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Sets the base URL for subsequent operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid; the previous URL is kept.
    pub fn set_url(&mut self, url: impl AsRef<str>) -> Result<()> {
        self.url = Some(Url::parse(url.as_ref())?);
        Ok(())
    }

    /// Sets a default header sent with every subsequent operation, replacing
    /// any value already set under that name. In-flight operations keep the
    /// headers they were dispatched with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the name or value is invalid.
    pub fn add_header_param(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let name_str = name.as_ref();
        let header = header_name(name_str)?;
        let value = header_value(name_str, value.as_ref())?;
        self.default_headers.insert(header, value);
        Ok(())
    }

    /// Removes every default header.
    pub fn clear_header_params(&mut self) {
        self.default_headers.clear();
    }

    /// The default headers.
    pub fn header_params(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Routes subsequent retryable operations through `manager`, which may be
    /// shared with other clients.
    pub fn set_retry_manager(&mut self, manager: Arc<RetryManager>) {
        self.retry_manager = OnceLock::from(manager);
    }

    /// The retry manager, created with default settings on first use if none
    /// was supplied.
    pub fn retry_manager(&self) -> Arc<RetryManager> {
        self.retry_manager
            .get_or_init(|| {
                tracing::debug!("Creating default retry manager");
                Arc::new(RetryManager::new())
            })
            .clone()
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.transport.get() {
            return Ok(transport.clone());
        }
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(self.timeout)?);
        Ok(self.transport.get_or_init(|| transport).clone())
    }

    /// Builds the wire request for `request` without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL is set, the computed path holds an empty
    /// or dot segment, the computed URL is invalid, or the request body cannot
    /// be encoded.
    pub fn build_http_request<R: Request>(&self, request: &R) -> Result<HttpRequest> {
        let Some(base) = &self.url else {
            tracing::error!(
                path = %request.compute_path(),
                "API client has no base URL; call set_url before issuing requests"
            );
            return Err(Error::ConfigurationError(
                "API client base URL is not set".to_string(),
            ));
        };

        let path = request.compute_path();
        if let Err(e) = check_path(&path) {
            tracing::error!(path = %path, "Refusing request with an empty or dot path segment");
            return Err(e);
        }
        let url = Url::parse(&format!("{}{}", base.as_str().trim_end_matches('/'), path))?;

        let mut http_request = HttpRequest {
            method: request.verb(),
            url,
            headers: self.default_headers.clone(),
            body: None,
        };
        request.setup_http_request(&mut http_request)?;
        Ok(http_request)
    }

    /// Dispatches `request` and calls `on_complete` exactly once, from a later
    /// [`tick`](Self::tick), with the typed response.
    ///
    /// # Errors
    ///
    /// When an error is returned nothing was sent and `on_complete` is never
    /// called: the client has no base URL, the request cannot be encoded, or no
    /// tokio runtime is available.
    pub fn execute<R, F>(&self, request: &R, on_complete: F) -> Result<RequestHandle>
    where
        R: Request,
        F: FnOnce(&Response<R::Content>) + Send + 'static,
    {
        let http_request = self.build_http_request(request)?;
        let transport = self.transport()?;

        let response_strings = R::RESPONSE_STRINGS;
        let completion: Completion = Box::new(move |outcome| {
            let response = Response::<R::Content>::from_outcome(outcome, response_strings);
            on_complete(&response);
        });

        match request.retry_policy() {
            Some(policy) => self
                .retry_manager()
                .process_request(transport, http_request, policy, completion)
                .map(RequestHandle::Retry),
            None => self
                .dispatcher
                .dispatch(&transport, http_request, completion)
                .map(RequestHandle::Direct),
        }
    }

    /// Delivers finished operations to their completions and advances retries.
    /// Returns the number of completions invoked.
    pub fn tick(&self) -> usize {
        let direct = self.dispatcher.tick();
        let retried = self.retry_manager.get().map_or(0, |manager| manager.tick());
        direct + retried
    }

    /// Number of operations not yet completed, including those tracked by the
    /// retry manager.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight() + self.retry_manager.get().map_or(0, |m| m.in_flight())
    }

    /// Ticks every `interval` until no operation is in flight.
    pub async fn tick_until_idle(&self, interval: Duration) {
        loop {
            self.tick();
            if self.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Builder for [`ApiClient`].
///
/// # Examples
///
/// ```
/// use ims_orchestration::{ApiClient, RetryManager};
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), ims_orchestration::Error> {
/// let shared = Arc::new(RetryManager::new());
/// let client = ApiClient::builder()
///     .base_url("http://127.0.0.1:9090")?
///     .default_header("User-Agent", "ims-orchestration/0.1")?
///     .retry_manager(shared.clone())
///     .build();
///
/// assert!(Arc::ptr_eq(&client.retry_manager(), &shared));
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct ApiClientBuilder {
    url: Option<Url>,
    default_headers: HeaderMap,
    transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
    retry_manager: Option<Arc<RetryManager>>,
}

impl ApiClientBuilder {
    /// Creates a builder with no base URL, no headers and the reqwest transport.
    pub fn new() -> Self {
        Self {
            url: None,
            default_headers: HeaderMap::new(),
            transport: None,
            timeout: None,
            retry_manager: None,
        }
    }

    /// Sets the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name_str = name.as_ref();
        let header = header_name(name_str)?;
        let value = header_value(name_str, value.as_ref())?;
        self.default_headers.insert(header, value);
        Ok(self)
    }

    /// Uses a custom transport instead of reqwest.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a per-attempt timeout for the reqwest transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shares a retry manager instead of creating one on first use.
    pub fn retry_manager(mut self, manager: Arc<RetryManager>) -> Self {
        self.retry_manager = Some(manager);
        self
    }

    /// Builds the client.
    pub fn build(self) -> ApiClient {
        ApiClient {
            url: self.url,
            default_headers: self.default_headers,
            transport: self.transport.map(OnceLock::from).unwrap_or_default(),
            timeout: self.timeout,
            dispatcher: HttpDispatcher::new(),
            retry_manager: self.retry_manager.map(OnceLock::from).unwrap_or_default(),
        }
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::encode_path_segment;
    use crate::transport::testing::ScriptedTransport;
    use crate::RetryPolicy;
    use http::Method;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Status {
        project: String,
        retry: Option<RetryPolicy>,
    }

    impl Request for Status {
        type Content = HashMap<String, String>;

        const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

        fn verb(&self) -> Method {
            Method::GET
        }

        fn compute_path(&self) -> String {
            format!("/v0/projects/{}/status", encode_path_segment(&self.project))
        }

        fn retry_policy(&self) -> Option<&RetryPolicy> {
            self.retry.as_ref()
        }

        fn set_should_retry(&mut self, policy: Option<RetryPolicy>) {
            self.retry = policy;
        }
    }

    fn client(transport: &ScriptedTransport, base: &str) -> ApiClient {
        ApiClient::builder()
            .base_url(base)
            .unwrap()
            .transport(Arc::new(transport.clone()))
            .build()
    }

    #[tokio::test]
    async fn test_url_is_base_plus_path() {
        let transport = ScriptedTransport::default();
        let client = client(&transport, "http://localhost:9090/");
        let request = Status {
            project: "my project".to_string(),
            ..Default::default()
        };

        client.execute(&request, |_| {}).unwrap();
        client.tick_until_idle(Duration::from_millis(2)).await;

        let sent = transport.requests();
        assert_eq!(
            sent[0].url.as_str(),
            "http://localhost:9090/v0/projects/my%20project/status"
        );
        assert_eq!(sent[0].body.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_clear_then_add_header_yields_one_value() {
        let transport = ScriptedTransport::default();
        let mut client = ApiClient::builder()
            .base_url("http://localhost")
            .unwrap()
            .default_header("K", "old")
            .unwrap()
            .default_header("X-Stale", "1")
            .unwrap()
            .transport(Arc::new(transport.clone()))
            .build();

        client.clear_header_params();
        client.add_header_param("K", "V").unwrap();
        client.add_header_param("K", "V").unwrap();

        client.execute(&Status::default(), |_| {}).unwrap();
        client.tick_until_idle(Duration::from_millis(2)).await;

        let headers = &transport.requests()[0].headers;
        let values: Vec<_> = headers.get_all("k").iter().collect();
        assert_eq!(values, [&HeaderValue::from_static("V")]);
        assert!(headers.get("x-stale").is_none());
    }

    #[test]
    fn test_missing_base_url_fails_fast() {
        let client = ApiClient::new();
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();

        let result = client.execute(&Status::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(matches!(result, Err(Error::ConfigurationError(_))));
        assert_eq!(client.tick(), 0);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_typed_response_reaches_callback() {
        let transport = ScriptedTransport::new([Ok((200, r#"{"GamePhase":"Lobby"}"#))]);
        let client = client(&transport, "http://localhost");
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        let handle = client
            .execute(&Status::default(), move |response| {
                *sink.lock().unwrap() = Some((
                    response.status_is_ok(),
                    response.response_string().to_string(),
                    response.content.get("GamePhase").cloned(),
                ));
            })
            .unwrap();
        assert!(matches!(handle, RequestHandle::Direct(_)));

        client.tick_until_idle(Duration::from_millis(2)).await;
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some((true, "OK".to_string(), Some("Lobby".to_string())))
        );
    }

    #[tokio::test]
    async fn test_retry_policy_routes_through_manager() {
        let transport = ScriptedTransport::new([Ok((503, "{}")), Ok((200, "{}"))]);
        let manager = Arc::new(
            RetryManager::builder()
                .backoff(crate::Backoff::Immediate)
                .build(),
        );
        let client = ApiClient::builder()
            .base_url("http://localhost")
            .unwrap()
            .transport(Arc::new(transport.clone()))
            .retry_manager(manager.clone())
            .build();

        let mut request = Status::default();
        request.set_should_retry(Some(
            RetryPolicy::builder().retry_response_codes([503]).build(),
        ));

        let attempts = Arc::new(AtomicUsize::new(0));
        let sink = attempts.clone();
        let handle = client
            .execute(&request, move |response| {
                sink.store(response.attempts() as usize, Ordering::SeqCst);
            })
            .unwrap();
        assert!(matches!(handle, RequestHandle::Retry(_)));
        assert_eq!(manager.in_flight(), 1);

        client.tick_until_idle(Duration::from_millis(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut client = ApiClient::new();
        assert!(matches!(
            client.add_header_param("bad header", "v"),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            client.add_header_param("K", "line\nbreak"),
            Err(Error::InvalidHeader(_))
        ));
        assert!(client.header_params().is_empty());
    }
}
