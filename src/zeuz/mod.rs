//! Clients for the Payload Local API.
//!
//! The Payload Local API runs next to the game server inside its payload and is
//! reached over loopback at `http://${ORCHESTRATION_PAYLOAD_API}`; it requires no
//! authentication. It starts at the same time as the game server and may not be
//! reachable at first, so its operations are usually issued with a retry policy.
//!
//! Two façades share the service: [`PayloadLocalApi`] (readiness, payload
//! details, labels) and [`SessionManagerLocalApi`] (session status and config
//! for payloads created by the Session Manager).

mod models;

pub use models::{
    PayloadResponseV0, PayloadStatusStateV0, PayloadStatusV0, PayloadV0, SetLabelRequestV0,
};

use crate::client::{ApiClient, RequestHandle};
use crate::codec::JsonCodec;
use crate::request::{retry_accessors, Request, CONTENT_TYPE_JSON};
use crate::{Response, Result, RetryPolicy};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Environment variable holding the `host:port` of the Payload Local API.
pub const PAYLOAD_API_ENV: &str = "ORCHESTRATION_PAYLOAD_API";

/// Marks the payload as ready to be reserved for a session.
#[derive(Debug, Clone, Default)]
pub struct ReadyV0Request {
    retry: Option<RetryPolicy>,
}

impl Request for ReadyV0Request {
    type Content = ();

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

    fn verb(&self) -> Method {
        Method::POST
    }

    fn compute_path(&self) -> String {
        "/api/v0/payload/ready".to_string()
    }

    retry_accessors!();
}

/// Fetches the payload's details and status.
#[derive(Debug, Clone, Default)]
pub struct GetPayloadV0Request {
    retry: Option<RetryPolicy>,
}

impl Request for GetPayloadV0Request {
    type Content = PayloadResponseV0;

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

    fn verb(&self) -> Method {
        Method::GET
    }

    fn compute_path(&self) -> String {
        "/api/v0/payload".to_string()
    }

    retry_accessors!();
}

/// Sets a label on the payload.
#[derive(Debug, Clone, Default)]
pub struct SetLabelV0Request {
    /// The label to set.
    pub body: SetLabelRequestV0,
    retry: Option<RetryPolicy>,
}

impl SetLabelV0Request {
    /// Creates the request.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            body: SetLabelRequestV0 {
                key: key.into(),
                value: value.into(),
            },
            retry: None,
        }
    }
}

impl Request for SetLabelV0Request {
    type Content = ();

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

    fn verb(&self) -> Method {
        Method::PUT
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[CONTENT_TYPE_JSON]
    }

    fn compute_path(&self) -> String {
        "/api/v0/payload/labels".to_string()
    }

    fn body(&self) -> Option<Value> {
        Some(self.body.to_json())
    }

    retry_accessors!();
}

/// Reads the session status published by this game server.
#[derive(Debug, Clone, Default)]
pub struct ApiV0SessionManagerStatusGetRequest {
    retry: Option<RetryPolicy>,
}

impl Request for ApiV0SessionManagerStatusGetRequest {
    type Content = HashMap<String, String>;

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

    fn verb(&self) -> Method {
        Method::GET
    }

    fn compute_path(&self) -> String {
        "/api/v0/session-manager/status".to_string()
    }

    retry_accessors!();
}

/// Publishes the session status (player counts, game phase, map, …) shown to
/// players browsing sessions.
#[derive(Debug, Clone, Default)]
pub struct ApiV0SessionManagerStatusPostRequest {
    /// Status key/value pairs.
    pub request_body: Option<HashMap<String, String>>,
    retry: Option<RetryPolicy>,
}

impl ApiV0SessionManagerStatusPostRequest {
    /// Creates the request from status pairs.
    pub fn new<K, V>(status: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            request_body: Some(
                status
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            retry: None,
        }
    }
}

impl Request for ApiV0SessionManagerStatusPostRequest {
    type Content = ();

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[
        (200, "Successfully updated session status"),
        (
            500,
            "Failed to updated session status. Please contact support.",
        ),
    ];

    fn verb(&self) -> Method {
        Method::POST
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[CONTENT_TYPE_JSON]
    }

    fn compute_path(&self) -> String {
        "/api/v0/session-manager/status".to_string()
    }

    fn body(&self) -> Option<Value> {
        self.request_body.as_ref().map(JsonCodec::to_json)
    }

    retry_accessors!();
}

/// Fetches the session config the Session Manager passed when creating the
/// session.
#[derive(Debug, Clone, Default)]
pub struct GetSessionConfigV0Request {
    retry: Option<RetryPolicy>,
}

impl Request for GetSessionConfigV0Request {
    type Content = Value;

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "OK")];

    fn verb(&self) -> Method {
        Method::GET
    }

    fn compute_path(&self) -> String {
        "/api/v0/session-manager/config".to_string()
    }

    retry_accessors!();
}

/// Payload operations on top of an [`ApiClient`].
#[derive(Debug, Default)]
pub struct PayloadLocalApi {
    client: ApiClient,
}

impl PayloadLocalApi {
    /// Creates the façade over a client without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client.
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Marks the payload ready.
    pub fn ready_v0<F>(&self, request: &ReadyV0Request, on_complete: F) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<()>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }

    /// Fetches the payload.
    pub fn get_payload_v0<F>(
        &self,
        request: &GetPayloadV0Request,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<PayloadResponseV0>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }

    /// Sets a payload label.
    pub fn set_label_v0<F>(&self, request: &SetLabelV0Request, on_complete: F) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<()>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }
}

impl Deref for PayloadLocalApi {
    type Target = ApiClient;

    fn deref(&self) -> &ApiClient {
        &self.client
    }
}

impl DerefMut for PayloadLocalApi {
    fn deref_mut(&mut self) -> &mut ApiClient {
        &mut self.client
    }
}

/// Session status and config operations on top of an [`ApiClient`].
#[derive(Debug, Default)]
pub struct SessionManagerLocalApi {
    client: ApiClient,
}

impl SessionManagerLocalApi {
    /// Creates the façade over a client without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client.
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Reads the published session status.
    pub fn api_v0_session_manager_status_get<F>(
        &self,
        request: &ApiV0SessionManagerStatusGetRequest,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<HashMap<String, String>>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }

    /// Publishes the session status.
    pub fn api_v0_session_manager_status_post<F>(
        &self,
        request: &ApiV0SessionManagerStatusPostRequest,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<()>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }

    /// Fetches the session config.
    pub fn get_session_config_v0<F>(
        &self,
        request: &GetSessionConfigV0Request,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<Value>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }
}

impl Deref for SessionManagerLocalApi {
    type Target = ApiClient;

    fn deref(&self) -> &ApiClient {
        &self.client
    }
}

impl DerefMut for SessionManagerLocalApi {
    fn deref_mut(&mut self) -> &mut ApiClient {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_client() -> ApiClient {
        ApiClient::builder()
            .base_url("http://127.0.0.1:9090")
            .unwrap()
            .build()
    }

    #[test]
    fn test_label_request_is_put_with_body() {
        let http = local_client()
            .build_http_request(&SetLabelV0Request::new("map", "Highrise"))
            .unwrap();
        assert_eq!(http.method, Method::PUT);
        assert_eq!(http.url.path(), "/api/v0/payload/labels");
        let sent: Value = serde_json::from_str(http.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"key": "map", "value": "Highrise"}));
    }

    #[test]
    fn test_ready_sends_empty_object() {
        let http = local_client()
            .build_http_request(&ReadyV0Request::default())
            .unwrap();
        assert_eq!(http.method, Method::POST);
        assert_eq!(http.url.as_str(), "http://127.0.0.1:9090/api/v0/payload/ready");
        assert_eq!(http.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_status_post_body_and_strings() {
        let request =
            ApiV0SessionManagerStatusPostRequest::new([("CurrentNumPlayers", "3"), ("MaxNumPlayers", "8")]);
        let http = local_client().build_http_request(&request).unwrap();
        let sent: HashMap<String, String> =
            crate::codec::from_str(http.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["MaxNumPlayers"], "8");
        assert_eq!(
            crate::request::response_string(ApiV0SessionManagerStatusPostRequest::RESPONSE_STRINGS, 500),
            Some("Failed to updated session status. Please contact support.")
        );
    }
}
