//! Client for the IMS Session Manager API.
//!
//! Players use the Session Manager to create sessions from an allocation and to
//! list the sessions of a project. Requests authenticate with a bearer header,
//! set through [`ApiClient::add_header_param`](crate::ApiClient::add_header_param).

mod models;

pub use models::{
    RpcStatus, V0CreateSessionRequestBody, V0CreateSessionResponse, V0ErrorResponse,
    V0ListSessionsResponse, V0Port, V0Session,
};

use crate::client::{ApiClient, RequestHandle};
use crate::codec::JsonCodec;
use crate::request::{encode_path_segment, retry_accessors, Request, CONTENT_TYPE_JSON};
use crate::{Response, Result, RetryPolicy};
use http::Method;
use serde_json::Value;
use std::ops::{Deref, DerefMut};

fn sessions_path(project_id: &str, session_type: &str) -> String {
    format!(
        "/v0/projects/{}/session-types/{}/sessions",
        encode_path_segment(project_id),
        encode_path_segment(session_type)
    )
}

/// Creates a session from an allocation matching `session_type` in `project_id`.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionV0Request {
    /// Project to use.
    pub project_id: String,
    /// Allocation selector.
    pub session_type: String,
    /// Session configuration to apply.
    pub body: V0CreateSessionRequestBody,
    retry: Option<RetryPolicy>,
}

impl CreateSessionV0Request {
    /// Creates the request.
    pub fn new(
        project_id: impl Into<String>,
        session_type: impl Into<String>,
        body: V0CreateSessionRequestBody,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            session_type: session_type.into(),
            body,
            retry: None,
        }
    }
}

impl Request for CreateSessionV0Request {
    type Content = V0CreateSessionResponse;

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "A successful response.")];

    fn verb(&self) -> Method {
        Method::POST
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[CONTENT_TYPE_JSON]
    }

    fn compute_path(&self) -> String {
        sessions_path(&self.project_id, &self.session_type)
    }

    fn body(&self) -> Option<Value> {
        Some(self.body.to_json())
    }

    retry_accessors!();
}

/// Lists every session from allocations matching `session_type` in `project_id`.
#[derive(Debug, Clone, Default)]
pub struct ListSessionsV0Request {
    /// Project to use.
    pub project_id: String,
    /// Allocation selector.
    pub session_type: String,
    retry: Option<RetryPolicy>,
}

impl ListSessionsV0Request {
    /// Creates the request.
    pub fn new(project_id: impl Into<String>, session_type: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            session_type: session_type.into(),
            retry: None,
        }
    }
}

impl Request for ListSessionsV0Request {
    type Content = V0ListSessionsResponse;

    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[(200, "A successful response.")];

    fn verb(&self) -> Method {
        Method::GET
    }

    fn compute_path(&self) -> String {
        sessions_path(&self.project_id, &self.session_type)
    }

    retry_accessors!();
}

/// Session Manager operations on top of an [`ApiClient`].
///
/// Dereferences to the client for URL, header, retry manager and tick access.
///
/// # Examples
///
/// ```no_run
/// use ims_orchestration::session_manager::{ListSessionsV0Request, SessionManagerV0Api};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ims_orchestration::Error> {
/// let mut api = SessionManagerV0Api::new();
/// api.set_url("https://session-manager.example.com")?;
/// api.add_header_param("Authorization", "Bearer playfab/ticket")?;
///
/// api.list_sessions_v0(&ListSessionsV0Request::new("my-project", "match"), |response| {
///     for session in &response.content.sessions {
///         println!("{}", session.address);
///     }
/// })?;
/// api.tick_until_idle(Duration::from_millis(16)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionManagerV0Api {
    client: ApiClient,
}

impl SessionManagerV0Api {
    /// Creates the façade over a client without a base URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing client.
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Creates a session.
    pub fn create_session_v0<F>(
        &self,
        request: &CreateSessionV0Request,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<V0CreateSessionResponse>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }

    /// Lists sessions.
    pub fn list_sessions_v0<F>(
        &self,
        request: &ListSessionsV0Request,
        on_complete: F,
    ) -> Result<RequestHandle>
    where
        F: FnOnce(&Response<V0ListSessionsResponse>) + Send + 'static,
    {
        self.client.execute(request, on_complete)
    }
}

impl Deref for SessionManagerV0Api {
    type Target = ApiClient;

    fn deref(&self) -> &ApiClient {
        &self.client
    }
}

impl DerefMut for SessionManagerV0Api {
    fn deref_mut(&mut self) -> &mut ApiClient {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_paths_encode_parameters() {
        let request = ListSessionsV0Request::new("proj 1", "team/deathmatch");
        assert_eq!(
            request.compute_path(),
            "/v0/projects/proj%201/session-types/team%2Fdeathmatch/sessions"
        );
    }

    #[test]
    fn test_dot_path_parameters_rejected() {
        let client = ApiClient::builder()
            .base_url("http://sm.example")
            .unwrap()
            .build();
        for (project, session_type) in [("..", "match"), (".", "match"), ("", "match"), ("proj", "..")] {
            let request = ListSessionsV0Request::new(project, session_type);
            let result = client.build_http_request(&request);
            assert!(
                matches!(result, Err(Error::InvalidPath(_))),
                "{project:?}/{session_type:?} should be rejected"
            );
        }

        let http = client
            .build_http_request(&ListSessionsV0Request::new("..proj", "match"))
            .unwrap();
        assert_eq!(http.url.path(), "/v0/projects/..proj/session-types/match/sessions");
    }

    #[test]
    fn test_create_body_is_json() {
        let request = CreateSessionV0Request::new(
            "proj",
            "match",
            V0CreateSessionRequestBody {
                session_config: Some(r#"{"MaxNumPlayers":8,"BotsCount":2}"#.to_string()),
            },
        );
        let client = ApiClient::builder()
            .base_url("https://sm.example.com")
            .unwrap()
            .build();
        let http = client.build_http_request(&request).unwrap();

        assert_eq!(http.method, Method::POST);
        assert_eq!(
            http.url.as_str(),
            "https://sm.example.com/v0/projects/proj/session-types/match/sessions"
        );
        let sent: Value = serde_json::from_str(http.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            sent["session_config"],
            r#"{"MaxNumPlayers":8,"BotsCount":2}"#
        );
    }
}
