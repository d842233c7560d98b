//! Typed responses handed to operation completions.
//!
//! A [`Response`] keeps the parsed body alongside everything the caller may need
//! to judge the outcome: whether the transport delivered a response at all, the
//! status code and its documented description, the raw response (headers and
//! body), and how many attempts and how long the request took.

use crate::codec::{JsonCodec, ParseError};
use crate::error::TransportError;
use crate::request::response_string;
use crate::transport::{HttpOutcome, HttpResponse};
use http::StatusCode;
use std::time::Duration;

/// The result of one API operation.
///
/// [`is_successful`](Response::is_successful) only says that the transport
/// completed. A `404` or `500` with a body is still successful in that sense;
/// check [`status`](Response::status) (or [`status_is_ok`](Response::status_is_ok))
/// and [`content`](Response::content) as well.
///
/// # Examples
///
/// ```no_run
/// use ims_orchestration::zeuz::{GetPayloadV0Request, PayloadLocalApi};
///
/// # fn example(api: &PayloadLocalApi) -> Result<(), ims_orchestration::Error> {
/// api.get_payload_v0(&GetPayloadV0Request::default(), |response| {
///     if response.is_successful() && response.status_is_ok() {
///         println!("Payload state: {:?}", response.content.result.status.state);
///     } else {
///         println!("{} {}", response.status(), response.response_string());
///     }
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<C> {
    /// The parsed response body. `Default` when nothing was parsed.
    pub content: C,
    successful: bool,
    status: StatusCode,
    response_string: String,
    response_strings: &'static [(u16, &'static str)],
    http_response: Option<HttpResponse>,
    transport_error: Option<TransportError>,
    parse_error: Option<ParseError>,
    attempts: u32,
    latency: Duration,
}

impl<C: JsonCodec + Default> Response<C> {
    /// Builds the typed response for a finished request.
    pub(crate) fn from_outcome(
        outcome: HttpOutcome,
        response_strings: &'static [(u16, &'static str)],
    ) -> Self {
        let mut response = Response {
            content: C::default(),
            successful: false,
            status: StatusCode::REQUEST_TIMEOUT,
            response_string: String::new(),
            response_strings,
            http_response: None,
            transport_error: None,
            parse_error: None,
            attempts: outcome.attempts,
            latency: outcome.latency,
        };

        match outcome.result {
            Ok(http_response) => {
                response.successful = true;
                response.set_http_response_code(http_response.status);
                response.parse_body(&http_response);

                tracing::info!(
                    status = http_response.status.as_u16(),
                    latency_ms = outcome.latency.as_millis(),
                    attempts = outcome.attempts,
                    "Received HTTP response"
                );
                if http_response.status.is_server_error() {
                    tracing::warn!(
                        status = http_response.status.as_u16(),
                        response = %http_response.body,
                        "Server error (5xx)"
                    );
                }
                response.http_response = Some(http_response);
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    attempts = outcome.attempts,
                    "Request failed without a response"
                );
                response.status = StatusCode::REQUEST_TIMEOUT;
                response.response_string = "Request Timeout".to_string();
                response.transport_error = Some(error);
            }
        }
        response
    }

    fn parse_body(&mut self, http_response: &HttpResponse) {
        let content_type = http_response.content_type();
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "" => {}
            "application/json" | "text/json" => {
                // An empty JSON body must still satisfy the content type.
                let parsed = if http_response.body.trim().is_empty() {
                    C::from_json(&serde_json::Value::Null)
                } else {
                    crate::codec::from_str::<C>(&http_response.body)
                };
                match parsed {
                    Ok(content) => self.content = content,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            raw_response = %http_response.body,
                            "Failed to deserialize response"
                        );
                        self.parse_error = Some(e);
                    }
                }
            }
            "text/plain" => self.response_string = http_response.body.clone(),
            other => {
                tracing::error!(content_type = %other, "Unsupported response content type");
                self.parse_error = Some(ParseError::TypeMismatch {
                    expected: "a JSON or text body",
                    found: "another content type",
                });
            }
        }
    }

    /// Parses the raw body as another type, typically an error DTO.
    ///
    /// Returns `None` when there was no response or its body is not JSON of
    /// that shape.
    pub fn error_content<E: JsonCodec>(&self) -> Option<E> {
        let body = &self.http_response.as_ref()?.body;
        crate::codec::from_str(body).ok()
    }
}

impl<C> Response<C> {
    /// Sets the status code and, if the operation documents it, its description.
    /// Undocumented codes leave the description unchanged.
    pub fn set_http_response_code(&mut self, status: StatusCode) {
        self.status = status;
        if let Some(text) = response_string(self.response_strings, status.as_u16()) {
            self.response_string = text.to_string();
        }
    }

    /// Returns `true` if the transport delivered a response, whatever its status.
    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// The status code; `408 Request Timeout` when no response arrived.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` for a delivered `2xx` response.
    pub fn status_is_ok(&self) -> bool {
        self.successful && self.status.is_success()
    }

    /// The documented description of the status code, or a `text/plain` body.
    pub fn response_string(&self) -> &str {
        &self.response_string
    }

    /// The raw response, if one arrived.
    pub fn http_response(&self) -> Option<&HttpResponse> {
        self.http_response.as_ref()
    }

    /// Why no response arrived, if none did.
    pub fn transport_error(&self) -> Option<&TransportError> {
        self.transport_error.as_ref()
    }

    /// Why the body could not be parsed into `content`, if it could not.
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse_error.as_ref()
    }

    /// Number of attempts made, including retries.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Time from the first attempt until completion.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns a response header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.http_response.as_ref()?.header(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zeuz::PayloadResponseV0;
    use http::header::CONTENT_TYPE;
    use http::{HeaderMap, HeaderValue};
    use std::collections::HashMap;
    use url::Url;

    const TABLE: &[(u16, &str)] = &[
        (200, "Successfully updated session status"),
        (500, "Failed to updated session status. Please contact support."),
    ];

    fn outcome(status: u16, content_type: &'static str, body: &str) -> HttpOutcome {
        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        HttpOutcome {
            result: Ok(HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers,
                body: body.to_string(),
                url: Url::parse("http://localhost/api/v0/session-manager/status").unwrap(),
            }),
            attempts: 1,
            latency: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_json_body_is_parsed() {
        let response: Response<HashMap<String, String>> = Response::from_outcome(
            outcome(200, "application/json; charset=utf-8", r#"{"GamePhase":"Lobby"}"#),
            TABLE,
        );
        assert!(response.is_successful());
        assert!(response.status_is_ok());
        assert_eq!(response.response_string(), "Successfully updated session status");
        assert_eq!(response.content["GamePhase"], "Lobby");
        assert!(response.parse_error().is_none());
    }

    #[test]
    fn test_error_status_is_still_successful() {
        let response: Response<()> =
            Response::from_outcome(outcome(500, "application/json", "{}"), TABLE);
        assert!(response.is_successful());
        assert!(!response.status_is_ok());
        assert_eq!(
            response.response_string(),
            "Failed to updated session status. Please contact support."
        );
    }

    #[test]
    fn test_undocumented_code_keeps_prior_string() {
        let mut response: Response<()> =
            Response::from_outcome(outcome(200, "", ""), TABLE);
        response.set_http_response_code(StatusCode::IM_A_TEAPOT);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.response_string(), "Successfully updated session status");
    }

    #[test]
    fn test_transport_failure() {
        let response: Response<()> = Response::from_outcome(
            HttpOutcome {
                result: Err(TransportError::Connect("refused".to_string())),
                attempts: 3,
                latency: Duration::from_millis(40),
            },
            TABLE,
        );
        assert!(!response.is_successful());
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.response_string(), "Request Timeout");
        assert!(response.transport_error().unwrap().is_connect());
        assert!(response.http_response().is_none());
        assert!(response.was_retried());
    }

    #[test]
    fn test_parse_failure_keeps_success_flag() {
        let response: Response<HashMap<String, String>> =
            Response::from_outcome(outcome(200, "application/json", r#"{"a": 1}"#), TABLE);
        assert!(response.is_successful());
        assert!(response.parse_error().is_some());
        assert!(response.content.is_empty());
    }

    #[test]
    fn test_empty_json_body_must_match_content() {
        let payload: Response<PayloadResponseV0> =
            Response::from_outcome(outcome(200, "application/json", ""), TABLE);
        assert!(payload.is_successful());
        assert!(payload.status_is_ok());
        assert!(matches!(
            payload.parse_error(),
            Some(ParseError::TypeMismatch { .. })
        ));
        assert_eq!(payload.content, PayloadResponseV0::default());

        let unit: Response<()> =
            Response::from_outcome(outcome(200, "application/json", "  "), TABLE);
        assert!(unit.parse_error().is_none());
    }

    #[test]
    fn test_plain_text_and_unknown_types() {
        let text: Response<()> = Response::from_outcome(outcome(200, "text/plain", "pong"), &[]);
        assert_eq!(text.response_string(), "pong");
        assert!(text.parse_error().is_none());

        let html: Response<()> =
            Response::from_outcome(outcome(200, "text/html", "<html/>"), &[]);
        assert!(html.is_successful());
        assert!(html.parse_error().is_some());
    }

    #[test]
    fn test_error_content_reads_raw_body() {
        let response: Response<()> = Response::from_outcome(
            outcome(404, "application/json", r#"{"message":"no such project"}"#),
            &[],
        );
        let body: HashMap<String, String> = response.error_content().unwrap();
        assert_eq!(body["message"], "no such project");
        assert_eq!(
            response.header("content-type"),
            Some("application/json")
        );
    }
}
