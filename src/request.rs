//! The request envelope every API operation implements.
//!
//! A [`Request`] knows its verb, its resource path and its body. The
//! [`ApiClient`](crate::ApiClient) combines that with the base URL and the
//! client-wide default headers, then hands the result to
//! [`Request::setup_http_request`] for the request-specific parts.

use crate::codec::JsonCodec;
use crate::retry::RetryPolicy;
use crate::transport::HttpRequest;
use crate::{Error, Result};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

/// `application/json`.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// `multipart/form-data`.
pub const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";
/// `application/x-www-form-urlencoded`.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// The `Content-Type` sent with every JSON body.
pub const JSON_BODY_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Characters escaped in a path segment: everything outside RFC 3986 `pchar`.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encodes a value for interpolation into a single path segment.
///
/// ```
/// use ims_orchestration::request::encode_path_segment;
///
/// assert_eq!(encode_path_segment("my-project"), "my-project");
/// assert_eq!(encode_path_segment("a/../b?c"), "a%2F..%2Fb%3Fc");
/// ```
pub fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Rejects a computed path with an empty, `.` or `..` segment.
///
/// URL parsing drops dot segments (encoded or not), so a path parameter of
/// `..` would otherwise remove the segment before it.
///
/// ```
/// use ims_orchestration::request::{check_path, encode_path_segment};
///
/// assert!(check_path("/v0/projects/p1/sessions").is_ok());
/// let path = format!("/v0/projects/{}/sessions", encode_path_segment(".."));
/// assert!(check_path(&path).is_err());
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] naming the offending path.
pub fn check_path(path: &str) -> Result<()> {
    let invalid = path.split('/').skip(1).any(|segment| {
        let decoded = percent_decode_str(segment).decode_utf8_lossy();
        decoded.is_empty() || decoded == "." || decoded == ".."
    });
    if invalid {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// One API operation's request.
///
/// Implementors hold the operation's path parameters, body and optional retry
/// policy. The associated `Content` type is what a successful response body
/// parses into; `RESPONSE_STRINGS` maps documented status codes to the status
/// text the service publishes for them.
pub trait Request: Send + Sync {
    /// The typed response body.
    type Content: JsonCodec + Default + Send + 'static;

    /// Documented status codes and their descriptions.
    const RESPONSE_STRINGS: &'static [(u16, &'static str)] = &[];

    /// The HTTP verb.
    fn verb(&self) -> Method;

    /// The content types the operation accepts for its body. Empty means JSON.
    fn consumes(&self) -> &'static [&'static str] {
        &[]
    }

    /// The resource path, starting with `/`, with every path parameter encoded.
    fn compute_path(&self) -> String;

    /// The JSON body, if the operation carries one.
    fn body(&self) -> Option<Value> {
        None
    }

    /// The attached retry policy, if any.
    fn retry_policy(&self) -> Option<&RetryPolicy>;

    /// Attaches (or removes) a retry policy.
    fn set_should_retry(&mut self, policy: Option<RetryPolicy>);

    /// Writes the verb, content type and body into `request`.
    ///
    /// JSON is used when the operation accepts it or declares nothing; a request
    /// without a body sends `{}`. Form encodings are rejected for body-bearing
    /// requests rather than silently dropping the body.
    fn setup_http_request(&self, request: &mut HttpRequest) -> Result<()> {
        request.method = self.verb();

        let consumes = self.consumes();
        let accepts_json = consumes.is_empty()
            || consumes
                .iter()
                .any(|c| c.starts_with(CONTENT_TYPE_JSON));
        let body = self.body();

        if !accepts_json && body.is_some() {
            let declared = consumes.join(", ");
            tracing::error!(
                path = %self.compute_path(),
                consumes = %declared,
                "Request body cannot be encoded for the declared content types"
            );
            return Err(Error::UnsupportedContentType(declared));
        }

        let body = body.unwrap_or_else(|| Value::Object(Default::default()));
        request.set_header(CONTENT_TYPE, HeaderValue::from_static(JSON_BODY_CONTENT_TYPE));
        request.body = Some(body.to_string());
        Ok(())
    }
}

/// Implements [`Request::retry_policy`] and [`Request::set_should_retry`] for
/// request types that keep their policy in a `retry` field.
macro_rules! retry_accessors {
    () => {
        fn retry_policy(&self) -> Option<&$crate::RetryPolicy> {
            self.retry.as_ref()
        }

        fn set_should_retry(&mut self, policy: Option<$crate::RetryPolicy>) {
            self.retry = policy;
        }
    };
}

pub(crate) use retry_accessors;

/// Returns the description documented for `code`, if any.
pub(crate) fn response_string(
    table: &'static [(u16, &'static str)],
    code: u16,
) -> Option<&'static str> {
    table
        .iter()
        .find(|(documented, _)| *documented == code)
        .map(|(_, text)| *text)
}
