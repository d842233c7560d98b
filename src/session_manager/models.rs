//! Session Manager data transfer objects.

use crate::codec::JsonCodec;
use crate::model::{impl_model_codec, Field, Model};
use serde_json::Value;
use std::collections::HashMap;

/// A named port exposed by a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0Port {
    /// Port name, e.g. `GamePort`.
    pub name: String,
    /// Port number.
    pub port: i32,
}

impl Model for V0Port {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required(
            "name",
            |m| m.name.to_json(),
            |m, v| {
                m.name = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
        Field::required(
            "port",
            |m| m.port.to_json(),
            |m, v| {
                m.port = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
    ];
}

/// A running session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0Session {
    /// Host address of the session.
    pub address: String,
    /// Ports exposed by the session.
    pub ports: Vec<V0Port>,
    /// Free-form status published by the game server.
    pub session_status: Option<HashMap<String, String>>,
}

impl Model for V0Session {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required(
            "address",
            |m| m.address.to_json(),
            |m, v| {
                m.address = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
        Field::required(
            "ports",
            |m| m.ports.to_json(),
            |m, v| {
                m.ports = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
        Field::optional(
            "session_status",
            |m| m.session_status.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.session_status = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
    ];
}

/// Body of a list-sessions response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0ListSessionsResponse {
    /// Every session for the project and session type.
    pub sessions: Vec<V0Session>,
}

impl Model for V0ListSessionsResponse {
    const FIELDS: &'static [Field<Self>] = &[Field::required(
        "sessions",
        |m| m.sessions.to_json(),
        |m, v| {
            m.sessions = JsonCodec::from_json(v)?;
            Ok(())
        },
    )];
}

/// Body of a create-session request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0CreateSessionRequestBody {
    /// Session configuration handed to the game server, usually JSON text.
    pub session_config: Option<String>,
}

impl Model for V0CreateSessionRequestBody {
    const FIELDS: &'static [Field<Self>] = &[Field::optional(
        "session_config",
        |m| m.session_config.as_ref().map(JsonCodec::to_json),
        |m, v| {
            m.session_config = Some(JsonCodec::from_json(v)?);
            Ok(())
        },
    )];
}

/// Body of a create-session response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0CreateSessionResponse {
    /// Host address of the new session.
    pub address: Option<String>,
    /// Ports exposed by the new session.
    pub ports: Option<Vec<V0Port>>,
    /// Initial session status.
    pub session_status: Option<HashMap<String, String>>,
}

impl Model for V0CreateSessionResponse {
    const FIELDS: &'static [Field<Self>] = &[
        Field::optional(
            "address",
            |m| m.address.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.address = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "ports",
            |m| m.ports.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.ports = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "session_status",
            |m| m.session_status.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.session_status = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
    ];
}

/// Error body returned by the Session Manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V0ErrorResponse {
    /// Human readable error.
    pub message: Option<String>,
    /// Identifier to quote to support.
    pub request_id: Option<String>,
}

impl Model for V0ErrorResponse {
    const FIELDS: &'static [Field<Self>] = &[
        Field::optional(
            "message",
            |m| m.message.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.message = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "request_id",
            |m| m.request_id.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.request_id = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
    ];
}

/// gRPC-style status returned by the gateway in front of the Session Manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcStatus {
    /// Status code.
    pub code: Option<i32>,
    /// Error message.
    pub message: Option<String>,
    /// Error details, kept as raw JSON.
    pub details: Option<Vec<Value>>,
}

impl Model for RpcStatus {
    const FIELDS: &'static [Field<Self>] = &[
        Field::optional(
            "code",
            |m| m.code.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.code = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "message",
            |m| m.message.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.message = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "details",
            |m| m.details.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.details = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
    ];
}

impl_model_codec!(
    V0Port,
    V0Session,
    V0ListSessionsResponse,
    V0CreateSessionRequestBody,
    V0CreateSessionResponse,
    V0ErrorResponse,
    RpcStatus,
);
