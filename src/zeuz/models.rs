//! Payload Local API data transfer objects.

use crate::codec::{JsonCodec, ParseError};
use crate::model::{impl_model_codec, Field, Model};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a payload.
///
/// Serialized as its variant name. Strings naming no variant fail to parse;
/// callers see a parse error on the response rather than a silent `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PayloadStatusStateV0 {
    /// The state is not known.
    #[default]
    Unknown,
    /// Being scheduled, not yet started.
    Creating,
    /// Scheduled and starting; waiting for the payload to mark itself ready.
    Starting,
    /// Available to be reserved for a session. Players should not connect yet.
    Ready,
    /// Reserved for a session; players can connect.
    Reserved,
    /// Stopping and being removed.
    Shutdown,
    /// Something went wrong with the payload.
    Error,
    /// Failing to report itself as healthy.
    Unhealthy,
}

impl PayloadStatusStateV0 {
    const VARIANTS: [(PayloadStatusStateV0, &'static str); 8] = [
        (Self::Unknown, "Unknown"),
        (Self::Creating, "Creating"),
        (Self::Starting, "Starting"),
        (Self::Ready, "Ready"),
        (Self::Reserved, "Reserved"),
        (Self::Shutdown, "Shutdown"),
        (Self::Error, "Error"),
        (Self::Unhealthy, "Unhealthy"),
    ];

    /// The wire name of the state.
    pub fn as_str(&self) -> &'static str {
        Self::VARIANTS
            .iter()
            .find(|(state, _)| state == self)
            .map_or("Unknown", |(_, name)| *name)
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(state, _)| *state)
    }

    /// Returns `true` if players may not join a payload in this state.
    pub fn rejects_players(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Unhealthy | Self::Error)
    }
}

impl fmt::Display for PayloadStatusStateV0 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JsonCodec for PayloadStatusStateV0 {
    fn to_json(&self) -> Value {
        Value::String(self.as_str().to_string())
    }

    fn from_json(value: &Value) -> Result<Self, ParseError> {
        let name = String::from_json(value)?;
        Self::from_name(&name).ok_or(ParseError::UnknownVariant(name))
    }
}

/// Status block of a payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadStatusV0 {
    /// Current lifecycle state.
    pub state: PayloadStatusStateV0,
}

impl Model for PayloadStatusV0 {
    const FIELDS: &'static [Field<Self>] = &[Field::required(
        "state",
        |m| m.state.to_json(),
        |m, v| {
            m.state = JsonCodec::from_json(v)?;
            Ok(())
        },
    )];
}

/// A payload as described by the Payload Local API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadV0 {
    /// Payload identifier.
    pub payload_id: Option<String>,
    /// Allocation the payload belongs to.
    pub allocation_id: Option<String>,
    /// Labels set on the payload.
    pub labels: Option<HashMap<String, String>>,
    /// Current status.
    pub status: PayloadStatusV0,
}

impl Model for PayloadV0 {
    const FIELDS: &'static [Field<Self>] = &[
        Field::optional(
            "payload_id",
            |m| m.payload_id.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.payload_id = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "allocation_id",
            |m| m.allocation_id.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.allocation_id = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::optional(
            "labels",
            |m| m.labels.as_ref().map(JsonCodec::to_json),
            |m, v| {
                m.labels = Some(JsonCodec::from_json(v)?);
                Ok(())
            },
        ),
        Field::required(
            "status",
            |m| m.status.to_json(),
            |m, v| {
                m.status = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
    ];
}

/// Body of a get-payload response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadResponseV0 {
    /// The payload.
    pub result: PayloadV0,
}

impl Model for PayloadResponseV0 {
    const FIELDS: &'static [Field<Self>] = &[Field::required(
        "result",
        |m| m.result.to_json(),
        |m, v| {
            m.result = JsonCodec::from_json(v)?;
            Ok(())
        },
    )];
}

/// Body of a set-label request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetLabelRequestV0 {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

impl Model for SetLabelRequestV0 {
    const FIELDS: &'static [Field<Self>] = &[
        Field::required(
            "key",
            |m| m.key.to_json(),
            |m, v| {
                m.key = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
        Field::required(
            "value",
            |m| m.value.to_json(),
            |m, v| {
                m.value = JsonCodec::from_json(v)?;
                Ok(())
            },
        ),
    ];
}

impl_model_codec!(PayloadStatusV0, PayloadV0, PayloadResponseV0, SetLabelRequestV0);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_names() {
        for (state, name) in PayloadStatusStateV0::VARIANTS {
            assert_eq!(state.to_json(), json!(name));
            assert_eq!(PayloadStatusStateV0::from_json(&json!(name)).unwrap(), state);
        }
    }

    #[test]
    fn test_unknown_state_fails() {
        assert_eq!(
            PayloadStatusStateV0::from_json(&json!("Preparing")).unwrap_err(),
            ParseError::UnknownVariant("Preparing".to_string())
        );
        assert!(PayloadStatusStateV0::from_json(&json!(3)).is_err());
    }

    #[test]
    fn test_payload_response_parses() {
        let response = PayloadResponseV0::from_json(&json!({
            "result": {
                "payload_id": "p-1",
                "allocation_id": "a-1",
                "labels": {"map": "Highrise"},
                "status": {"state": "Reserved"}
            }
        }))
        .unwrap();

        assert_eq!(response.result.status.state, PayloadStatusStateV0::Reserved);
        assert_eq!(response.result.labels.unwrap()["map"], "Highrise");
    }

    #[test]
    fn test_minimal_payload_round_trips() {
        let payload = PayloadV0 {
            status: PayloadStatusV0 {
                state: PayloadStatusStateV0::Starting,
            },
            ..Default::default()
        };
        assert_eq!(payload.to_json(), json!({"status": {"state": "Starting"}}));
        assert_eq!(PayloadV0::from_json(&payload.to_json()).unwrap(), payload);
    }

    fn assert_round_trips<T: JsonCodec + PartialEq + std::fmt::Debug>(values: &[T]) {
        for value in values {
            assert_eq!(&T::from_json(&value.to_json()).unwrap(), value);
        }
    }

    fn status(state: PayloadStatusStateV0) -> PayloadStatusV0 {
        PayloadStatusV0 { state }
    }

    fn full_payload() -> PayloadV0 {
        PayloadV0 {
            payload_id: Some("p-1".to_string()),
            allocation_id: Some("a-1".to_string()),
            labels: Some(HashMap::from([("map".to_string(), "Highrise".to_string())])),
            status: status(PayloadStatusStateV0::Reserved),
        }
    }

    #[test]
    fn test_status_round_trips() {
        let statuses: Vec<PayloadStatusV0> = PayloadStatusStateV0::VARIANTS
            .iter()
            .map(|(state, _)| status(*state))
            .collect();
        assert_round_trips(&statuses);
    }

    #[test]
    fn test_payload_round_trips() {
        assert_round_trips(&[
            PayloadV0::default(),
            full_payload(),
            PayloadV0 {
                payload_id: Some("p-2".to_string()),
                allocation_id: None,
                labels: Some(HashMap::new()),
                status: status(PayloadStatusStateV0::Unhealthy),
            },
        ]);
    }

    #[test]
    fn test_payload_response_round_trips() {
        assert_round_trips(&[
            PayloadResponseV0::default(),
            PayloadResponseV0 {
                result: full_payload(),
            },
            PayloadResponseV0 {
                result: PayloadV0 {
                    labels: None,
                    ..full_payload()
                },
            },
        ]);
    }

    #[test]
    fn test_label_request_round_trips() {
        assert_round_trips(&[
            SetLabelRequestV0::default(),
            SetLabelRequestV0 {
                key: "map".to_string(),
                value: "Highrise".to_string(),
            },
            SetLabelRequestV0 {
                key: "phase".to_string(),
                value: String::new(),
            },
        ]);
    }

    #[test]
    fn test_label_requires_both_fields() {
        let err = SetLabelRequestV0::from_json(&json!({"key": 1})).unwrap_err();
        match err {
            ParseError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected two failures, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_players() {
        assert!(PayloadStatusStateV0::Error.rejects_players());
        assert!(PayloadStatusStateV0::Shutdown.rejects_players());
        assert!(!PayloadStatusStateV0::Ready.rejects_players());
        assert!(!PayloadStatusStateV0::Reserved.rejects_players());
    }
}
