//! JSON-RPC framing at the HTTP boundary.
//!
//! Message semantics live in `rmcp`. This module only splits a POST body
//! into framed messages, answers the structural questions the front door
//! asks before a session exists, and decodes each message into rmcp's
//! client message type.

use crate::error::ProtocolError;
use rmcp::model::{ClientJsonRpcMessage, ErrorCode, ErrorData};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revisions accepted in the `MCP-Protocol-Version` header.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

pub const INITIALIZE_METHOD: &str = "initialize";

pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// One framed client message, kept as received.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound(Value);

impl Inbound {
    /// Check the envelope of one message. Anything that is not a JSON-RPC
    /// 2.0 request, notification or response is rejected here.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Some(obj) = value.as_object() else {
            return Err(invalid("message must be a JSON object"));
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(invalid("jsonrpc must be \"2.0\""));
        }
        if let Some(id) = obj.get("id") {
            if !is_request_id(id) && !(id.is_null() && obj.contains_key("error")) {
                return Err(invalid("id must be a string or an integer"));
            }
        }
        match obj.get("method") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(invalid("method must be a string")),
            None if obj.contains_key("id")
                && (obj.contains_key("result") || obj.contains_key("error")) => {}
            None => return Err(invalid("message has neither a method nor a result")),
        }
        Ok(Self(value))
    }

    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    /// The id of a request; `None` for notifications and client responses.
    pub fn request_id(&self) -> Option<&Value> {
        self.method()?;
        self.0.get("id")
    }

    pub fn is_request(&self) -> bool {
        self.request_id().is_some()
    }

    pub fn is_initialize_request(&self) -> bool {
        is_initialize_request(&self.0)
    }

    /// Decode into rmcp's client message type.
    pub fn decode(&self) -> Result<ClientJsonRpcMessage, ErrorData> {
        serde_json::from_value(self.0.clone()).map_err(|e| {
            ErrorData::new(
                ErrorCode::INVALID_REQUEST,
                format!(
                    "Unsupported message {}: {e}",
                    self.method().unwrap_or("response")
                ),
                None,
            )
        })
    }
}

fn is_request_id(id: &Value) -> bool {
    id.is_string() || id.is_i64() || id.is_u64()
}

fn invalid(message: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidMessage(message.into())
}

/// A parsed POST body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody {
    pub messages: Vec<Inbound>,
    /// The body was a JSON array; replies go back as an array.
    pub batch: bool,
}

/// Parse a POST body as one message or a non-empty batch.
pub fn parse_body(body: &[u8]) -> Result<ParsedBody, ProtocolError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProtocolError::Parse(e.to_string()))?;
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ProtocolError::EmptyBatch);
            }
            let messages = items
                .into_iter()
                .map(Inbound::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedBody {
                messages,
                batch: true,
            })
        }
        other => Ok(ParsedBody {
            messages: vec![Inbound::from_value(other)?],
            batch: false,
        }),
    }
}

/// True when `value` is a single, well-formed `initialize` request.
///
/// Pure: looks at nothing but the value itself.
pub fn is_initialize_request(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION)
        || obj.get("method").and_then(Value::as_str) != Some(INITIALIZE_METHOD)
        || !obj.get("id").is_some_and(is_request_id)
    {
        return false;
    }
    let Some(params) = obj.get("params").and_then(Value::as_object) else {
        return false;
    };
    let client = params.get("clientInfo");
    params.get("protocolVersion").is_some_and(Value::is_string)
        && params.get("capabilities").is_some_and(Value::is_object)
        && client.and_then(|c| c.get("name")).is_some_and(Value::is_string)
        && client.and_then(|c| c.get("version")).is_some_and(Value::is_string)
}

/// A JSON-RPC error object addressed to `id`, or to `null` when the failing
/// message could not be attributed to a request.
pub fn error_reply(id: Option<&Value>, error: &ErrorData) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id.cloned().unwrap_or(Value::Null),
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::JsonRpcMessage;

    fn init_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "inspector", "version": "1.0.0"}
            }
        })
    }

    #[test]
    fn frames_requests_notifications_and_responses() {
        let request = Inbound::from_value(json!({"jsonrpc": "2.0", "id": "a", "method": "ping"}))
            .expect("request");
        assert!(request.is_request());
        assert_eq!(request.request_id(), Some(&json!("a")));

        let note = Inbound::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .expect("notification");
        assert!(!note.is_request());
        assert_eq!(note.method(), Some("notifications/initialized"));

        let response = Inbound::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": {}}))
            .expect("response");
        assert!(!response.is_request());
        assert_eq!(response.request_id(), None);
    }

    #[test]
    fn rejects_bad_envelopes() {
        for bad in [
            json!("ping"),
            json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1, "method": 7}),
            json!({"jsonrpc": "2.0", "id": 1}),
        ] {
            assert!(
                matches!(Inbound::from_value(bad.clone()), Err(ProtocolError::InvalidMessage(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn decodes_into_client_messages() {
        let ping = Inbound::from_value(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}))
            .expect("frame");
        assert!(matches!(ping.decode(), Ok(JsonRpcMessage::Request(_))));

        let init = Inbound::from_value(init_body()).expect("frame");
        assert!(matches!(init.decode(), Ok(JsonRpcMessage::Request(_))));
    }

    #[test]
    fn parse_body_single_and_batch() {
        let single = parse_body(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).expect("single");
        assert!(!single.batch);
        assert_eq!(single.messages.len(), 1);

        let batch = parse_body(
            br#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"}]"#,
        )
        .expect("batch");
        assert!(batch.batch);
        assert_eq!(batch.messages.len(), 2);

        assert_eq!(parse_body(b"[]"), Err(ProtocolError::EmptyBatch));
        assert!(matches!(parse_body(b"{oops"), Err(ProtocolError::Parse(_))));
    }

    #[test]
    fn initialize_predicate() {
        assert!(is_initialize_request(&init_body()));

        let mut no_id = init_body();
        no_id.as_object_mut().expect("object").remove("id");
        assert!(!is_initialize_request(&no_id));

        let mut no_client = init_body();
        no_client["params"]
            .as_object_mut()
            .expect("params")
            .remove("clientInfo");
        assert!(!is_initialize_request(&no_client));

        let mut numeric_version = init_body();
        numeric_version["params"]["protocolVersion"] = json!(2025);
        assert!(!is_initialize_request(&numeric_version));

        assert!(!is_initialize_request(&json!([init_body()])));
        assert!(!is_initialize_request(
            &json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})
        ));
    }

    #[test]
    fn error_reply_shape() {
        let error = ErrorData::new(ErrorCode::INVALID_REQUEST, "nope", None);
        let reply = error_reply(None, &error);
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], json!(-32600));
        assert_eq!(error_reply(Some(&json!(4)), &error)["id"], json!(4));
    }

    #[test]
    fn supported_versions() {
        assert!(is_supported_version("2025-03-26"));
        assert!(is_supported_version("2024-11-05"));
        assert!(!is_supported_version("2023-01-01"));
    }
}
