//! Wire message envelope
//!
//! Every frame on the wire is a JSON object with a `type` discriminant and
//! arbitrary payload fields. Three types are reserved and interpreted by the
//! connection layer itself: `auth` (outbound, carries the credential),
//! `auth_response` (inbound, `{success, error?}`) and `heartbeat`
//! (bidirectional liveness).

use crate::traits::{DuraSockError, Frame, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved type for the outbound credential message
pub const TYPE_AUTH: &str = "auth";
/// Reserved type for the server's reply to an `auth` message
pub const TYPE_AUTH_RESPONSE: &str = "auth_response";
/// Reserved type for liveness frames in both directions
pub const TYPE_HEARTBEAT: &str = "heartbeat";

/// A structured wire message: `{"type": ..., ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The discriminant used for routing and reserved-type handling
    #[serde(rename = "type")]
    pub kind: String,
    /// All remaining fields of the JSON object
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope with the given type and no payload fields
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field (chainable)
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Look up a payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Build the outbound `auth` message carrying a credential
    pub fn auth(token: &str) -> Self {
        Envelope::new(TYPE_AUTH).with_field("token", token)
    }

    /// Build an outbound `heartbeat` frame
    pub fn heartbeat() -> Self {
        Envelope::new(TYPE_HEARTBEAT)
    }

    pub fn is_auth_response(&self) -> bool {
        self.kind == TYPE_AUTH_RESPONSE
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == TYPE_HEARTBEAT
    }

    /// Interpret this envelope as an `auth_response`
    ///
    /// A missing or non-boolean `success` field counts as a failure.
    pub fn auth_outcome(&self) -> AuthOutcome {
        let success = self
            .field("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let error = self
            .field("error")
            .and_then(Value::as_str)
            .map(str::to_owned);
        AuthOutcome { success, error }
    }

    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<Frame> {
        let text = serde_json::to_string(self)
            .map_err(|e| DuraSockError::Malformed(e.to_string()))?;
        Ok(Frame::Text(text))
    }

    /// Decode from a raw frame (text or binary JSON)
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        match frame {
            Frame::Text(text) => serde_json::from_str(text)
                .map_err(|e| DuraSockError::Malformed(e.to_string())),
            Frame::Binary(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| DuraSockError::Malformed(e.to_string())),
        }
    }
}

/// Parsed result of an `auth_response` envelope
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_payload() {
        let env = Envelope::new("quote")
            .with_field("symbol", "BTC")
            .with_field("price", 42);
        let frame = env.to_frame().unwrap();
        let back = Envelope::from_frame(&frame).unwrap();
        assert_eq!(back.kind, "quote");
        assert_eq!(back.field("symbol").unwrap(), "BTC");
    }

    #[test]
    fn test_auth_outcome_defaults_to_failure() {
        let env = Envelope::new(TYPE_AUTH_RESPONSE);
        assert!(!env.auth_outcome().success);

        let env = Envelope::new(TYPE_AUTH_RESPONSE)
            .with_field("success", false)
            .with_field("error", "bad token");
        let outcome = env.auth_outcome();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("bad token"));
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let err = Envelope::from_frame(&Frame::Text("not json".into()));
        assert!(err.is_err());
    }
}
