//! Control frames and close codes on the client side of the relay.
//!
//! Transcript payloads are forwarded verbatim and never reshaped here; the
//! only JSON the relay itself produces are the two control frames below.

use serde::{Deserialize, Serialize};

/// Token invalid, expired, or malformed.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Upstream refused the configured parameters during the handshake.
pub const CLOSE_UPSTREAM_FORBIDDEN: u16 = 4403;
/// Unexpected upstream failure (handshake or mid-session).
pub const CLOSE_UPSTREAM_ERROR: u16 = 1011;
/// Normal end of stream, upstream closed first.
pub const CLOSE_NORMAL: u16 = 1000;

pub const REASON_UNAUTHORIZED: &str = "unauthorized";
pub const REASON_UPSTREAM_FORBIDDEN: &str = "upstream_forbidden";
pub const REASON_UPSTREAM_ERROR: &str = "upstream_error";
pub const REASON_UPSTREAM_CLOSED: &str = "upstream_closed";

/// Relay → client control frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Upstream handshake succeeded; audio may flow.
    Ready,
    /// Upstream closed normally; no more transcripts will arrive.
    Ended,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        serde_json::to_string(&self).expect("control frames always serialize")
    }
}

/// The slice of an upstream payload the relay is willing to look at: an
/// optional request-correlation id, surfaced in logs for support. Everything
/// else passes through untouched.
#[derive(Debug, Deserialize)]
struct UpstreamEnvelope {
    request_id: Option<String>,
    metadata: Option<UpstreamMetadata>,
}

#[derive(Debug, Deserialize)]
struct UpstreamMetadata {
    request_id: Option<String>,
}

/// Extract a request id from an upstream text frame, if one is present at
/// the top level or under `metadata`. Returns `None` for payloads without
/// one; the caller decides what to do with unparseable JSON.
pub fn peek_request_id(payload: &str) -> Option<String> {
    let envelope: UpstreamEnvelope = serde_json::from_str(payload).ok()?;
    envelope
        .request_id
        .or(envelope.metadata.and_then(|m| m.request_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frames_serialize_to_type_tagged_json() {
        assert_eq!(ControlMessage::Ready.to_json(), r#"{"type":"ready"}"#);
        assert_eq!(ControlMessage::Ended.to_json(), r#"{"type":"ended"}"#);
    }

    #[test]
    fn request_id_at_top_level() {
        let payload = r#"{"type":"Metadata","request_id":"req-123"}"#;
        assert_eq!(peek_request_id(payload), Some("req-123".to_string()));
    }

    #[test]
    fn request_id_under_metadata() {
        let payload = r#"{
            "type": "Results",
            "metadata": {"request_id": "req-456"},
            "channel": {"alternatives": [{"transcript": "hello"}]}
        }"#;
        assert_eq!(peek_request_id(payload), Some("req-456".to_string()));
    }

    #[test]
    fn payload_without_request_id() {
        assert_eq!(peek_request_id(r#"{"type":"Results"}"#), None);
        assert_eq!(peek_request_id("not json"), None);
    }
}
