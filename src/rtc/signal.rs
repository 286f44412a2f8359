use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network path descriptor exchanged during media negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u32>,
    pub username_fragment: Option<String>,
}

/// Negotiation data ferried between two participants through the room's
/// signaling mailbox. Messages are transient: created by one peer,
/// consumed and deleted by the addressed peer, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate(CandidateInit),
}

impl SignalPayload {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate(_) => "candidate",
        }
    }
}

/// A signaling message addressed to a single participant.
///
/// The id identifies the stored mailbox entry; the consumer acks it after
/// processing so the server can delete it. Delivery is at-least-once, so
/// handlers must stay idempotent against a re-delivered envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub payload: SignalPayload,
    /// Milliseconds since the epoch, assigned by the sender
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_round_trips_with_type_tag() {
        let payload = SignalPayload::Offer {
            sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "offer");
        let back: SignalPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn candidate_fields_are_camel_case_and_flattened() {
        let payload = SignalPayload::Candidate(CandidateInit {
            candidate: "candidate:1 1 UDP 2122252543 10.0.0.2 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "candidate");
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        let back: SignalPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = serde_json::from_str::<SignalPayload>(r#"{"type":"renegotiate"}"#);
        assert!(err.is_err());
    }
}
