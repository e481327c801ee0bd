use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub type ConnectionId = Uuid;

pub const JOIN_ACK_MESSAGE: &str = "Joined room successfully!";
pub const ROOM_REQUIRED_MESSAGE: &str = "Room name is required for join.";
pub const NOT_IN_ROOM_MESSAGE: &str = "You must join a room before sending WebRTC signals.";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid signaling message: {0}")]
    Json(#[from] serde_json::Error),
}

/// The signal kinds the relay forwards without looking inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    Ice,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::Ice => "ice",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub room: Option<String>,
}

/// Messages a peer sends to the server.
///
/// Encoded as `{"event": "<name>", "data": <payload>}`. A join whose `data`
/// is missing or null parses as `Join(None)`. Some clients name candidates
/// `ice`; those are relayed back out under `ice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join(Option<JoinRequest>),
    Offer(Value),
    Answer(Value),
    Candidate(Value),
    Ice(Value),
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn join(room: impl Into<String>) -> Self {
        ClientMessage::Join(Some(JoinRequest {
            room: Some(room.into()),
        }))
    }
}

/// Messages the server sends to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    JoinAck {
        room: String,
        message: String,
        members: usize,
    },
    Error {
        message: String,
    },
    Offer(Value),
    Answer(Value),
    Candidate(Value),
    Ice(Value),
    PeerLeft {
        id: ConnectionId,
    },
}

impl ServerMessage {
    pub fn join_ack(room: impl Into<String>, members: usize) -> Self {
        ServerMessage::JoinAck {
            room: room.into(),
            message: JOIN_ACK_MESSAGE.to_string(),
            members,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn signal(kind: SignalKind, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ServerMessage::Offer(payload),
            SignalKind::Answer => ServerMessage::Answer(payload),
            SignalKind::Candidate => ServerMessage::Candidate(payload),
            SignalKind::Ice => ServerMessage::Ice(payload),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
