use crate::engine::ConnectionId;
use crate::session::SessionState;
use thiserror::Error;

/// Ошибки движка соединений
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create connection: {0}")]
    CreateConnection(String),

    #[error("session description failed: {0}")]
    Description(String),

    #[error("ice candidate rejected: {0}")]
    Candidate(String),

    #[error("stats request failed: {0}")]
    Stats(String),

    #[error("connection is closed")]
    Closed,

    #[error("peer connection failed")]
    ConnectionFailed,

    #[error("webrtc: {0}")]
    Internal(#[from] webrtc::Error),
}

/// Ошибки сигнального канала
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("message delivery failed: {0}")]
    Delivery(String),

    #[error("malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown signaling message: {0}")]
    UnknownMessage(String),
}

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("unexpected {event} in state {state:?}")]
    UnexpectedMessage {
        state: SessionState,
        event: &'static str,
    },

    #[error("stale event for connection {connection}")]
    StaleSessionEvent { connection: ConnectionId },

    #[error("engine fatal error: {0}")]
    EngineFatal(#[from] EngineError),

    #[error("signaling delivery failure: {0}")]
    SignalingDelivery(#[from] SignalingError),

    #[error("stats cycle failed: {0}")]
    StatsCycle(EngineError),

    #[error("conductor control stream is closed")]
    ControlStreamClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = ConductorError> = std::result::Result<T, E>;
