pub mod conductor;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod stats;

pub use conductor::Conductor;
pub use config::ConductorConfig;
pub use engine::{ConnectionEngine, ConnectionId, EngineObserver, PeerLink, PeerState, StatsReport};
pub use error::{ConductorError, EngineError, SignalingError};
pub use events::{ConductorHandle, Notification};
pub use peer::WebRtcEngine;
pub use session::SessionState;
pub use signaling::{BusEvent, MessageBus, NegotiationMessage};
pub use stats::{MetricSnapshot, Reading};
