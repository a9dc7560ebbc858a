pub mod connection;
pub mod ice;
pub mod ops;
pub mod stats;
pub mod types;

pub use connection::{WebRtcEngine, WebRtcLink};
pub use ice::{analyze_candidates, PendingCandidates};
pub use ops::{spawn_link_worker, LinkOp};
pub use types::{IceCandidate, SdpType, ServerConfig, SessionDescription, TrackInfo, TrackKind};
