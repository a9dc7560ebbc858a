use crate::signaling::OutboundQueue;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingSignIn,
    Connecting,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    /// Идёт согласование или сессия уже установлена
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::HaveLocalOffer
                | SessionState::HaveRemoteOffer
                | SessionState::Connected
        )
    }
}

/// Текущая (единственная) сессия с пиром
#[derive(Debug)]
pub struct Session {
    pub peer_id: Option<String>,
    pub state: SessionState,
    pub is_caller: bool,
    pub pending_outbound: OutboundQueue,
}

impl Session {
    pub fn new() -> Self {
        Self {
            peer_id: None,
            state: SessionState::Idle,
            is_caller: false,
            pending_outbound: OutboundQueue::default(),
        }
    }

    pub fn begin(&mut self, peer_id: &str, is_caller: bool) {
        self.peer_id = Some(peer_id.to_string());
        self.is_caller = is_caller;
        self.pending_outbound.clear();
    }

    pub fn is_with(&self, peer_id: &str) -> bool {
        self.peer_id.as_deref() == Some(peer_id)
    }

    /// Сбрасывает всё, кроме состояния
    pub fn reset(&mut self) {
        self.peer_id = None;
        self.is_caller = false;
        self.pending_outbound.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
