//! Сигнальные сообщения и граница с сервером сигнализации.
//!
//! Формат сообщений совместим с peerconnection_client: offer/answer как
//! `{"type":"offer","sdp":"..."}`, кандидат как
//! `{"sdpMid":"0","sdpMLineIndex":0,"candidate":"..."}`, завершение как `BYE`.

use crate::error::SignalingError;
use crate::peer::types::{IceCandidate, SdpType, SessionDescription};
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const BYE: &str = "BYE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Offer,
    Answer,
    IceCandidate,
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationMessage {
    Description(SessionDescription),
    IceCandidate(IceCandidate),
    Bye,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireMessage {
    Description(SessionDescription),
    Candidate(IceCandidate),
}

impl NegotiationMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            NegotiationMessage::Description(desc) => match desc.sdp_type {
                SdpType::Offer => MessageKind::Offer,
                SdpType::Answer => MessageKind::Answer,
            },
            NegotiationMessage::IceCandidate(_) => MessageKind::IceCandidate,
            NegotiationMessage::Bye => MessageKind::Bye,
        }
    }

    pub fn encode(&self) -> Result<String, SignalingError> {
        Ok(match self {
            NegotiationMessage::Description(desc) => serde_json::to_string(desc)?,
            NegotiationMessage::IceCandidate(candidate) => serde_json::to_string(candidate)?,
            NegotiationMessage::Bye => BYE.to_string(),
        })
    }

    pub fn decode(text: &str) -> Result<Self, SignalingError> {
        let text = text.trim();
        if text == BYE {
            return Ok(NegotiationMessage::Bye);
        }
        if !text.starts_with('{') {
            return Err(SignalingError::UnknownMessage(text.chars().take(32).collect()));
        }

        match serde_json::from_str::<WireMessage>(text)? {
            WireMessage::Description(desc) => Ok(NegotiationMessage::Description(desc)),
            WireMessage::Candidate(candidate) => Ok(NegotiationMessage::IceCandidate(candidate)),
        }
    }
}

/// События сервера сигнализации
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    SignedIn,
    SignInFailed(String),
    PeerConnected(String),
    PeerDisconnected(String),
    MessageReceived { peer_id: String, text: String },
    /// Предыдущая отправка прошла, канал снова пригоден
    MessageSent,
}

/// Внешний канал сигнализации (сам протокол не наш)
pub trait MessageBus: Send + Sync {
    fn sign_in(&self) -> Result<(), SignalingError>;

    fn sign_out(&self);

    /// Неблокирующая отправка; сообщение только передаётся транспорту
    fn send(&self, peer_id: &str, text: &str) -> Result<(), SignalingError>;
}

/// Очередь исходящих сигнальных сообщений, строго FIFO
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<String>,
}

impl OutboundQueue {
    pub fn push(&mut self, message: String) {
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Отправляет по порядку. При ошибке останавливается, сообщение
    /// остаётся в голове очереди до следующей попытки.
    pub fn drain_to(&mut self, bus: &dyn MessageBus, peer_id: &str) -> Result<usize, SignalingError> {
        let mut sent = 0;
        while let Some(front) = self.messages.front() {
            if let Err(e) = bus.send(peer_id, front) {
                warn!(
                    peer_id,
                    queued = self.messages.len(),
                    "signaling delivery failed, holding queue: {}",
                    e
                );
                return Err(e);
            }
            self.messages.pop_front();
            sent += 1;
        }
        if sent > 0 {
            debug!(peer_id, sent, "drained outbound signaling queue");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyBus {
        sent: Mutex<Vec<String>>,
        fail_next: Mutex<bool>,
    }

    impl MessageBus for FlakyBus {
        fn sign_in(&self) -> Result<(), SignalingError> {
            Ok(())
        }

        fn sign_out(&self) {}

        fn send(&self, _peer_id: &str, text: &str) -> Result<(), SignalingError> {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(SignalingError::Delivery("socket busy".into()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_decode_peerconnection_formats() {
        let offer = NegotiationMessage::decode(r#"{"type":"offer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(offer.kind(), MessageKind::Offer);

        let cand = NegotiationMessage::decode(
            r#"{"sdpMid":"0","sdpMLineIndex":0,"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host"}"#,
        )
        .unwrap();
        match cand {
            NegotiationMessage::IceCandidate(c) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert_eq!(c.sdp_mline_index, Some(0));
            }
            other => panic!("expected candidate, got {:?}", other),
        }

        assert_eq!(NegotiationMessage::decode("BYE\n").unwrap(), NegotiationMessage::Bye);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            NegotiationMessage::decode("hello"),
            Err(SignalingError::UnknownMessage(_))
        ));
        assert!(matches!(
            NegotiationMessage::decode(r#"{"type":"rollback"}"#),
            Err(SignalingError::Malformed(_))
        ));
    }

    #[test]
    fn test_answer_encodes_with_type_field() {
        let text = NegotiationMessage::Description(SessionDescription::answer("v=0"))
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["sdp"], "v=0");
    }

    #[test]
    fn test_failed_send_holds_order() {
        let bus = FlakyBus::default();
        let mut queue = OutboundQueue::default();
        queue.push("offer".into());
        queue.push("cand-1".into());
        queue.push("cand-2".into());

        *bus.fail_next.lock().unwrap() = true;
        assert!(queue.drain_to(&bus, "p1").is_err());
        assert_eq!(queue.len(), 3);
        assert!(bus.sent.lock().unwrap().is_empty());

        assert_eq!(queue.drain_to(&bus, "p1").unwrap(), 3);
        assert!(queue.is_empty());
        assert_eq!(*bus.sent.lock().unwrap(), vec!["offer", "cand-1", "cand-2"]);
    }
}
