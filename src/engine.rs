//! Границы движка соединений.
//!
//! Кондуктор видит движок только через [`ConnectionEngine`] и [`PeerLink`].
//! Колбэки движка приходят из его внутренних потоков, поэтому
//! [`EngineObserver`] только перекладывает их в очередь управления.

use crate::config::ConductorConfig;
use crate::error::EngineError;
use crate::events::ConductorEvent;
use crate::peer::types::{IceCandidate, SessionDescription, TrackInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Поколение соединения; растёт с каждой новой сессией
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Состояние соединения, как его видит движок
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Значение атрибута отчёта статистики
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            AttributeValue::Integer(v) => Some(v as f64),
            AttributeValue::Signed(v) => Some(v as f64),
            AttributeValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AttributeValue::Integer(v) => i64::try_from(v).ok(),
            AttributeValue::Signed(v) => Some(v),
            AttributeValue::Float(v) if v.fract() == 0.0 => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Один объект из набора статистики.
///
/// Ключ без значения (`Some(key) -> None`) означает, что поле есть в
/// структуре, но значения в этом цикле нет. Время в миллисекундах,
/// длительности (jitter, RTT, freeze) в секундах.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub id: String,
    pub stats_type: String,
    pub attributes: HashMap<String, Option<AttributeValue>>,
}

impl StatsReport {
    pub fn new(id: impl Into<String>, stats_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stats_type: stats_type.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), Some(value.into()));
        self
    }

    pub fn with_empty(mut self, key: &str) -> Self {
        self.attributes.insert(key.to_string(), None);
        self
    }

    /// Значение атрибута, если оно и присутствует, и заполнено
    pub fn value(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key).and_then(|v| v.as_ref())
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(AttributeValue::as_f64)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.value(key).and_then(AttributeValue::as_i64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(AttributeValue::as_str)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Integer(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Signed(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Flag(v)
    }
}

/// Событие от движка для конкретного соединения
#[derive(Debug, Clone)]
pub enum EngineEvent {
    IceCandidate(IceCandidate),
    StateChanged(PeerState),
    TrackAdded(TrackInfo),
    TrackRemoved(TrackInfo),
}

/// Обработчик колбэков движка, привязанный к одному соединению
#[derive(Debug, Clone)]
pub struct EngineObserver {
    connection: ConnectionId,
    control: mpsc::UnboundedSender<ConductorEvent>,
}

impl EngineObserver {
    pub(crate) fn new(
        connection: ConnectionId,
        control: mpsc::UnboundedSender<ConductorEvent>,
    ) -> Self {
        Self {
            connection,
            control,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn ice_candidate(&self, candidate: IceCandidate) {
        self.post(EngineEvent::IceCandidate(candidate));
    }

    pub fn connection_state(&self, state: PeerState) {
        self.post(EngineEvent::StateChanged(state));
    }

    pub fn track_added(&self, track: TrackInfo) {
        self.post(EngineEvent::TrackAdded(track));
    }

    pub fn track_removed(&self, track: TrackInfo) {
        self.post(EngineEvent::TrackRemoved(track));
    }

    fn post(&self, event: EngineEvent) {
        let connection = self.connection;
        if self
            .control
            .send(ConductorEvent::Engine { connection, event })
            .is_err()
        {
            debug!(%connection, "control stream closed, dropping engine callback");
        }
    }
}

/// Фабрика соединений
#[async_trait]
pub trait ConnectionEngine: Send + Sync {
    async fn create_connection(
        &self,
        config: &ConductorConfig,
        observer: EngineObserver,
    ) -> Result<Arc<dyn PeerLink>, EngineError>;
}

/// Одно соединение движка
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    async fn poll_stats(&self) -> Result<Vec<StatsReport>, EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}
