use crate::engine::{ConnectionId, EngineEvent};
use crate::error::{ConductorError, EngineError};
use crate::peer::types::{SdpType, SessionDescription, TrackInfo};
use crate::session::SessionState;
use crate::signaling::BusEvent;
use crate::stats::MetricSnapshot;
use tokio::sync::mpsc;
use tracing::debug;

/// Команды от UI / хоста
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    SignIn,
    Connect(String),
    Disconnect,
    Close,
    Shutdown,
}

/// Результат асинхронной операции движка
#[derive(Debug)]
pub enum Completion {
    LocalDescriptionReady(SessionDescription),
    LocalDescriptionApplied(SdpType),
    RemoteDescriptionApplied(SdpType),
    CandidateApplied,
    CandidateRejected(EngineError),
    Failed {
        op: &'static str,
        error: EngineError,
    },
}

/// Всё, что попадает в очередь управления кондуктора
#[derive(Debug)]
pub enum ConductorEvent {
    Command(UiCommand),
    Bus(BusEvent),
    Engine {
        connection: ConnectionId,
        event: EngineEvent,
    },
    Completion {
        connection: ConnectionId,
        completion: Completion,
    },
    Metrics {
        connection: ConnectionId,
        snapshots: Vec<MetricSnapshot>,
    },
}

/// Уведомления для UI
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SessionStateChanged(SessionState),
    MetricsUpdated(MetricSnapshot),
    TrackAdded(TrackInfo),
    TrackRemoved(TrackInfo),
    SignInFailed(String),
    SessionFailed(String),
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("UI receiver dropped, notification discarded");
        }
    }

    pub fn emit_state(&self, state: SessionState) {
        self.emit(Notification::SessionStateChanged(state));
    }

    pub fn emit_failure(&self, reason: impl Into<String>) {
        self.emit(Notification::SessionFailed(reason.into()));
    }
}

/// Клонируемая ручка для UI и сервера сигнализации
#[derive(Debug, Clone)]
pub struct ConductorHandle {
    control: mpsc::UnboundedSender<ConductorEvent>,
}

impl ConductorHandle {
    pub(crate) fn new(control: mpsc::UnboundedSender<ConductorEvent>) -> Self {
        Self { control }
    }

    pub fn sign_in(&self) -> Result<(), ConductorError> {
        self.command(UiCommand::SignIn)
    }

    pub fn connect(&self, peer_id: impl Into<String>) -> Result<(), ConductorError> {
        self.command(UiCommand::Connect(peer_id.into()))
    }

    pub fn disconnect(&self) -> Result<(), ConductorError> {
        self.command(UiCommand::Disconnect)
    }

    pub fn close(&self) -> Result<(), ConductorError> {
        self.command(UiCommand::Close)
    }

    pub fn shutdown(&self) -> Result<(), ConductorError> {
        self.command(UiCommand::Shutdown)
    }

    /// Точка входа для реализации [`crate::signaling::MessageBus`]
    pub fn deliver(&self, event: BusEvent) -> Result<(), ConductorError> {
        self.post(ConductorEvent::Bus(event))
    }

    fn command(&self, command: UiCommand) -> Result<(), ConductorError> {
        self.post(ConductorEvent::Command(command))
    }

    fn post(&self, event: ConductorEvent) -> Result<(), ConductorError> {
        self.control
            .send(event)
            .map_err(|_| ConductorError::ControlStreamClosed)
    }
}
