//! Конечный автомат сессии.
//!
//! Все события (команды UI, сигнализация, колбэки движка, результаты
//! операций, метрики) проходят через одну очередь и обрабатываются по
//! одному. Колбэки и результаты помечены [`ConnectionId`]; всё, что
//! относится к уже разобранному соединению, отбрасывается.

use crate::config::ConductorConfig;
use crate::engine::{
    ConnectionEngine, ConnectionId, EngineEvent, EngineObserver, PeerLink, PeerState,
};
use crate::error::{ConductorError, EngineError, Result};
use crate::events::{Completion, ConductorEvent, ConductorHandle, Notification, Notifier, UiCommand};
use crate::peer::ice::{analyze_candidates, PendingCandidates};
use crate::peer::ops::{spawn_link_worker, LinkOp};
use crate::peer::types::{IceCandidate, SdpType, SessionDescription};
use crate::session::{Session, SessionState};
use crate::signaling::{BusEvent, MessageBus, NegotiationMessage, BYE};
use crate::stats::{MetricSnapshot, SamplerHandle, StatsSampler};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Живое соединение текущей сессии
struct ActiveConnection {
    id: ConnectionId,
    link: Arc<dyn PeerLink>,
    ops: mpsc::UnboundedSender<LinkOp>,
    worker: JoinHandle<()>,
    candidates: PendingCandidates,
    local_candidates: Vec<IceCandidate>,
}

pub struct Conductor {
    config: ConductorConfig,
    engine: Arc<dyn ConnectionEngine>,
    bus: Arc<dyn MessageBus>,
    notifier: Notifier,
    session: Session,
    active: Option<ActiveConnection>,
    sampler: Option<SamplerHandle>,
    next_connection: u64,
    control_tx: mpsc::UnboundedSender<ConductorEvent>,
    control_rx: mpsc::UnboundedReceiver<ConductorEvent>,
    signed_in: bool,
    running: bool,
}

impl Conductor {
    pub fn new(
        config: ConductorConfig,
        engine: Arc<dyn ConnectionEngine>,
        bus: Arc<dyn MessageBus>,
    ) -> (Self, ConductorHandle, mpsc::UnboundedReceiver<Notification>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let handle = ConductorHandle::new(control_tx.clone());

        let conductor = Self {
            config,
            engine,
            bus,
            notifier: Notifier::new(ui_tx),
            session: Session::new(),
            active: None,
            sampler: None,
            next_connection: 0,
            control_tx,
            control_rx,
            signed_in: false,
            running: true,
        };
        (conductor, handle, ui_rx)
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_some()
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub fn active_connection(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("conductor started");
        while self.step().await {}
        info!("conductor stopped");
    }

    /// Обрабатывает одно событие; `false`, когда цикл завершён
    pub async fn step(&mut self) -> bool {
        if !self.running {
            return false;
        }
        match self.control_rx.recv().await {
            Some(event) => {
                self.dispatch(event).await;
                self.running
            }
            None => false,
        }
    }

    async fn dispatch(&mut self, event: ConductorEvent) {
        let result = match event {
            ConductorEvent::Command(command) => self.on_command(command).await,
            ConductorEvent::Bus(event) => self.on_bus(event).await,
            ConductorEvent::Engine { connection, event } => self
                .ensure_live(connection)
                .and_then(|_| self.on_engine(event)),
            ConductorEvent::Completion {
                connection,
                completion,
            } => self
                .ensure_live(connection)
                .and_then(|_| self.on_completion(completion)),
            ConductorEvent::Metrics {
                connection,
                snapshots,
            } => self
                .ensure_live(connection)
                .map(|_| self.on_metrics(snapshots)),
        };
        if let Err(e) = result {
            self.absorb(e);
        }
    }

    fn ensure_live(&self, connection: ConnectionId) -> Result<()> {
        match &self.active {
            Some(active) if active.id == connection => Ok(()),
            _ => Err(ConductorError::StaleSessionEvent { connection }),
        }
    }

    fn absorb(&mut self, err: ConductorError) {
        match err {
            ConductorError::UnexpectedMessage { .. } => {
                debug!("Discarding: {}", err);
            }
            ConductorError::StaleSessionEvent { .. } => {
                trace!("Discarding: {}", err);
            }
            ConductorError::SignalingDelivery(_) => {
                // очередь сохранена, повтор по следующему сигналу связности
                warn!("{}", err);
            }
            ConductorError::StatsCycle(_) => {
                warn!("{}", err);
            }
            ConductorError::EngineFatal(e) => {
                error!("Engine fatal error: {}", e);
                self.teardown(Some(e.to_string()));
            }
            ConductorError::ControlStreamClosed => {
                error!("{}", err);
                self.running = false;
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        let prev = self.session.state;
        if prev == next {
            return;
        }
        info!("Session state: {:?} -> {:?}", prev, next);
        self.session.state = next;
        self.notifier.emit_state(next);
    }

    fn unexpected(&self, event: &'static str) -> ConductorError {
        ConductorError::UnexpectedMessage {
            state: self.session.state,
            event,
        }
    }

    // ---------- команды UI ----------

    async fn on_command(&mut self, command: UiCommand) -> Result<()> {
        debug!("UI command: {:?}", command);
        match command {
            UiCommand::SignIn => self.sign_in(),
            UiCommand::Connect(peer_id) => {
                if self.session.state != SessionState::Idle {
                    return Err(self.unexpected("connect request"));
                }
                self.start_session(&peer_id, true).await
            }
            UiCommand::Disconnect => {
                self.hang_up();
                Ok(())
            }
            UiCommand::Close => {
                self.close();
                Ok(())
            }
            UiCommand::Shutdown => {
                self.close();
                self.running = false;
                Ok(())
            }
        }
    }

    fn sign_in(&mut self) -> Result<()> {
        if self.session.state != SessionState::Idle || self.signed_in {
            return Err(self.unexpected("sign-in request"));
        }
        match self.bus.sign_in() {
            Ok(()) => {
                self.set_state(SessionState::AwaitingSignIn);
                Ok(())
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.notifier.emit(Notification::SignInFailed(e.to_string()));
                Ok(())
            }
        }
    }

    /// Завершение сессии по инициативе пользователя; BYE отправляется без гарантий
    fn hang_up(&mut self) {
        if !self.session.state.is_negotiating() {
            return;
        }
        if let Some(peer_id) = self.session.peer_id.clone() {
            if let Err(e) = self.bus.send(&peer_id, BYE) {
                debug!(peer_id, "BYE not delivered: {}", e);
            }
        }
        self.teardown(None);
    }

    fn close(&mut self) {
        self.hang_up();
        if self.signed_in || self.session.state == SessionState::AwaitingSignIn {
            info!("Signing out");
            self.bus.sign_out();
            self.signed_in = false;
            self.set_state(SessionState::Idle);
        }
    }

    // ---------- сигнализация ----------

    async fn on_bus(&mut self, event: BusEvent) -> Result<()> {
        match event {
            BusEvent::SignedIn => {
                info!("Signed in to the signaling server");
                self.signed_in = true;
                if self.session.state == SessionState::AwaitingSignIn {
                    self.set_state(SessionState::Idle);
                }
                self.flush_outbound()
            }
            BusEvent::SignInFailed(reason) => {
                warn!("Sign-in failed: {}", reason);
                self.signed_in = false;
                if self.session.state == SessionState::AwaitingSignIn {
                    self.set_state(SessionState::Idle);
                }
                self.notifier.emit(Notification::SignInFailed(reason));
                Ok(())
            }
            BusEvent::PeerConnected(peer_id) => {
                debug!(peer_id, "peer connected");
                if self.config.autocall
                    && self.signed_in
                    && self.session.state == SessionState::Idle
                {
                    info!(peer_id, "Autocall");
                    return self.start_session(&peer_id, true).await;
                }
                self.flush_outbound()
            }
            BusEvent::PeerDisconnected(peer_id) => {
                debug!(peer_id, "peer disconnected");
                if self.session.state.is_negotiating() && self.session.is_with(&peer_id) {
                    self.teardown(None);
                }
                Ok(())
            }
            BusEvent::MessageReceived { peer_id, text } => self.on_message(peer_id, &text).await,
            BusEvent::MessageSent => self.flush_outbound(),
        }
    }

    async fn on_message(&mut self, peer_id: String, text: &str) -> Result<()> {
        let message = match NegotiationMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer_id, "Ignoring signaling message: {}", e);
                return Ok(());
            }
        };

        let busy = self.session.state != SessionState::Idle;
        if busy && !self.session.is_with(&peer_id) {
            return Err(self.unexpected("message from another peer"));
        }

        match message {
            NegotiationMessage::Description(desc) => self.on_remote_description(&peer_id, desc).await,
            NegotiationMessage::IceCandidate(candidate) => self.on_remote_candidate(candidate),
            NegotiationMessage::Bye => {
                if self.session.state.is_negotiating() {
                    info!(peer_id, "Remote hang-up");
                    self.teardown(None);
                }
                Ok(())
            }
        }
    }

    async fn on_remote_description(&mut self, peer_id: &str, desc: SessionDescription) -> Result<()> {
        match (self.session.state, desc.sdp_type) {
            (SessionState::Idle, SdpType::Offer) => {
                self.start_session(peer_id, false).await?;
                self.accept_offer(desc)
            }
            (SessionState::Connecting, SdpType::Offer) => self.accept_offer(desc),
            (SessionState::HaveLocalOffer, SdpType::Answer) => {
                self.submit(LinkOp::SetRemote(desc))?;
                self.enter_connected();
                Ok(())
            }
            (_, SdpType::Offer) => Err(self.unexpected("offer")),
            (_, SdpType::Answer) => Err(self.unexpected("answer")),
        }
    }

    fn accept_offer(&mut self, offer: SessionDescription) -> Result<()> {
        self.submit(LinkOp::SetRemote(offer))?;
        self.submit(LinkOp::CreateAnswer)?;
        self.set_state(SessionState::HaveRemoteOffer);
        Ok(())
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if !self.session.state.is_negotiating() || self.active.is_none() {
            return Err(self.unexpected("ice candidate"));
        }
        let admitted = self
            .active
            .as_mut()
            .and_then(|active| active.candidates.admit(candidate));
        match admitted {
            Some(candidate) => self.submit(LinkOp::AddCandidate(candidate)),
            None => Ok(()),
        }
    }

    // ---------- движок ----------

    fn on_engine(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::IceCandidate(candidate) => {
                if let Some(active) = self.active.as_mut() {
                    active.local_candidates.push(candidate.clone());
                }
                self.send_message(&NegotiationMessage::IceCandidate(candidate))?;
                self.flush_outbound()
            }
            EngineEvent::StateChanged(state) => self.on_peer_state(state),
            EngineEvent::TrackAdded(track) => {
                info!(track = %track.id, "remote track added");
                self.notifier.emit(Notification::TrackAdded(track));
                Ok(())
            }
            EngineEvent::TrackRemoved(track) => {
                info!(track = %track.id, "remote track removed");
                self.notifier.emit(Notification::TrackRemoved(track));
                Ok(())
            }
        }
    }

    fn on_peer_state(&mut self, state: PeerState) -> Result<()> {
        match state {
            PeerState::Connected => {
                if let Some(active) = &self.active {
                    info!(connection = %active.id, "peer connection established");
                    analyze_candidates(&active.local_candidates);
                }
                Ok(())
            }
            PeerState::Disconnected => {
                warn!("peer connection interrupted");
                Ok(())
            }
            PeerState::Failed => Err(EngineError::ConnectionFailed.into()),
            PeerState::Closed => {
                if self.session.state.is_negotiating() {
                    self.teardown(None);
                }
                Ok(())
            }
            PeerState::New | PeerState::Connecting => Ok(()),
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Result<()> {
        match completion {
            Completion::LocalDescriptionReady(desc) => self.on_local_description(desc),
            Completion::LocalDescriptionApplied(sdp_type) => {
                trace!("local {:?} applied", sdp_type);
                Ok(())
            }
            Completion::RemoteDescriptionApplied(sdp_type) => {
                trace!("remote {:?} applied", sdp_type);
                let pending = match self.active.as_mut() {
                    Some(active) => active.candidates.release(),
                    None => Vec::new(),
                };
                for candidate in pending {
                    self.submit(LinkOp::AddCandidate(candidate))?;
                }
                Ok(())
            }
            Completion::CandidateApplied => Ok(()),
            Completion::CandidateRejected(e) => {
                warn!("Remote candidate rejected: {}", e);
                Ok(())
            }
            Completion::Failed { op, error } => {
                error!(op, "engine operation failed");
                Err(error.into())
            }
        }
    }

    fn on_local_description(&mut self, desc: SessionDescription) -> Result<()> {
        let next = match (self.session.state, desc.sdp_type) {
            (SessionState::Connecting, SdpType::Offer) => SessionState::HaveLocalOffer,
            (SessionState::HaveRemoteOffer, SdpType::Answer) => SessionState::Connected,
            (_, SdpType::Offer) => return Err(self.unexpected("local offer")),
            (_, SdpType::Answer) => return Err(self.unexpected("local answer")),
        };

        self.send_message(&NegotiationMessage::Description(desc.clone()))?;
        self.submit(LinkOp::SetLocal(desc))?;
        if next == SessionState::Connected {
            self.enter_connected();
        } else {
            self.set_state(next);
        }
        self.flush_outbound()
    }

    fn on_metrics(&mut self, snapshots: Vec<MetricSnapshot>) {
        if self.session.state != SessionState::Connected {
            return;
        }
        for snapshot in snapshots {
            self.notifier.emit(Notification::MetricsUpdated(snapshot));
        }
    }

    // ---------- жизненный цикл сессии ----------

    async fn start_session(&mut self, peer_id: &str, is_caller: bool) -> Result<()> {
        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);
        info!(peer_id, is_caller, connection = %id, "Starting session");

        self.session.begin(peer_id, is_caller);
        self.set_state(SessionState::Connecting);

        let observer = EngineObserver::new(id, self.control_tx.clone());
        let link = self.engine.create_connection(&self.config, observer).await?;
        let (ops, worker) = spawn_link_worker(id, link.clone(), self.control_tx.clone());

        self.active = Some(ActiveConnection {
            id,
            link,
            ops,
            worker,
            candidates: PendingCandidates::new(),
            local_candidates: Vec::new(),
        });

        if is_caller {
            self.submit(LinkOp::CreateOffer)?;
        }
        Ok(())
    }

    fn enter_connected(&mut self) {
        self.set_state(SessionState::Connected);
        if let Some(active) = &self.active {
            self.sampler = Some(StatsSampler::start(
                active.id,
                active.link.clone(),
                self.config.stats_interval(),
                self.control_tx.clone(),
            ));
        }
    }

    /// Разбирает сессию. С `failure` сессия считается аварийной: UI получает
    /// причину, а `Closed` пропускается.
    fn teardown(&mut self, failure: Option<String>) {
        if !self.session.state.is_negotiating() && self.active.is_none() {
            return;
        }
        self.set_state(SessionState::Closing);

        if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }

        if let Some(active) = self.active.take() {
            active.worker.abort();
            let connection = active.id;
            let link = active.link;
            tokio::spawn(async move {
                if let Err(e) = link.close().await {
                    debug!(%connection, "close failed: {}", e);
                }
            });
        }

        let dropped = self.session.pending_outbound.len();
        if dropped > 0 {
            debug!(dropped, "outbound queue cleared");
        }
        self.session.reset();

        match failure {
            Some(reason) => {
                self.notifier.emit_failure(reason);
            }
            None => self.set_state(SessionState::Closed),
        }
        self.set_state(SessionState::Idle);
    }

    fn submit(&self, op: LinkOp) -> Result<()> {
        let active = self.active.as_ref().ok_or(EngineError::Closed)?;
        active.ops.send(op).map_err(|_| EngineError::Closed)?;
        Ok(())
    }

    fn send_message(&mut self, message: &NegotiationMessage) -> Result<()> {
        let text = message.encode()?;
        self.session.pending_outbound.push(text);
        Ok(())
    }

    fn flush_outbound(&mut self) -> Result<()> {
        let Some(peer_id) = self.session.peer_id.clone() else {
            return Ok(());
        };
        self.session
            .pending_outbound
            .drain_to(self.bus.as_ref(), &peer_id)?;
        Ok(())
    }
}
