use crate::config::{add_ice_url_scheme, ConductorConfig};
use crate::engine::{ConnectionEngine, EngineObserver, PeerLink, PeerState, StatsReport};
use crate::error::EngineError;
use crate::logger::dump_candidate;
use crate::peer::stats::convert_report;
use crate::peer::types::{
    IceCandidate, SdpType, ServerConfig, SessionDescription, TrackInfo, TrackKind,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Движок на webrtc-rs
#[derive(Debug, Default)]
pub struct WebRtcEngine;

impl WebRtcEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionEngine for WebRtcEngine {
    async fn create_connection(
        &self,
        config: &ConductorConfig,
        observer: EngineObserver,
    ) -> Result<Arc<dyn PeerLink>, EngineError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(rtc_config(config))
            .await
            .map_err(|e| EngineError::CreateConnection(e.to_string()))?;
        let pc = Arc::new(pc);

        info!(connection = %observer.connection(), "peer connection created");
        attach_handlers(&pc, observer);

        Ok(Arc::new(WebRtcLink {
            pc,
            transceivers_added: AtomicBool::new(false),
        }))
    }
}

fn attach_handlers(pc: &Arc<RTCPeerConnection>, observer: EngineObserver) {
    let on_candidate = observer.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    };
                    dump_candidate("LOCAL", &candidate);
                    on_candidate.ice_candidate(candidate);
                }
                Err(e) => warn!("failed to serialize local candidate: {}", e),
            },
            // None означает конец сбора
            None => debug!("ICE candidate gathering completed"),
        }
        Box::pin(async {})
    }));

    let tracks: Arc<Mutex<Vec<TrackInfo>>> = Arc::default();

    let on_track = observer.clone();
    let known = tracks.clone();
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let kind = match track.kind() {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        };
        if let Some(kind) = kind {
            let info = TrackInfo {
                id: track.id(),
                kind,
            };
            if let Ok(mut list) = known.lock() {
                list.push(info.clone());
            }
            on_track.track_added(info);
        }
        Box::pin(async {})
    }));

    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        debug!("Peer connection state changed to: {:?}", st);
        let state = match st {
            RTCPeerConnectionState::New => PeerState::New,
            RTCPeerConnectionState::Connecting => PeerState::Connecting,
            RTCPeerConnectionState::Connected => PeerState::Connected,
            RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
            RTCPeerConnectionState::Failed => PeerState::Failed,
            RTCPeerConnectionState::Closed => {
                // треки уходят вместе с соединением
                if let Ok(mut list) = tracks.lock() {
                    for track in list.drain(..) {
                        observer.track_removed(track);
                    }
                }
                PeerState::Closed
            }
            _ => return Box::pin(async {}),
        };
        observer.connection_state(state);
        Box::pin(async {})
    }));
}

/// Создает конфигурацию для peer connection
fn rtc_config(config: &ConductorConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(&config.ice_servers),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let result = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    result.map_err(|e| EngineError::Description(e.to_string()))
}

pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    transceivers_added: AtomicBool,
}

impl WebRtcLink {
    /// Вызывающая сторона принимает аудио и видео
    async fn ensure_transceivers(&self) -> Result<(), EngineError> {
        if self.transceivers_added.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            self.pc.add_transceiver_from_kind(kind, None).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.ensure_transceivers().await?;
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        dump_candidate("REMOTE", &candidate);
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| EngineError::Candidate(e.to_string()))
    }

    async fn poll_stats(&self) -> Result<Vec<StatsReport>, EngineError> {
        if self.pc.connection_state() == RTCPeerConnectionState::Closed {
            return Err(EngineError::Closed);
        }
        Ok(convert_report(self.pc.get_stats().await))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.pc.close().await?;
        Ok(())
    }
}
