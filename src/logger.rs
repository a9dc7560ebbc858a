use crate::config::DEFAULT_LOG_FILTER;
use crate::peer::types::IceCandidate;
use crate::stats::{MetricSnapshot, StatsCategory};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Подключает fmt-подписчика; уровень берётся из `RUST_LOG`
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // повторная инициализация (тесты, встраивание) не ошибка
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index
    );
}

/// Строки лога одного опроса в формате, который разбирают скрипты анализа
/// (`parse_logs.py`): один заголовок на опрос, `Receiving Rate` только у
/// inbound-rtp, длительности в секундах как в W3C.
pub fn render_poll(timestamp_ms: i64, snapshots: &[MetricSnapshot]) -> Vec<String> {
    let mut lines = vec![format!(
        "PeerConnection Stats Report received, timestamp: {}",
        timestamp_ms
    )];

    for snapshot in snapshots {
        let rate = match snapshot.bitrate_mbps.value {
            Some(mbps) => format!("{} Mbps", mbps),
            None => "NAN Mbps".to_string(),
        };
        let jitter_s = snapshot.jitter_ms.value / 1000.0;
        let rtt_s = snapshot.round_trip_time_ms.value / 1000.0;

        match snapshot.category {
            StatsCategory::InboundRtp => {
                lines.push("********LOGGING INBOUND TRANSPORT RTP STATS********".into());
                lines.push(format!("Receiving Rate: {rate}"));
                lines.push(format!("Packets Lost: {}", snapshot.packets_lost.value));
                lines.push(format!("Jitter: {jitter_s}"));
            }
            StatsCategory::RemoteInboundRtp => {
                lines.push("********LOGGING REMOTE INBOUND RTP STATS********".into());
                lines.push(format!("Remote Packets Lost: {}", snapshot.packets_lost.value));
                lines.push(format!("Remote Jitter: {jitter_s}"));
                lines.push(format!("Round Trip Time: {rtt_s}"));
            }
            StatsCategory::OutboundRtp => {
                lines.push("********LOGGING OUTBOUND RTP STATS********".into());
                lines.push(format!("Sending Rate: {rate}"));
            }
            StatsCategory::CandidatePair => {
                lines.push("********LOGGING ICE CANDIDATE PAIR STATS********".into());
                lines.push(format!("Transport Rate: {rate}"));
                lines.push(format!("Current Round Trip Time: {rtt_s}"));
            }
        }

        if let (StatsCategory::InboundRtp, Some(video)) = (snapshot.category, &snapshot.video) {
            lines.push("********LOGGING INBOUND VIDEO RTP STATS********".into());
            lines.push(format!("Frames per Second: {}", video.frame_rate.value));
            lines.push(format!("Freeze Rate: {}", video.freeze_count.value));
            lines.push(format!(
                "Total Freeze Duration: {}",
                video.total_freeze_duration_ms.value / 1000.0
            ));
            lines.push(format!(
                "Total Inter Frame Delay: {}",
                video.total_inter_frame_delay_ms.value / 1000.0
            ));
        }
    }
    lines
}

pub fn log_poll(timestamp_ms: i64, snapshots: &[MetricSnapshot]) {
    for line in render_poll(timestamp_ms, snapshots) {
        info!("{}", line);
    }
}
