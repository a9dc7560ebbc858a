use crate::engine::StatsReport;
use crate::stats::latch::{Latch, RateLatch, Reading};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Категории отчётов, которые мы разбираем
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StatsCategory {
    InboundRtp,
    RemoteInboundRtp,
    OutboundRtp,
    CandidatePair,
}

impl StatsCategory {
    pub fn from_type(stats_type: &str) -> Option<Self> {
        match stats_type {
            "inbound-rtp" => Some(StatsCategory::InboundRtp),
            "remote-inbound-rtp" => Some(StatsCategory::RemoteInboundRtp),
            "outbound-rtp" => Some(StatsCategory::OutboundRtp),
            "candidate-pair" => Some(StatsCategory::CandidatePair),
            _ => None,
        }
    }

    /// Счётчик байт и отметка времени, по которым считается битрейт
    fn byte_counter(self) -> Option<(&'static str, &'static str)> {
        match self {
            StatsCategory::InboundRtp => Some(("bytesReceived", "lastPacketReceivedTimestamp")),
            StatsCategory::OutboundRtp => Some(("bytesSent", "timestamp")),
            StatsCategory::CandidatePair => Some(("bytesReceived", "timestamp")),
            StatsCategory::RemoteInboundRtp => None,
        }
    }

    fn round_trip_key(self) -> &'static str {
        match self {
            StatsCategory::CandidatePair => "currentRoundTripTime",
            _ => "roundTripTime",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoMetrics {
    pub frame_rate: Reading<f64>,
    pub freeze_count: Reading<u64>,
    pub total_freeze_duration_ms: Reading<f64>,
    pub total_inter_frame_delay_ms: Reading<f64>,
}

/// Производные метрики одного отчёта за один цикл опроса
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub timestamp_ms: i64,
    pub report_id: String,
    pub category: StatsCategory,
    pub kind: Option<String>,
    /// `None` в значении: битрейт не определён
    pub bitrate_mbps: Reading<Option<f64>>,
    pub packets_lost: Reading<i64>,
    pub jitter_ms: Reading<f64>,
    pub round_trip_time_ms: Reading<f64>,
    /// Только для `kind == "video"`
    pub video: Option<VideoMetrics>,
}

#[derive(Debug, Default)]
struct VideoLatches {
    frame_rate: Latch<f64>,
    freeze_count: Latch<u64>,
    freeze_duration_ms: Latch<f64>,
    inter_frame_delay_ms: Latch<f64>,
}

#[derive(Debug, Default)]
struct StreamLatches {
    bitrate: RateLatch,
    packets_lost: Latch<i64>,
    jitter_ms: Latch<f64>,
    round_trip_time_ms: Latch<f64>,
    video: VideoLatches,
}

/// Состояние защёлок одной сессии, по одному набору на отчёт
#[derive(Debug, Default)]
pub struct LatchBook {
    streams: HashMap<String, StreamLatches>,
}

fn seconds_to_ms(value: Option<f64>) -> Option<f64> {
    value.map(|s| s * 1000.0)
}

impl LatchBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn tracked_reports(&self) -> usize {
        self.streams.len()
    }

    /// Разбирает один набор отчётов; неизвестные типы пропускаются
    pub fn ingest(&mut self, reports: &[StatsReport], now_ms: i64) -> Vec<MetricSnapshot> {
        reports
            .iter()
            .filter_map(|report| {
                let category = StatsCategory::from_type(&report.stats_type)?;
                Some(self.derive(category, report, now_ms))
            })
            .collect()
    }

    fn derive(&mut self, category: StatsCategory, report: &StatsReport, now_ms: i64) -> MetricSnapshot {
        let latches = self.streams.entry(report.id.clone()).or_default();

        let bitrate_mbps = match category.byte_counter() {
            Some((bytes_key, clock_key)) => latches
                .bitrate
                .observe(report.f64(bytes_key), report.f64(clock_key)),
            None => latches.bitrate.observe(None, None),
        };

        let kind = report.text("kind").map(str::to_string);
        let video = if kind.as_deref() == Some("video") {
            let v = &mut latches.video;
            Some(VideoMetrics {
                frame_rate: v.frame_rate.observe(report.f64("framesPerSecond")),
                freeze_count: v
                    .freeze_count
                    .observe(report.i64("freezeCount").and_then(|c| u64::try_from(c).ok())),
                total_freeze_duration_ms: v
                    .freeze_duration_ms
                    .observe(seconds_to_ms(report.f64("totalFreezesDuration"))),
                total_inter_frame_delay_ms: v
                    .inter_frame_delay_ms
                    .observe(seconds_to_ms(report.f64("totalInterFrameDelay"))),
            })
        } else {
            None
        };

        MetricSnapshot {
            timestamp_ms: report
                .f64("timestamp")
                .map(|ts| ts as i64)
                .unwrap_or(now_ms),
            report_id: report.id.clone(),
            category,
            kind,
            bitrate_mbps,
            packets_lost: latches.packets_lost.observe(report.i64("packetsLost")),
            jitter_ms: latches.jitter_ms.observe(seconds_to_ms(report.f64("jitter"))),
            round_trip_time_ms: latches
                .round_trip_time_ms
                .observe(seconds_to_ms(report.f64(category.round_trip_key()))),
            video,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::latch::Provenance;

    fn inbound_video(bytes: u64, ts: f64) -> StatsReport {
        StatsReport::new("IT01V", "inbound-rtp")
            .with("kind", "video")
            .with("bytesReceived", bytes)
            .with("lastPacketReceivedTimestamp", ts)
    }

    #[test]
    fn test_unknown_report_types_skipped() {
        let mut book = LatchBook::new();
        let reports = vec![
            StatsReport::new("C1", "codec").with("payloadType", 96u64),
            StatsReport::new("T1", "transport"),
        ];
        assert!(book.ingest(&reports, 0).is_empty());
        assert!(book.is_empty());
    }

    #[test]
    fn test_jitter_latched_across_missing_cycles() {
        let mut book = LatchBook::new();
        let cycles = [
            StatsReport::new("IT01A", "inbound-rtp").with("jitter", 0.25),
            StatsReport::new("IT01A", "inbound-rtp"),
            StatsReport::new("IT01A", "inbound-rtp").with_empty("jitter"),
            StatsReport::new("IT01A", "inbound-rtp").with("jitter", 0.5),
            StatsReport::new("IT01A", "inbound-rtp"),
        ];

        let jitter: Vec<_> = cycles
            .iter()
            .map(|r| book.ingest(std::slice::from_ref(r), 0)[0].jitter_ms)
            .collect();

        assert_eq!(jitter[0], Reading::fresh(250.0));
        assert_eq!(jitter[1], Reading::latched(250.0));
        assert_eq!(jitter[2], Reading::latched(250.0));
        assert_eq!(jitter[3], Reading::fresh(500.0));
        assert_eq!(jitter[4], Reading::latched(500.0));
    }

    #[test]
    fn test_audio_report_omits_video_fields() {
        let mut book = LatchBook::new();
        let report = StatsReport::new("IT01A", "inbound-rtp")
            .with("kind", "audio")
            .with("framesPerSecond", 30.0)
            .with("packetsLost", 3i64);

        let snapshot = &book.ingest(&[report], 0)[0];
        assert!(snapshot.video.is_none());
        assert_eq!(snapshot.packets_lost, Reading::fresh(3));
    }

    #[test]
    fn test_video_fields_fresh_or_latched_independently() {
        let mut book = LatchBook::new();
        let first = inbound_video(0, 0.0)
            .with("framesPerSecond", 29.0)
            .with("freezeCount", 2u64)
            .with("totalFreezesDuration", 0.5);
        let second = inbound_video(125_000, 1_000.0)
            .with("freezeCount", 3u64)
            .with("totalInterFrameDelay", 1.25);

        book.ingest(&[first], 0);
        let snapshot = book.ingest(&[second], 0).remove(0);
        let video = snapshot.video.unwrap();

        assert_eq!(video.frame_rate, Reading::latched(29.0));
        assert_eq!(video.freeze_count, Reading::fresh(3));
        assert_eq!(video.total_freeze_duration_ms, Reading::latched(500.0));
        assert_eq!(video.total_inter_frame_delay_ms, Reading::fresh(1250.0));
        assert_eq!(snapshot.bitrate_mbps, Reading::fresh(Some(1.0)));
    }

    #[test]
    fn test_streams_do_not_share_latches() {
        let mut book = LatchBook::new();
        let reports = vec![
            StatsReport::new("RI1", "remote-inbound-rtp").with("roundTripTime", 0.125),
            StatsReport::new("CP1", "candidate-pair").with("currentRoundTripTime", 0.0625),
        ];
        let snapshots = book.ingest(&reports, 7);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(book.tracked_reports(), 2);
        assert_eq!(snapshots[0].round_trip_time_ms, Reading::fresh(125.0));
        assert_eq!(snapshots[1].round_trip_time_ms, Reading::fresh(62.5));
        // у remote-inbound нет счётчика байт
        assert_eq!(snapshots[0].bitrate_mbps.provenance, Provenance::Latched);
        assert_eq!(snapshots[0].bitrate_mbps.value, Some(0.0));
        assert_eq!(snapshots[0].timestamp_ms, 7);
    }
}
