use crate::engine::{ConnectionId, PeerLink, StatsReport};
use crate::error::{ConductorError, EngineError};
use crate::events::ConductorEvent;
use crate::logger::log_poll;
use crate::stats::snapshot::{LatchBook, MetricSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Периодический опрос статистики одного соединения.
///
/// Защёлки принадлежат только сэмплеру и живут, пока жива сессия.
#[derive(Debug)]
pub struct StatsSampler {
    connection: ConnectionId,
    latches: LatchBook,
}

impl StatsSampler {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            latches: LatchBook::new(),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn latches(&self) -> &LatchBook {
        &self.latches
    }

    /// Обрабатывает результат одного опроса. Ошибка цикла не прерывает опрос,
    /// защёлки остаются как были.
    pub fn process(&mut self, outcome: Result<Vec<StatsReport>, EngineError>) -> Vec<MetricSnapshot> {
        match outcome {
            Ok(reports) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                debug!(connection = %self.connection, reports = reports.len(), now_ms, "stats report received");
                let snapshots = self.latches.ingest(&reports, now_ms);
                log_poll(now_ms, &snapshots);
                snapshots
            }
            Err(e) => {
                let err = ConductorError::StatsCycle(e);
                warn!(connection = %self.connection, "{}", err);
                Vec::new()
            }
        }
    }

    /// Запускает опрос с интервалом `period`; первый опрос через один интервал
    pub fn start(
        connection: ConnectionId,
        link: Arc<dyn PeerLink>,
        period: Duration,
        control: mpsc::UnboundedSender<ConductorEvent>,
    ) -> SamplerHandle {
        let task = tokio::spawn(async move {
            let mut sampler = StatsSampler::new(connection);
            // опросы в полёте живут не дольше цикла
            let mut polls = JoinSet::new();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(%connection, period_ms = period.as_millis() as u64, "stats sampling started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // опрос не ждёт обработки предыдущего
                        let link = link.clone();
                        polls.spawn(async move { link.poll_stats().await });
                    }
                    Some(joined) = polls.join_next() => {
                        let outcome = match joined {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                debug!(%connection, "stats poll did not finish: {}", e);
                                continue;
                            }
                        };
                        let snapshots = sampler.process(outcome);
                        if snapshots.is_empty() {
                            continue;
                        }
                        if control.send(ConductorEvent::Metrics { connection, snapshots }).is_err() {
                            debug!(%connection, "control stream closed, stopping sampler");
                            break;
                        }
                    }
                }
            }
        });

        SamplerHandle { connection, task }
    }
}

/// Ручка запущенного опроса; остановка отменяет следующий цикл
#[derive(Debug)]
pub struct SamplerHandle {
    connection: ConnectionId,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn stop(self) {
        debug!(connection = %self.connection, "stats sampling stopped");
        // abort в Drop
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
