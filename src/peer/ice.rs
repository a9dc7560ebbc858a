use crate::peer::types::IceCandidate;
use tracing::{debug, warn};

/// Кандидаты, полученные до установки remote description.
///
/// Порядок прихода сохраняется при воспроизведении.
#[derive(Debug, Default)]
pub struct PendingCandidates {
    remote_description_set: bool,
    queue: Vec<IceCandidate>,
}

impl PendingCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Возвращает кандидат, если его можно применять сразу, иначе откладывает
    pub fn admit(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.remote_description_set {
            Some(candidate)
        } else {
            debug!(queued = self.queue.len() + 1, "Remote description not set yet, queuing candidate");
            self.queue.push(candidate);
            None
        }
    }

    /// Отмечает remote description и отдаёт отложенные кандидаты по порядку
    pub fn release(&mut self) -> Vec<IceCandidate> {
        self.remote_description_set = true;
        let pending: Vec<_> = self.queue.drain(..).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Applying pending candidates");
        }
        pending
    }
}

/// Сводка по типам кандидатов
pub fn analyze_candidates<'a>(candidates: impl IntoIterator<Item = &'a IceCandidate>) -> (usize, usize, usize) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    debug!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );
    if host_count + srflx_count + relay_count > 0 && relay_count == 0 {
        warn!("No TURN relay candidates found! Connection through NAT may fail.");
    }
    (host_count, srflx_count, relay_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u32, typ: &str) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ {typ}"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn test_early_candidates_replayed_in_arrival_order() {
        let mut pending = PendingCandidates::new();
        for n in 1..=5 {
            assert!(pending.admit(cand(n, "host")).is_none());
        }
        assert_eq!(pending.len(), 5);

        let replay = pending.release();
        let order: Vec<_> = replay.iter().map(|c| c.candidate.clone()).collect();
        let expected: Vec<_> = (1..=5).map(|n| cand(n, "host").candidate).collect();
        assert_eq!(order, expected);
        assert!(pending.is_empty());

        // после remote description кандидаты идут сразу
        assert_eq!(pending.admit(cand(6, "host")), Some(cand(6, "host")));
    }

    #[test]
    fn test_analyze_counts_types() {
        let list = vec![cand(1, "host"), cand(2, "srflx"), cand(3, "relay"), cand(4, "host")];
        assert_eq!(analyze_candidates(&list), (2, 1, 1));
    }
}
