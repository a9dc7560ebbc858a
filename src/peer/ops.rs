//! Последовательный исполнитель операций над одним соединением.
//!
//! Операции выполняются строго в порядке постановки, результат каждой
//! возвращается в очередь управления с меткой соединения.

use crate::engine::{ConnectionId, PeerLink};
use crate::events::{Completion, ConductorEvent};
use crate::peer::types::{IceCandidate, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug)]
pub enum LinkOp {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
}

impl LinkOp {
    fn name(&self) -> &'static str {
        match self {
            LinkOp::CreateOffer => "create_offer",
            LinkOp::CreateAnswer => "create_answer",
            LinkOp::SetLocal(_) => "set_local_description",
            LinkOp::SetRemote(_) => "set_remote_description",
            LinkOp::AddCandidate(_) => "add_ice_candidate",
        }
    }
}

async fn execute(link: &dyn PeerLink, op: LinkOp) -> Completion {
    let name = op.name();
    let result = match op {
        LinkOp::CreateOffer => link.create_offer().await.map(Completion::LocalDescriptionReady),
        LinkOp::CreateAnswer => link.create_answer().await.map(Completion::LocalDescriptionReady),
        LinkOp::SetLocal(desc) => {
            let sdp_type = desc.sdp_type;
            link.set_local_description(desc)
                .await
                .map(|_| Completion::LocalDescriptionApplied(sdp_type))
        }
        LinkOp::SetRemote(desc) => {
            let sdp_type = desc.sdp_type;
            link.set_remote_description(desc)
                .await
                .map(|_| Completion::RemoteDescriptionApplied(sdp_type))
        }
        LinkOp::AddCandidate(candidate) => {
            return match link.add_ice_candidate(candidate).await {
                Ok(()) => Completion::CandidateApplied,
                Err(e) => Completion::CandidateRejected(e),
            };
        }
    };
    result.unwrap_or_else(|error| Completion::Failed { op: name, error })
}

/// Запускает исполнитель; отмена через `abort()` у возвращённой задачи
pub fn spawn_link_worker(
    connection: ConnectionId,
    link: Arc<dyn PeerLink>,
    control: mpsc::UnboundedSender<ConductorEvent>,
) -> (mpsc::UnboundedSender<LinkOp>, JoinHandle<()>) {
    let (ops_tx, mut ops_rx) = mpsc::unbounded_channel::<LinkOp>();

    let task = tokio::spawn(async move {
        while let Some(op) = ops_rx.recv().await {
            trace!(%connection, op = op.name(), "engine op started");
            let completion = execute(link.as_ref(), op).await;
            if control
                .send(ConductorEvent::Completion {
                    connection,
                    completion,
                })
                .is_err()
            {
                break;
            }
        }
        debug!(%connection, "link worker finished");
    });

    (ops_tx, task)
}
