//! The SIGINT task (component E): waits for Ctrl-C, then drives the same
//! purge-queue/enqueue-BYE shutdown the original's signal handler
//! performed on the process-wide `ProgramInterface`. There is no global
//! mutable state here (per spec.md §9's "atomic handle" suggestion) —
//! this task owns its own `Arc` clone of `EngineShared`, installed by
//! `ChatEngine::run` before the other actors are spawned, so arming is
//! just `tokio::spawn` rather than a libc handler registration.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::codec::{tcp, udp, MessageFlag, OutboundMessage};
use crate::input::CommandKind;
use crate::session::{SessionEvent, TransportKind};

use super::EngineShared;

/// How often this task polls the FSM for `End` while waiting for the
/// Sender to finish transmitting (and, on UDP, get confirmed) the BYE
/// this task queues. A dedicated poll avoids racing Main for the shared
/// `main_cond` permit, which Main may also be waiting on at the moment
/// SIGINT arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn run(shared: Arc<EngineShared>) -> Result<()> {
    tokio::signal::ctrl_c().await?;

    // A second SIGINT while shutdown is already underway is a no-op: the
    // first signal's sequence is left to run to completion.
    if shared.sigint_requested.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    purge_and_queue_bye(&shared).await;

    while !shared.fsm.load().is_terminal() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    std::process::exit(0);
}

/// The part of the SIGINT sequence with no process-lifetime side effect:
/// drive the FSM's `Sigint` transition, purge whatever Main had queued,
/// and queue the BYE that carries the session to `End`. Split out of
/// [`run`] so it can be exercised without going through `ctrl_c()` or the
/// terminal `process::exit`.
pub(crate) async fn purge_and_queue_bye(shared: &EngineShared) {
    shared.fsm.apply(SessionEvent::Sigint, shared.transport_kind);

    let bye = match shared.transport_kind {
        TransportKind::Udp => udp::assemble_udp(&OutboundMessage::Bye, 0),
        TransportKind::Tcp => tcp::assemble_tcp(&OutboundMessage::Bye, 0),
    };

    {
        let mut queue = shared.queue.lock().await;
        queue.clear();
        queue.push_back(&bye, MessageFlag::Bye, CommandKind::Exit);
    }
    shared.sender_empty_queue.notify_one();
}
