//! # Three-actor runtime (component E, **\[FULL\]** concurrency substrate)
//!
//! `ChatEngine` is the Rust analogue of the original's `ProgramInterface`:
//! it owns the queue, the FSM, the session details, and the condition
//! variables translated into `tokio::sync::Notify` pairs (§4.5), and is
//! dropped only after Main, Sender, and Receiver have all returned.

mod main_actor;
mod receiver;
mod sender;
mod signal;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::queue::MessageQueue;
use crate::session::{SessionFsm, SharedSessionDetails, TransportKind};
use crate::transport::ConnectedTransport;

/// Why Main was woken from its wait on `main_cond`, translated from the
/// original's pattern of re-checking FSM state after waking into an
/// explicit mailbox value Receiver/Sender deposit before notifying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    ReplyPositive(String),
    ReplyNegative(String),
    JoinReply { success: bool, message: String },
    Ended,
    ErrorOccurred,
}

/// State shared by all three actors plus the SIGINT task. Every field
/// here corresponds to one of the five conceptual mutexes from spec.md
/// §5: `queue` (the queue mutex), `fsm` (the FSM mutex, realized as an
/// atomic), `details` (a plain mutex, changes far less often), and the
/// two `Notify` pairs plus the mailbox standing in for `main_cond`.
pub struct EngineShared {
    pub queue: AsyncMutex<MessageQueue>,
    pub fsm: SessionFsm,
    pub details: SharedSessionDetails,
    pub transport_kind: TransportKind,
    pub udp_timeout: Duration,
    pub udp_max_retries: u8,

    /// Signaled by Main after enqueuing; awaited by Sender when the queue
    /// is empty.
    pub sender_empty_queue: Notify,
    /// Signaled by Receiver (and by Sender on timeout) to unblock a
    /// Sender waiting on a held head or a pending CONFIRM/REPLY.
    pub rec2sender: Notify,
    /// Signaled by Sender/Receiver when Main's pending send reaches a
    /// stable outcome; paired with `main_mailbox` so Main can tell why it
    /// woke without a dedicated channel per message.
    pub main_cond: Notify,
    pub main_mailbox: std::sync::Mutex<Option<Outcome>>,

    /// Set by the SIGINT task; Sender/Receiver consult this to fast-path
    /// into the SIGINT transition without waiting for normal traffic.
    pub sigint_requested: std::sync::atomic::AtomicBool,

    /// Set by Receiver/Sender when the session ends via the ERR/BYE
    /// detour (a remote ERR, an unrecognized/corrupted frame, or a
    /// UDP retransmission budget exceeded) rather than a normal END.
    /// Checked once Main observes `End` to choose the process exit
    /// code (§6: "non-zero on...protocol failure"); a plain `Outcome`
    /// notification isn't reliable for this since `Notify` coalesces
    /// permits and a fast ERR→BYE→End sequence could overwrite the
    /// transient `ErrorOccurred` mailbox entry before Main observes it.
    pub protocol_error: std::sync::atomic::AtomicBool,
}

impl EngineShared {
    pub fn new(transport_kind: TransportKind, udp_timeout: Duration, udp_max_retries: u8) -> Self {
        Self {
            queue: AsyncMutex::new(MessageQueue::new()),
            fsm: SessionFsm::new(),
            details: SharedSessionDetails::new(Default::default()),
            transport_kind,
            udp_timeout,
            udp_max_retries,
            sender_empty_queue: Notify::new(),
            rec2sender: Notify::new(),
            main_cond: Notify::new(),
            main_mailbox: std::sync::Mutex::new(None),
            sigint_requested: std::sync::atomic::AtomicBool::new(false),
            protocol_error: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Deposit `outcome` in the mailbox and wake whoever is waiting on
    /// `main_cond`. Mirrors the original's pattern of setting shared
    /// state and signaling under the same mutex.
    pub fn wake_main(&self, outcome: Outcome) {
        *self.main_mailbox.lock().unwrap() = Some(outcome);
        self.main_cond.notify_one();
    }
}

/// Owns the three actor tasks and the SIGINT handler task, and joins all
/// of them before reporting the engine's overall result.
pub struct ChatEngine {
    shared: Arc<EngineShared>,
}

impl ChatEngine {
    pub fn new(transport_kind: TransportKind, udp_timeout: Duration, udp_max_retries: u8) -> Self {
        Self {
            shared: Arc::new(EngineShared::new(transport_kind, udp_timeout, udp_max_retries)),
        }
    }

    /// Run the engine to completion: spawn Main, Sender, Receiver, and
    /// the SIGINT task, then await all four. The first actor error is
    /// surfaced to the caller; a clean SIGINT-driven shutdown (or a
    /// protocol-driven `End`) resolves `Ok(())`.
    pub async fn run(self, transport: ConnectedTransport) -> Result<()> {
        let (tx, rx) = transport.split();
        let shared = self.shared;
        let protocol_error_flag = shared.clone();

        let sender_shared = shared.clone();
        let sender_task = tokio::spawn(async move { sender::run(sender_shared, tx).await });

        let receiver_shared = shared.clone();
        let receiver_task = tokio::spawn(async move { receiver::run(receiver_shared, rx).await });

        let signal_shared = shared.clone();
        let signal_task = tokio::spawn(async move { signal::run(signal_shared).await });

        let main_shared = shared.clone();
        let main_result = main_actor::run(main_shared).await;

        let sender_result = sender_task.await;
        let receiver_result = receiver_task.await;
        signal_task.abort();

        main_result?;
        sender_result.map_err(anyhow::Error::from)??;
        receiver_result.map_err(anyhow::Error::from)??;

        if protocol_error_flag
            .protocol_error
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            anyhow::bail!("session ended after a protocol error");
        }
        Ok(())
    }
}
