//! The Sender actor (component E): drains the outbound queue, applies the
//! FSM's gating rules for what may leave the wire in each state, stamps
//! UDP ids / bumps the TCP counter immediately before transmission, and
//! retires or retries the head per spec.md §4.5 step 5.
//!
//! Grounded in `protocolSender.c`'s `filterResentMessages`/`logicFSM`/main
//! loop; the pthread mutex/condvar choreography there becomes the
//! `EngineShared` queue mutex plus the `rec2sender`/`sender_empty_queue`
//! `Notify` pair here.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::codec::{udp, MessageFlag, OutboundMessage};
use crate::input::CommandKind;
use crate::queue::MessageQueue;
use crate::session::{SessionEvent, SessionState, TransportKind};
use crate::transport::TransportSender;

use super::{EngineShared, Outcome};

/// What the gate in step 3 decided for the current head entry.
enum Gate {
    /// Send the head now.
    Proceed,
    /// Don't send; wait (unboundedly) for the Receiver to change something.
    Hold,
    /// The head was discarded without being sent; re-run the loop at once.
    Retry,
}

pub async fn run(shared: Arc<EngineShared>, mut tx: Box<dyn TransportSender>) -> Result<()> {
    let transport_kind = shared.transport_kind;

    loop {
        if shared.fsm.load().is_terminal() {
            break;
        }

        if filter_and_retire(&shared).await {
            continue;
        }

        let is_empty = shared.queue.lock().await.is_empty();
        if is_empty {
            let state = shared.fsm.load();
            if matches!(state, SessionState::EmptyQBye | SessionState::SigintBye) {
                shared.fsm.store(SessionState::End);
                shared.wake_main(Outcome::Ended);
                continue;
            }
            shared.sender_empty_queue.notified().await;
            continue;
        }

        let pre_state = shared.fsm.load();
        let gate = {
            let mut queue = shared.queue.lock().await;
            decide_gate(&mut queue, pre_state)
        };

        match gate {
            Gate::Hold => {
                shared.rec2sender.notified().await;
                continue;
            }
            Gate::Retry => continue,
            Gate::Proceed => {}
        }

        let (frame, head_kind) = {
            let mut queue = shared.queue.lock().await;
            match transport_kind {
                TransportKind::Udp => {
                    let msg_id = shared.details.lock().unwrap().msg_counter;
                    queue.set_head_msg_id(msg_id);
                }
                TransportKind::Tcp => {
                    let mut details = shared.details.lock().unwrap();
                    details.msg_counter = details.msg_counter.wrapping_add(1);
                }
            }
            let frame = queue.peek().map(|e| e.buffer.clone());
            let kind = queue.head_kind();
            (frame, kind)
        };

        let (Some(frame), Some(head_kind)) = (frame, head_kind) else {
            continue;
        };

        if let Err(err) = tx.send(&frame).await {
            warn!("transport send failed: {err:#}");
            return Err(err);
        }

        if transmit_advances_state(pre_state, head_kind) {
            let mut new_state = shared.fsm.apply(SessionEvent::Transmitted, transport_kind);
            if transport_kind == TransportKind::Tcp {
                // TCP has no separate CONFIRM step: a single send must
                // satisfy both the "sent" and "acknowledged" halves of the
                // pre-auth handshake, so the second half of the collapsed
                // transition is applied immediately.
                new_state = shared.fsm.apply(SessionEvent::Transmitted, transport_kind);
            }

            if new_state == SessionState::End {
                shared.wake_main(Outcome::Ended);
            } else if pre_state == SessionState::W84ReplyConf && new_state == SessionState::Open {
                shared.wake_main(Outcome::Confirmed);
            }
        }

        {
            let mut queue = shared.queue.lock().await;
            match transport_kind {
                TransportKind::Udp => {
                    let flags = queue.head_flags().unwrap_or(MessageFlag::None);
                    match flags {
                        MessageFlag::DoNotResend | MessageFlag::Confirm | MessageFlag::NokReply => {
                            queue.pop_front();
                        }
                        _ => queue.mark_sent(),
                    }
                }
                TransportKind::Tcp => {
                    queue.pop_front();
                }
            }
        }

        if transport_kind == TransportKind::Udp {
            let _ = tokio::time::timeout(shared.udp_timeout, shared.rec2sender.notified()).await;
        }
    }

    Ok(())
}

/// Step 1: pop retired entries (rejected, confirmed-and-not-AUTH) and
/// handle a retransmission budget exceeded on the head. Returns `true`
/// when the caller should skip straight to the next loop iteration.
async fn filter_and_retire(shared: &EngineShared) -> bool {
    let transport_kind = shared.transport_kind;
    let mut queue = shared.queue.lock().await;

    loop {
        let Some(entry) = queue.peek() else { return false };

        if transport_kind == TransportKind::Udp && entry.send_count > shared.udp_max_retries {
            match shared.fsm.load() {
                SessionState::ErrW84Conf | SessionState::EndW84Conf => {
                    // The server never acked our own ERR/BYE either; there is
                    // no further retry target, so give up and end locally
                    // rather than block the Sender on `sender_empty_queue`
                    // forever once the queue drains.
                    queue.pop_front();
                    shared.fsm.store(SessionState::End);
                    shared.wake_main(Outcome::Ended);
                    return true;
                }
                _ => {
                    warn!("request timed out after {} retries", shared.udp_max_retries);
                    eprintln!("ERR: Request timed out.");
                    queue.clear();
                    shared.fsm.store(SessionState::Err);
                    shared.protocol_error.store(true, std::sync::atomic::Ordering::SeqCst);

                    // The Err state's only outbound frame is our own ERR;
                    // its confirmed delivery (Receiver's `ConfirmReceived`)
                    // is what the FSM waits on to reach `End` (session.rs's
                    // `Err`/`ErrW84Conf` arms never expect a BYE).
                    let display_name = shared.details.lock().unwrap().display_name.clone();
                    let err_msg = OutboundMessage::Err {
                        display_name,
                        contents: "Request timed out.".to_string(),
                    };
                    queue.push_back(&udp::assemble_udp(&err_msg, 0), MessageFlag::Err, CommandKind::Err);

                    return true;
                }
            }
        }

        let flags = entry.flags;
        let kind = entry.kind;

        if flags == MessageFlag::Rejected {
            queue.pop_front();
            continue;
        }
        // AUTH stays at the head, gating everything behind it, until its
        // own CONFIRM has actually arrived; once confirmed it retires like
        // any other entry rather than lingering to be mistaken for a fresh
        // (and therefore rejectable) AUTH attempt once the session opens.
        if kind == CommandKind::Auth && flags != MessageFlag::Confirmed {
            return false;
        }
        if flags != MessageFlag::Confirmed {
            return false;
        }
        queue.pop_front();
    }
}

/// Step 3: decide whether the head may be sent in `state`, mirroring
/// `protocolSender.c`'s `logicFSM`.
fn decide_gate(queue: &mut MessageQueue, state: SessionState) -> Gate {
    use SessionState::*;

    let Some(kind) = queue.head_kind() else { return Gate::Hold };
    let flags = queue.head_flags().unwrap_or(MessageFlag::None);

    match state {
        Start | AuthW82BeSent | AuthSent | W84Reply => {
            if kind == CommandKind::Auth {
                let send_count = queue.peek().map(|e| e.send_count).unwrap_or(0);
                if flags == MessageFlag::Confirmed && send_count > 0 {
                    Gate::Hold
                } else {
                    Gate::Proceed
                }
            } else if flags == MessageFlag::NokReply {
                Gate::Proceed
            } else {
                Gate::Hold
            }
        }
        Open => {
            if kind == CommandKind::Auth {
                eprintln!("ERR: You are already authenticated.");
                queue.pop_front();
                Gate::Retry
            } else {
                Gate::Proceed
            }
        }
        _ => Gate::Proceed,
    }
}

/// Whether sending `head_kind`'s frame while in `state` is the
/// state-defining event for that state, rather than an incidental frame
/// that happens to share the head at the same time:
/// - `AuthW82BeSent`/`AuthSent`/`W84Reply`: the AUTH itself.
/// - `W84ReplyConf`: the post-REPLY CONFIRM.
/// - `Err`/`ErrW84Conf`: our own ERR, reporting a local protocol error.
/// - `ByeRecv`: the CONFIRM of a remote BYE.
/// - `EmptyQBye`/`SigintBye`: the BYE that ends a local exit/SIGINT.
fn transmit_advances_state(state: SessionState, head_kind: CommandKind) -> bool {
    use SessionState::*;

    match state {
        Start | AuthW82BeSent | AuthSent | W84Reply => head_kind == CommandKind::Auth,
        W84ReplyConf | ByeRecv => head_kind == CommandKind::Conf,
        Err | ErrW84Conf => head_kind == CommandKind::Err,
        EmptyQBye | SigintBye => head_kind == CommandKind::Exit,
        _ => true,
    }
}
