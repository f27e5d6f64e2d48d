//! The Receiver actor (component E): polls the transport, decodes frames
//! via the wire codec (component B), acknowledges them (UDP only), and
//! drives every FSM transition that originates from something the server
//! sent — `protocolReceiver.c`'s `logicFSM` translated onto `session::next`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::codec::{tcp, udp, MessageFlag, MessageKind, OutboundMessage, ProtocolRecord};
use crate::input::CommandKind;
use crate::session::{SessionEvent, SessionState, TransportKind};
use crate::transport::{RecvOutcome, TransportReceiver};

use super::{EngineShared, Outcome};

/// How long one `recv` call blocks before returning `TimedOut`, letting
/// the loop re-check `is_terminal()` even when the server stays silent.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(shared: Arc<EngineShared>, mut rx: Box<dyn TransportReceiver>) -> Result<()> {
    let transport_kind = shared.transport_kind;

    loop {
        if shared.fsm.load().is_terminal() {
            break;
        }

        let frame = match rx.recv(POLL_INTERVAL).await? {
            RecvOutcome::TimedOut => continue,
            RecvOutcome::Closed => {
                // TCP only. The peer tore down the connection without a
                // BYE line; treat it the same as one.
                let new_state = shared.fsm.apply(SessionEvent::ByeReceived, transport_kind);
                if new_state == SessionState::End {
                    shared.wake_main(Outcome::Ended);
                }
                break;
            }
            RecvOutcome::Frame(bytes) => bytes,
        };

        let record = match transport_kind {
            TransportKind::Udp => udp::disassemble_udp(&frame),
            TransportKind::Tcp => tcp::disassemble_tcp(&frame),
        };

        let kind = record.kind();
        let msg_id = record.msg_id().unwrap_or(0);

        if transport_kind == TransportKind::Udp {
            if let Some(kind) = kind {
                if kind != MessageKind::Confirm {
                    let is_duplicate = {
                        let mut queue = shared.queue.lock().await;
                        let bytes = msg_id.to_be_bytes();
                        if queue.contains_id(kind, bytes[0], bytes[1]) {
                            true
                        } else {
                            queue.push_id_only(bytes[0], bytes[1], kind);
                            false
                        }
                    };

                    // A retransmit of a frame we've already handled: the
                    // original CONFIRM may have been lost, so re-ack it
                    // and skip acting on it a second time.
                    if is_duplicate {
                        send_confirm(&shared, msg_id).await;
                        continue;
                    }
                }
            }
        }

        match record {
            ProtocolRecord::Confirm { .. } => handle_confirm(&shared, msg_id).await,
            ProtocolRecord::Reply {
                result, contents, ..
            } => {
                if transport_kind == TransportKind::Udp {
                    send_confirm(&shared, msg_id).await;
                }
                handle_reply(&shared, transport_kind, result, contents).await;
            }
            ProtocolRecord::Msg {
                display_name,
                contents,
                ..
            } => {
                if transport_kind == TransportKind::Udp {
                    send_confirm(&shared, msg_id).await;
                }
                handle_msg(&shared, display_name, contents);
            }
            ProtocolRecord::Bye { .. } => handle_bye(&shared, transport_kind, msg_id).await,
            ProtocolRecord::Err {
                display_name,
                contents,
                ..
            } => {
                let name = String::from_utf8_lossy(display_name);
                let text = String::from_utf8_lossy(contents);
                eprintln!("ERR FROM {name}: {text}");
                // The server already told us what's wrong; we only need
                // to ack it and leave, not echo an ERR of our own.
                enter_err_state(&shared, transport_kind, Some(msg_id), None).await;
            }
            ProtocolRecord::Auth { .. } | ProtocolRecord::Join { .. } => {
                let reason = "Unexpected message type.";
                eprintln!("ERR: {reason}");
                enter_err_state(&shared, transport_kind, Some(msg_id), Some(reason)).await;
            }
            ProtocolRecord::Unknown(id) => {
                let reason = "Unknown message type.";
                eprintln!("ERR: {reason}");
                enter_err_state(&shared, transport_kind, id, Some(reason)).await;
            }
            ProtocolRecord::Corrupted(id) => {
                let reason = "Malformed message.";
                eprintln!("ERR: {reason}");
                enter_err_state(&shared, transport_kind, id, Some(reason)).await;
            }
        }
    }

    Ok(())
}

/// Queue a CONFIRM acknowledging `msg_id`.
async fn send_confirm(shared: &EngineShared, msg_id: u16) {
    let mut queue = shared.queue.lock().await;
    let conf = OutboundMessage::Confirm { ref_msg_id: msg_id };
    queue.push_front(&udp::assemble_udp(&conf, msg_id), MessageFlag::Confirm, CommandKind::Conf);
    drop(queue);
    shared.sender_empty_queue.notify_one();
}

/// A CONFIRM for something we sent. Only the entry actually awaiting
/// `msg_id` is marked; a confirm that doesn't match the head is ignored
/// rather than spuriously advancing the FSM.
async fn handle_confirm(shared: &EngineShared, msg_id: u16) {
    let matched_kind = {
        let mut queue = shared.queue.lock().await;
        match queue.peek() {
            Some(entry) if udp::read_msg_id(&entry.buffer) == Some(msg_id) => {
                queue.set_head_flags(MessageFlag::Confirmed);
                Some(entry.kind)
            }
            _ => None,
        }
    };

    let Some(kind) = matched_kind else {
        return;
    };

    // Every subsequent outbound message gets a fresh id once this one is
    // acknowledged, so two in-flight messages never share an id even
    // though the Sender stamps from the same counter on every retry.
    shared.details.lock().unwrap().msg_counter = msg_id.wrapping_add(1);

    let new_state = shared.fsm.apply(SessionEvent::ConfirmReceived, TransportKind::Udp);
    if new_state == SessionState::End {
        shared.wake_main(Outcome::Ended);
    } else if !matches!(kind, CommandKind::Auth | CommandKind::Join) {
        // An AUTH/JOIN's stable outcome is its REPLY, not this CONFIRM —
        // Main keeps waiting (see main_actor.rs). Every other kind, an
        // ordinary MSG chiefly, is fully acknowledged the moment its
        // CONFIRM arrives, so that's the outcome Main's wait is for.
        shared.wake_main(Outcome::Confirmed);
    }
    shared.rec2sender.notify_one();
}

/// A REPLY, routing on whether it answers the pending AUTH or a pending
/// JOIN. Both outcomes move a `JoinAtempt` back to `Open` regardless of
/// `result` (spec text is explicit that a failed JOIN still returns to
/// an open, usable session) even though the original C's equivalent
/// routing reads as success-only; `session::next`'s unconditional
/// `JoinReplyReceived` arm is followed here rather than that apparent bug.
async fn handle_reply(shared: &EngineShared, transport_kind: TransportKind, result: bool, contents: &[u8]) {
    let text = String::from_utf8_lossy(contents).into_owned();

    match shared.fsm.load() {
        SessionState::W84Reply => {
            let event = if result {
                SessionEvent::ReplyPositive
            } else {
                SessionEvent::ReplyNegative
            };
            let new_state = shared.fsm.apply(event, transport_kind);

            if result {
                println!("Success: {text}");
            } else {
                println!("Failure: {text}");
                let mut queue = shared.queue.lock().await;
                queue.set_head_flags(MessageFlag::Rejected);
            }

            if !result {
                // Rejected: terminal for this attempt, back to Start.
                shared.wake_main(Outcome::ReplyNegative(text));
            } else if new_state == SessionState::Open {
                // TCP, or a UDP reply whose CONFIRM round-trip already
                // completed: the session is open now.
                shared.wake_main(Outcome::Confirmed);
            }
            // Otherwise this is a UDP positive reply still waiting on its
            // own CONFIRM to go out; the Sender wakes Main once that send
            // drives W84ReplyConf -> Open.
            shared.rec2sender.notify_one();
        }
        SessionState::JoinAtempt => {
            shared.fsm.apply(SessionEvent::JoinReplyReceived, transport_kind);
            if result {
                println!("Success: {text}");
            } else {
                println!("Failure: {text}");
            }
            shared.wake_main(Outcome::JoinReply {
                success: result,
                message: text,
            });
        }
        _ => {
            let reason = "Unexpected REPLY.";
            eprintln!("ERR: {reason}");
            enter_err_state(shared, transport_kind, None, Some(reason)).await;
        }
    }
}

/// A chat message from another user. Printed only once the session is
/// actually joined to a channel — a MSG arriving before authentication
/// completes is acknowledged (above) but not displayed.
fn handle_msg(shared: &EngineShared, display_name: &[u8], contents: &[u8]) {
    if !shared.fsm.load().is_authenticated() {
        return;
    }
    let name = String::from_utf8_lossy(display_name);
    let text = String::from_utf8_lossy(contents);
    println!("{name}: {text}");
}

/// The server ended the session. UDP must still CONFIRM the BYE before
/// the FSM can reach `End` (session.rs's `ByeRecv` arm); TCP has no such
/// frame and ends the instant the event is applied.
async fn handle_bye(shared: &EngineShared, transport_kind: TransportKind, msg_id: u16) {
    let new_state = shared.fsm.apply(SessionEvent::ByeReceived, transport_kind);
    match transport_kind {
        TransportKind::Udp => send_confirm(shared, msg_id).await,
        TransportKind::Tcp => {
            if new_state == SessionState::End {
                shared.wake_main(Outcome::Ended);
            }
        }
    }
}

/// Common tail of every path into the `Err`/`ErrW84Conf` detour: drop
/// whatever's still queued, ack the triggering frame if it had a usable
/// id, optionally echo our own ERR (`reason.is_some()`), then queue the
/// BYE whose eventual transmission is what the FSM treats as leaving
/// `Err` (session.rs's `Err`/`ErrW84Conf` arms fire on `Transmitted`
/// generically; `sender::transmit_advances_state` is what restricts that
/// to the BYE specifically, so an echoed ERR can precede it un-gated).
async fn enter_err_state(
    shared: &EngineShared,
    transport_kind: TransportKind,
    ack_msg_id: Option<u16>,
    own_err_reason: Option<&str>,
) {
    shared.fsm.apply(SessionEvent::ErrOrUnknownFrame, transport_kind);
    shared.protocol_error.store(true, std::sync::atomic::Ordering::SeqCst);

    let mut queue = shared.queue.lock().await;
    queue.clear();

    if let (TransportKind::Udp, Some(id)) = (transport_kind, ack_msg_id) {
        let conf = OutboundMessage::Confirm { ref_msg_id: id };
        queue.push_back(&udp::assemble_udp(&conf, id), MessageFlag::Confirm, CommandKind::Conf);
    }

    if let Some(reason) = own_err_reason {
        let display_name = shared.details.lock().unwrap().display_name.clone();
        let err_msg = OutboundMessage::Err {
            display_name,
            contents: reason.to_string(),
        };
        let frame = match transport_kind {
            TransportKind::Udp => udp::assemble_udp(&err_msg, 0),
            TransportKind::Tcp => tcp::assemble_tcp(&err_msg, 0),
        };
        queue.push_back(&frame, MessageFlag::Err, CommandKind::Err);
    }

    let bye_frame = match transport_kind {
        TransportKind::Udp => udp::assemble_udp(&OutboundMessage::Bye, 0),
        TransportKind::Tcp => tcp::assemble_tcp(&OutboundMessage::Bye, 0),
    };
    queue.push_back(&bye_frame, MessageFlag::Bye, CommandKind::Exit);

    drop(queue);
    shared.sender_empty_queue.notify_one();
}
