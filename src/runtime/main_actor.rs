//! The Main actor (component E): reads stdin, tokenizes/validates each
//! line (component A), and enqueues the resulting outbound frame
//! (component B). Grounded in `main.c`'s stdin loop: enqueue, signal the
//! Sender, then block until the message reaches a stable outcome.
//!
//! Per spec.md §4.5, Main waits for the Sender/Receiver to confirm a
//! stable outcome before accepting the next line. For an ordinary chat
//! MSG this wait only applies on UDP, where a CONFIRM is the thing being
//! waited for; TCP has no reliability layer of its own, so a plain MSG
//! is handed to the Sender and Main moves straight on to the next line.
//! AUTH and JOIN always wait, on both transports, since the server's
//! REPLY determines whether the next line is even legal to send.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{self, BufReader};

use crate::codec::{tcp, udp, MessageFlag, OutboundMessage};
use crate::input::{self, CommandKind, ParsedCommand};
use crate::session::{SessionEvent, TransportKind};

use super::{EngineShared, Outcome};

const HELP_TEXT: &str = "\
Available commands:
  /auth {username} {secret} {display_name}   authenticate with the server
  /join {channel_id}                         join a channel
  /rename {display_name}                     change your local display name
  /help                                       show this help text
  /exit                                       leave the session
Anything else is sent as a chat message once the session is open.";

pub async fn run(shared: Arc<EngineShared>) -> Result<()> {
    run_with_reader(shared, BufReader::new(io::stdin())).await
}

/// The stdin loop, generic over its input source so tests can drive it
/// with a scripted [`std::io::Cursor`] instead of the process's real stdin.
pub async fn run_with_reader<R>(shared: Arc<EngineShared>, mut stdin: R) -> Result<()>
where
    R: io::AsyncBufRead + Unpin,
{
    loop {
        if shared.fsm.load().is_terminal() {
            break;
        }

        let line = input::read_line_from_stdin(&mut stdin).await?;
        let parsed = if line.eof {
            ParsedCommand::Exit
        } else {
            input::parse_user_command(&line.line)
        };

        if let Err(err) = input::validate_command(&parsed) {
            eprintln!("ERR: {err}");
            continue;
        }

        match parsed {
            ParsedCommand::None => continue,
            ParsedCommand::Missing => {
                eprintln!("ERR: missing required argument(s).");
                continue;
            }
            ParsedCommand::Help => {
                println!("{HELP_TEXT}");
            }
            ParsedCommand::Rename { display_name } => {
                shared.details.lock().unwrap().display_name = display_name;
            }
            ParsedCommand::Exit => {
                enqueue(
                    &shared,
                    &OutboundMessage::Bye,
                    MessageFlag::Bye,
                    CommandKind::Exit,
                    Some(SessionEvent::LocalExit),
                )
                .await;
                wait_for_outcome(&shared).await;
                break;
            }
            ParsedCommand::Auth {
                username,
                secret,
                display_name,
            } => {
                if shared.fsm.load().is_authenticated() {
                    eprintln!("ERR: already authenticated.");
                    continue;
                }
                shared.details.lock().unwrap().display_name = display_name.clone();
                let msg = OutboundMessage::Auth {
                    username,
                    display_name,
                    secret,
                };
                enqueue(
                    &shared,
                    &msg,
                    MessageFlag::Auth,
                    CommandKind::Auth,
                    Some(SessionEvent::AuthQueued),
                )
                .await;
                if let Some(Outcome::Ended) = wait_for_outcome(&shared).await {
                    break;
                }
            }
            ParsedCommand::Join { channel } => {
                if !shared.fsm.load().is_authenticated() {
                    eprintln!("ERR: you must authenticate before joining a channel.");
                    continue;
                }
                let display_name = shared.details.lock().unwrap().display_name.clone();
                shared.details.lock().unwrap().channel_id = channel.clone();
                let msg = OutboundMessage::Join {
                    channel,
                    display_name,
                };
                enqueue(
                    &shared,
                    &msg,
                    MessageFlag::None,
                    CommandKind::Join,
                    Some(SessionEvent::JoinQueued),
                )
                .await;
                if let Some(Outcome::Ended) = wait_for_outcome(&shared).await {
                    break;
                }
            }
            ParsedCommand::Msg { contents } => {
                if !shared.fsm.load().is_authenticated() {
                    eprintln!("ERR: you must authenticate before sending messages.");
                    continue;
                }
                let display_name = shared.details.lock().unwrap().display_name.clone();
                let msg = OutboundMessage::Msg {
                    display_name,
                    contents,
                };
                enqueue(&shared, &msg, MessageFlag::None, CommandKind::Msg, None).await;
                if shared.transport_kind == TransportKind::Udp {
                    if let Some(Outcome::Ended) = wait_for_outcome(&shared).await {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Assemble `msg` for the active transport, push it to the tail of the
/// outbound queue, apply `event` (if the command has a state-advancing
/// effect of its own, per spec.md §4.4), then wake the Sender.
async fn enqueue(
    shared: &EngineShared,
    msg: &OutboundMessage,
    flags: MessageFlag,
    kind: CommandKind,
    event: Option<SessionEvent>,
) {
    let frame = match shared.transport_kind {
        TransportKind::Udp => udp::assemble_udp(msg, 0),
        TransportKind::Tcp => tcp::assemble_tcp(msg, 0),
    };

    {
        let mut queue = shared.queue.lock().await;
        queue.push_back(&frame, flags, kind);
    }
    if let Some(event) = event {
        shared.fsm.apply(event, shared.transport_kind);
    }
    shared.sender_empty_queue.notify_one();
}

/// Block until the Sender/Receiver deposit a stable outcome for the
/// message Main just enqueued, then take it out of the mailbox.
async fn wait_for_outcome(shared: &EngineShared) -> Option<Outcome> {
    shared.main_cond.notified().await;
    shared.main_mailbox.lock().unwrap().take()
}
