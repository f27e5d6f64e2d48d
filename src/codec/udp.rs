//! UDP datagram framing: one-byte kind tag, two-byte big-endian message id,
//! then a kind-specific body. String fields are NUL-terminated rather than
//! length-prefixed, matching the wire format the original assembler wrote.

use super::{find_zero, MessageKind, OutboundMessage, ProtocolRecord};

/// Assemble `message` into a UDP datagram. The message id header bytes are
/// written as `msg_id`; CONFIRM has no body and the header id itself is the
/// id being confirmed (callers pass the referenced id as `msg_id`).
pub fn assemble_udp(message: &OutboundMessage, msg_id: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.push(message.kind() as u8);
    out.extend_from_slice(&msg_id.to_be_bytes());

    match message {
        OutboundMessage::Confirm { .. } | OutboundMessage::Bye => {
            // No body: CONFIRM carries only the header, BYE carries only its id.
        }
        OutboundMessage::Auth {
            username,
            display_name,
            secret,
        } => {
            out.extend_from_slice(username.as_bytes());
            out.push(0);
            out.extend_from_slice(display_name.as_bytes());
            out.push(0);
            out.extend_from_slice(secret.as_bytes());
            out.push(0);
        }
        OutboundMessage::Join {
            channel,
            display_name,
        } => {
            out.extend_from_slice(channel.as_bytes());
            out.push(0);
            out.extend_from_slice(display_name.as_bytes());
            out.push(0);
        }
        OutboundMessage::Msg {
            display_name,
            contents,
        }
        | OutboundMessage::Err {
            display_name,
            contents,
        } => {
            out.extend_from_slice(display_name.as_bytes());
            out.push(0);
            out.extend_from_slice(contents.as_bytes());
            out.push(0);
        }
    }

    out
}

/// Stamp the message-id header bytes of an already-assembled UDP datagram.
/// Used by the Sender when a queued entry is handed its id at send time
/// rather than at assembly time.
pub fn stamp_msg_id(frame: &mut [u8], msg_id: u16) {
    if frame.len() >= 3 {
        frame[1..3].copy_from_slice(&msg_id.to_be_bytes());
    }
}

/// Read the message-id header bytes out of an assembled or received datagram.
pub fn read_msg_id(frame: &[u8]) -> Option<u16> {
    if frame.len() < 3 {
        return None;
    }
    Some(u16::from_be_bytes([frame[1], frame[2]]))
}

/// Decode a received UDP datagram into a `ProtocolRecord`. Unrecognized
/// kind bytes produce `Unknown`; a recognized kind whose body doesn't
/// parse produces `Corrupted`.
pub fn disassemble_udp(datagram: &[u8]) -> ProtocolRecord<'_> {
    if datagram.len() < 3 {
        return ProtocolRecord::Corrupted(None);
    }
    let msg_id = u16::from_be_bytes([datagram[1], datagram[2]]);
    let kind = match MessageKind::from_u8(datagram[0]) {
        Some(kind) => kind,
        None => return ProtocolRecord::Unknown(Some(msg_id)),
    };
    let body = &datagram[3..];

    match kind {
        MessageKind::Confirm => ProtocolRecord::Confirm { msg_id },
        MessageKind::Bye => ProtocolRecord::Bye { msg_id },
        MessageKind::Reply => {
            if body.is_empty() {
                return ProtocolRecord::Corrupted(Some(msg_id));
            }
            let result = body[0] != 0;
            if body.len() < 3 {
                return ProtocolRecord::Corrupted(Some(msg_id));
            }
            let ref_msg_id = u16::from_be_bytes([body[1], body[2]]);
            let contents = &body[3..];
            let Some(term) = find_zero(contents) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            ProtocolRecord::Reply {
                msg_id,
                result,
                ref_msg_id,
                contents: &contents[..term],
            }
        }
        MessageKind::Auth => {
            let Some((username, rest)) = split_at_nul(body) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            let Some((display_name, rest)) = split_at_nul(rest) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            let Some((secret, _)) = split_at_nul(rest) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            ProtocolRecord::Auth {
                msg_id,
                username,
                display_name,
                secret,
            }
        }
        MessageKind::Join => {
            let Some((channel, rest)) = split_at_nul(body) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            let Some((display_name, _)) = split_at_nul(rest) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            ProtocolRecord::Join {
                msg_id,
                channel,
                display_name,
            }
        }
        MessageKind::Msg | MessageKind::Err => {
            let Some((display_name, rest)) = split_at_nul(body) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            let Some((contents, _)) = split_at_nul(rest) else {
                return ProtocolRecord::Corrupted(Some(msg_id));
            };
            if matches!(kind, MessageKind::Msg) {
                ProtocolRecord::Msg {
                    msg_id,
                    display_name,
                    contents,
                }
            } else {
                ProtocolRecord::Err {
                    msg_id,
                    display_name,
                    contents,
                }
            }
        }
    }
}

/// Split `body` at the first NUL byte, returning the field before it and
/// the remainder after it. Returns `None` if no terminator is present.
fn split_at_nul(body: &[u8]) -> Option<(&[u8], &[u8])> {
    let term = find_zero(body)?;
    Some((&body[..term], &body[term + 1..]))
}
