//! TCP line framing: CRLF-terminated ASCII keyword grammar, case-insensitive
//! keyword matching on decode, canonical-case keywords on encode. There is
//! no message-id header on the wire; `msg_id` is tracked only in memory for
//! FSM bookkeeping symmetry with the UDP transport.

use super::{OutboundMessage, ProtocolRecord};

/// Assemble `message` into a CRLF-terminated TCP line. `msg_id` is accepted
/// for call-site symmetry with `assemble_udp` but never appears on the wire.
pub fn assemble_tcp(message: &OutboundMessage, _msg_id: u16) -> Vec<u8> {
    let line = match message {
        OutboundMessage::Auth {
            username,
            display_name,
            secret,
        } => format!("AUTH {username} AS {display_name} USING {secret}"),
        OutboundMessage::Join {
            channel,
            display_name,
        } => format!("JOIN {channel} AS {display_name}"),
        OutboundMessage::Msg {
            display_name,
            contents,
        } => format!("MSG FROM {display_name} IS {contents}"),
        OutboundMessage::Err {
            display_name,
            contents,
        } => format!("ERR FROM {display_name} IS {contents}"),
        OutboundMessage::Bye => "BYE".to_string(),
        OutboundMessage::Confirm { .. } => {
            // TCP has no reliability layer of its own; CONFIRM never goes
            // out over this transport. Callers must not reach this arm.
            unreachable!("CONFIRM is not sent over TCP")
        }
    };

    let mut out = line.into_bytes();
    out.extend_from_slice(b"\r\n");
    out
}

/// Decode a single received TCP line (without its trailing CRLF) into a
/// `ProtocolRecord`. Keyword matching is case-insensitive; the returned
/// `msg_id` is always `0` since TCP frames carry none.
pub fn disassemble_tcp(line: &[u8]) -> ProtocolRecord<'_> {
    let Ok(text) = std::str::from_utf8(line) else {
        return ProtocolRecord::Corrupted(None);
    };
    let mut words = text.split(' ').filter(|w| !w.is_empty());
    let Some(keyword) = words.next() else {
        return ProtocolRecord::Unknown(None);
    };

    match keyword.to_ascii_uppercase().as_str() {
        "REPLY" => parse_reply(text),
        "MSG" => parse_display_and_contents(text, "MSG", "FROM", "IS")
            .map(|(display_name, contents)| ProtocolRecord::Msg {
                msg_id: 0,
                display_name,
                contents,
            })
            .unwrap_or(ProtocolRecord::Corrupted(None)),
        "ERR" => parse_display_and_contents(text, "ERR", "FROM", "IS")
            .map(|(display_name, contents)| ProtocolRecord::Err {
                msg_id: 0,
                display_name,
                contents,
            })
            .unwrap_or(ProtocolRecord::Corrupted(None)),
        "BYE" => ProtocolRecord::Bye { msg_id: 0 },
        "AUTH" | "JOIN" | "CONFIRM" => {
            // These are client-to-server keywords; a conforming server never
            // sends them back. Treat as unknown rather than guessing a parse.
            ProtocolRecord::Unknown(None)
        }
        _ => ProtocolRecord::Unknown(None),
    }
}

fn parse_reply(text: &str) -> ProtocolRecord<'_> {
    // "REPLY {OK|NOK} IS {contents}"
    let mut parts = text.splitn(2, ' ');
    parts.next();
    let Some(remainder) = parts.next() else {
        return ProtocolRecord::Corrupted(None);
    };

    let Some((status_word, remainder)) = remainder.split_once(' ') else {
        return ProtocolRecord::Corrupted(None);
    };
    let result = match status_word.to_ascii_uppercase().as_str() {
        "OK" => true,
        "NOK" => false,
        _ => return ProtocolRecord::Corrupted(None),
    };

    let Some((_, contents)) = strip_leading_keyword_ci(remainder, "IS ") else {
        return ProtocolRecord::Corrupted(None);
    };

    ProtocolRecord::Reply {
        msg_id: 0,
        result,
        ref_msg_id: 0,
        contents: contents.as_bytes(),
    }
}

/// Parse the common `{KEYWORD} {display_name} {MIDDLE} {contents}` shape
/// shared by MSG and ERR lines, matching `keyword` and `middle` without
/// regard to case.
fn parse_display_and_contents<'a>(
    text: &'a str,
    keyword: &str,
    middle: &str,
    tail: &str,
) -> Option<(&'a [u8], &'a [u8])> {
    let mut parts = text.splitn(2, ' ');
    let head = parts.next()?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let remainder = parts.next()?;
    let (display_name, remainder) = remainder.split_once(' ')?;
    let stripped = strip_word_ci(remainder, middle)?;
    let (_, contents) = strip_leading_keyword_ci(stripped, tail)?;
    Some((display_name.as_bytes(), contents.as_bytes()))
}

fn strip_word_ci<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let (head, rest) = text.split_once(' ').unwrap_or((text, ""));
    if head.eq_ignore_ascii_case(word) {
        Some(rest)
    } else {
        None
    }
}

fn strip_leading_keyword_ci<'a>(text: &'a str, word: &str) -> Option<(&'a str, &'a str)> {
    if text.len() < word.len() {
        return None;
    }
    let (head, rest) = text.split_at(word.len());
    if head.eq_ignore_ascii_case(word) {
        Some((head, rest))
    } else {
        None
    }
}
