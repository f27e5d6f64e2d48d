//! # Input tokenizer & validator (component A)
//!
//! Reads stdin lines, recognizes the client-only slash commands, and
//! validates the resulting fields against the protocol's word-grammar
//! limits before anything is handed to the codec.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const USERNAME_MAX_LEN: usize = 20;
pub const CHANNEL_MAX_LEN: usize = 128;
pub const SECRET_MAX_LEN: usize = 20;
pub const DISPLAY_NAME_MAX_LEN: usize = 20;
pub const CONTENTS_MAX_LEN: usize = 14000;

/// Local-only command tag. `Conf` and `Err` never originate from stdin —
/// the runtime (component E) uses them to label its own automatic
/// CONFIRM/ERR reactions with the same vocabulary the original's `cmd_t`
/// used for every FSM decision, user-typed or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Auth,
    Join,
    Rename,
    Help,
    Conf,
    Msg,
    Err,
    Exit,
    None,
    Missing,
}

/// The result of tokenizing one stdin line, still unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Auth {
        username: String,
        secret: String,
        display_name: String,
    },
    Join {
        channel: String,
    },
    Rename {
        display_name: String,
    },
    Help,
    Exit,
    Msg {
        contents: String,
    },
    /// An empty line: nothing to send, nothing to report.
    None,
    /// A recognized command with too few tokens.
    Missing,
}

impl ParsedCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            ParsedCommand::Auth { .. } => CommandKind::Auth,
            ParsedCommand::Join { .. } => CommandKind::Join,
            ParsedCommand::Rename { .. } => CommandKind::Rename,
            ParsedCommand::Help => CommandKind::Help,
            ParsedCommand::Exit => CommandKind::Exit,
            ParsedCommand::Msg { .. } => CommandKind::Msg,
            ParsedCommand::None => CommandKind::None,
            ParsedCommand::Missing => CommandKind::Missing,
        }
    }
}

/// Which word-class a slice is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterClass {
    /// Username, channel, secret: `[A-Za-z0-9-]`.
    Credential,
    /// Display name: printable `0x21..=0x7E` (no space).
    DisplayName,
    /// Message/error contents: printable `0x20..=0x7E` (space allowed).
    Contents,
}

/// Per-character validation, returning `false` on the first violation or
/// if `word` is empty or exceeds `max_len`.
pub fn validate_word(word: &str, max_len: usize, class: CharacterClass) -> bool {
    if word.is_empty() || word.len() > max_len {
        return false;
    }
    word.bytes().all(|b| match class {
        CharacterClass::Credential => b.is_ascii_alphanumeric() || b == b'-',
        CharacterClass::DisplayName => (0x21..=0x7E).contains(&b),
        CharacterClass::Contents => b == 0x20 || (0x21..=0x7E).contains(&b),
    })
}

/// Which field failed validation, for the stderr diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Username,
    Secret,
    Channel,
    DisplayName,
    Contents,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let field = match self {
            ValidationError::Username => "username",
            ValidationError::Secret => "secret",
            ValidationError::Channel => "channel ID",
            ValidationError::DisplayName => "display name",
            ValidationError::Contents => "message contents",
        };
        write!(f, "invalid {field}")
    }
}

/// Validate every field of an already-tokenized command. `Help`/`Exit`/
/// `None`/`Missing` carry nothing to validate and always pass.
pub fn validate_command(cmd: &ParsedCommand) -> Result<(), ValidationError> {
    match cmd {
        ParsedCommand::Auth {
            username,
            secret,
            display_name,
        } => {
            if !validate_word(username, USERNAME_MAX_LEN, CharacterClass::Credential) {
                return Err(ValidationError::Username);
            }
            if !validate_word(secret, SECRET_MAX_LEN, CharacterClass::Credential) {
                return Err(ValidationError::Secret);
            }
            if !validate_word(display_name, DISPLAY_NAME_MAX_LEN, CharacterClass::DisplayName) {
                return Err(ValidationError::DisplayName);
            }
            Ok(())
        }
        ParsedCommand::Join { channel } => {
            if !validate_word(channel, CHANNEL_MAX_LEN, CharacterClass::Credential) {
                return Err(ValidationError::Channel);
            }
            Ok(())
        }
        ParsedCommand::Rename { display_name } => {
            if !validate_word(display_name, DISPLAY_NAME_MAX_LEN, CharacterClass::DisplayName) {
                return Err(ValidationError::DisplayName);
            }
            Ok(())
        }
        ParsedCommand::Msg { contents } => {
            if !validate_word(contents, CONTENTS_MAX_LEN, CharacterClass::Contents) {
                return Err(ValidationError::Contents);
            }
            Ok(())
        }
        ParsedCommand::Help | ParsedCommand::Exit | ParsedCommand::None | ParsedCommand::Missing => {
            Ok(())
        }
    }
}

/// Tokenize one stdin line (already stripped of its trailing newline is
/// not required — this strips `\n`/`\r` itself) into a `ParsedCommand`.
/// Scans only the first whitespace-delimited token; anything that isn't
/// a recognized slash command becomes a `Msg` carrying the whole line.
pub fn parse_user_command(line: &str) -> ParsedCommand {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let mut tokens = trimmed.split_whitespace();

    match tokens.next() {
        Some("/auth") => {
            let username = tokens.next();
            let secret = tokens.next();
            let display_name = tokens.next();
            match (username, secret, display_name) {
                (Some(username), Some(secret), Some(display_name)) => ParsedCommand::Auth {
                    username: username.to_string(),
                    secret: secret.to_string(),
                    display_name: display_name.to_string(),
                },
                _ => ParsedCommand::Missing,
            }
        }
        Some("/join") => match tokens.next() {
            Some(channel) => ParsedCommand::Join {
                channel: channel.to_string(),
            },
            None => ParsedCommand::Missing,
        },
        Some("/rename") => match tokens.next() {
            Some(display_name) => ParsedCommand::Rename {
                display_name: display_name.to_string(),
            },
            None => ParsedCommand::Missing,
        },
        Some("/help") => ParsedCommand::Help,
        Some("/exit") => ParsedCommand::Exit,
        Some(_) => ParsedCommand::Msg {
            contents: trimmed.to_string(),
        },
        None => ParsedCommand::None,
    }
}

/// One read from stdin: the line text (newline stripped by the caller's
/// tokenizer, not here) and whether this read observed EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdinLine {
    pub line: String,
    pub eof: bool,
}

/// Read a single line from `reader`, growing its internal buffer as
/// needed (handled by `tokio`'s own `String` growth, matching the
/// original's geometric-growth buffer without reimplementing it).
/// A zero-byte read is EOF (Ctrl-D); Ctrl-C is never observed here — it
/// is handled out-of-band by the SIGINT task (component E).
pub async fn read_line_from_stdin<R>(reader: &mut R) -> std::io::Result<StdinLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = String::new();
    let bytes_read = reader.read_line(&mut buf).await?;
    Ok(StdinLine {
        line: buf,
        eof: bytes_read == 0,
    })
}
