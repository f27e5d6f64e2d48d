//! # Command-Line Interface Module
//!
//! Argument parsing for the chat client (component F), using `clap`'s
//! derive API the same way the IPC benchmark this crate descends from
//! builds its `Args` struct: one flat struct, short+long forms, and a
//! `ValueEnum` for the one mandatory choice (transport).
//!
//! ## Usage
//!
//! ```bash
//! ipk24chat-client -s chat.example.com -t udp
//! ipk24chat-client -s chat.example.com -t tcp -p 4567 -v -v
//! ```

use std::path::PathBuf;

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, ValueEnum,
};

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// IPK24-CHAT client — connects to a chat server over UDP or TCP and
/// exchanges AUTH/JOIN/MSG traffic per the IPK24-CHAT protocol.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Server hostname or IP address to connect to.
    #[arg(short = 's', long = "server")]
    pub server: String,

    /// Transport protocol to use for the session.
    #[arg(short = 't', long = "transport")]
    pub transport: Transport,

    /// Server port.
    #[arg(short = 'p', long = "port", default_value_t = 4567)]
    pub port: u16,

    /// UDP confirmation timeout in milliseconds. Ignored (with a debug
    /// log line) when `--transport tcp` is selected.
    #[arg(short = 'd', long = "timeout", default_value_t = 250)]
    pub timeout_ms: u16,

    /// Maximum UDP retransmissions before giving up on a message. Ignored
    /// (with a debug log line) when `--transport tcp` is selected.
    #[arg(short = 'r', long = "retries", default_value_t = 3)]
    pub retries: u8,

    /// Increase diagnostic verbosity: 0=WARN, 1=INFO, 2=DEBUG, 3+=TRACE.
    /// Independent of the protocol-mandated stdout/stderr contract, which
    /// is never gated by verbosity.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Where detailed diagnostics go: a file path, or the literal value
    /// `stderr` to route them to stderr instead of a daily-rotated file.
    #[arg(long = "log-file", default_value = "stderr")]
    pub log_file: String,
}

/// Transport selection, mandatory per spec.md §6.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Udp => write!(f, "udp"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

impl Args {
    /// Resolve `--log-file` into a concrete destination, matching the
    /// teacher's `main.rs` stderr-vs-rotating-file branch.
    pub fn log_destination(&self) -> LogDestination {
        if self.log_file.eq_ignore_ascii_case("stderr") {
            LogDestination::Stderr
        } else {
            LogDestination::RotatingFile(PathBuf::from(&self.log_file))
        }
    }

    /// Map the verbosity count to a `tracing` level filter.
    pub fn level_filter(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    RotatingFile(PathBuf),
}
