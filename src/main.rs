//! # IPK24-CHAT client — binary entry point (component F)
//!
//! Performs the external-collaborator duties spec.md places out of the
//! core's scope: CLI argument parsing, hostname resolution, socket
//! construction, and logging setup. Once a connected transport is in
//! hand, the core (components A-E, behind [`ChatEngine`]) takes over.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use ipk24chat::cli::{Args, LogDestination, Transport};
use ipk24chat::error::exit_code;
use ipk24chat::logging::ColorizedFormatter;
use ipk24chat::runtime::ChatEngine;
use ipk24chat::session::TransportKind;
use ipk24chat::transport::{ConnectedTransport, DEFAULT_BUFFER_SIZE};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let result = run(args).await;
    if let Err(ref err) = result {
        error!("{err:#}");
    }
    std::process::exit(exit_code(&result));
}

/// Wire up `tracing` per the CLI's `-v`/`--log-file` flags: a daily
/// rotating file by default, or stderr when `--log-file stderr` is
/// given. The returned guard must stay alive for the process lifetime —
/// dropping it early stops the non-blocking file writer from flushing.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = LevelFilter::from_level(args.level_filter());

    match args.log_destination() {
        LogDestination::Stderr => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .event_format(ColorizedFormatter)
                        .with_writer(std::io::stderr)
                        .with_filter(level),
                )
                .init();
            None
        }
        LogDestination::RotatingFile(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let filename = path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("ipk24chat.log"));
            let appender = tracing_appender::rolling::daily(dir, filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(level),
                )
                .init();
            Some(guard)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if args.transport == Transport::Tcp {
        debug!("'-d'/'-r' (UDP confirmation timeout/retries) are ignored for TCP transport");
    }

    let transport_kind = match args.transport {
        Transport::Udp => TransportKind::Udp,
        Transport::Tcp => TransportKind::Tcp,
    };

    let peer = resolve_peer(&args.server, args.port).await?;
    info!(%peer, transport = %args.transport, "connecting");

    let transport = ConnectedTransport::connect(transport_kind, peer, DEFAULT_BUFFER_SIZE)
        .await
        .with_context(|| format!("failed to establish {} transport to {peer}", args.transport))?;

    let engine = ChatEngine::new(
        transport_kind,
        Duration::from_millis(args.timeout_ms as u64),
        args.retries,
    );

    engine.run(transport).await
}

/// Resolve `host:port` and take the first address the resolver offers,
/// matching spec.md §6's "hostname resolution" external-collaborator duty.
async fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve host {host}"))?
        .next()
        .ok_or_else(|| anyhow!("no addresses found for host {host}"))
}
