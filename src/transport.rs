//! # Transport abstraction (component G, **\[FULL\]**)
//!
//! Isolates the core (components A-E) from `tokio::net` specifics behind
//! a small pair of async traits, the same role `IpcTransport` plays for
//! the multi-mechanism benchmark this crate descends from. Only two wire
//! formats exist — UDP and TCP — but the Sender and Receiver actors
//! (component E) own the socket independently, so a connected transport
//! splits into a send half and a receive half rather than being shared
//! behind one lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use crate::session::TransportKind;

/// The result of one bounded receive attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A complete frame: one UDP datagram, or one TCP line with its CRLF
    /// already stripped.
    Frame(Vec<u8>),
    /// The configured read timeout elapsed with nothing received.
    TimedOut,
    /// The peer closed the connection (TCP only; UDP has no such signal).
    Closed,
}

/// The Sender actor's half of a connected transport.
#[async_trait]
pub trait TransportSender: Send {
    async fn send(&mut self, frame: &[u8]) -> Result<()>;
    async fn shutdown(&mut self) -> Result<()>;
}

/// The Receiver actor's half of a connected transport.
#[async_trait]
pub trait TransportReceiver: Send {
    async fn recv(&mut self, read_timeout: Duration) -> Result<RecvOutcome>;
}

/// Default socket buffer size applied to both transports, matching the
/// teacher's default `TransportConfig::buffer_size`.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Largest UDP datagram this client will attempt to send or accept,
/// comfortably above the protocol's largest body (a 14000-byte MSG/ERR
/// plus a handful of header/name bytes) while staying well under a
/// typical path MTU's reassembly ceiling.
pub const MAX_UDP_DATAGRAM: usize = 16 * 1024;

/// A connected, not-yet-split transport. `main.rs` (component F) resolves
/// the hostname and builds this; the engine immediately calls `split` and
/// hands one half to each of the Sender/Receiver actors.
pub enum ConnectedTransport {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl ConnectedTransport {
    /// Bind (UDP) or connect (TCP) to `peer`, tuning socket buffers via
    /// `socket2` the way the teacher's `TcpSocketTransport::start_client`
    /// tunes `TCP_NODELAY` before handing a stream back.
    pub async fn connect(kind: TransportKind, peer: SocketAddr, buffer_size: usize) -> Result<Self> {
        match kind {
            TransportKind::Udp => {
                let local_addr: SocketAddr = if peer.is_ipv6() {
                    "[::]:0".parse().unwrap()
                } else {
                    "0.0.0.0:0".parse().unwrap()
                };
                let socket = UdpSocket::bind(local_addr)
                    .await
                    .with_context(|| format!("failed to bind local UDP socket for {peer}"))?;
                socket
                    .connect(peer)
                    .await
                    .with_context(|| format!("failed to connect UDP socket to {peer}"))?;

                let std_socket = socket.into_std()?;
                let tuned = socket2::Socket::from(std_socket);
                tuned.set_recv_buffer_size(buffer_size)?;
                tuned.set_send_buffer_size(buffer_size)?;
                tuned.set_nonblocking(true)?;
                let socket = UdpSocket::from_std(tuned.into())?;

                debug!("UDP transport connected to {}", peer);
                Ok(ConnectedTransport::Udp(socket))
            }
            TransportKind::Tcp => {
                let stream = TcpStream::connect(peer)
                    .await
                    .with_context(|| format!("failed to connect TCP stream to {peer}"))?;

                let std_stream = stream.into_std()?;
                let tuned = socket2::Socket::from(std_stream.try_clone()?);
                tuned.set_nodelay(true)?;
                tuned.set_recv_buffer_size(buffer_size)?;
                tuned.set_send_buffer_size(buffer_size)?;
                let stream = TcpStream::from_std(std_stream)?;

                debug!("TCP transport connected to {}", peer);
                Ok(ConnectedTransport::Tcp(stream))
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            ConnectedTransport::Udp(_) => TransportKind::Udp,
            ConnectedTransport::Tcp(_) => TransportKind::Tcp,
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match self {
            ConnectedTransport::Udp(socket) => Ok(socket.peer_addr()?),
            ConnectedTransport::Tcp(stream) => Ok(stream.peer_addr()?),
        }
    }

    /// Split into independently-owned send/receive halves, one per actor.
    pub fn split(self) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        match self {
            ConnectedTransport::Udp(socket) => {
                let socket = Arc::new(socket);
                (
                    Box::new(UdpSender {
                        socket: socket.clone(),
                    }),
                    Box::new(UdpReceiver { socket }),
                )
            }
            ConnectedTransport::Tcp(stream) => {
                let (read_half, write_half) = stream.into_split();
                (
                    Box::new(TcpSender { writer: write_half }),
                    Box::new(TcpReceiver {
                        reader: BufReader::new(read_half),
                    }),
                )
            }
        }
    }
}

struct UdpSender {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let sent = self.socket.send(frame).await?;
        if sent != frame.len() {
            return Err(anyhow!(
                "short UDP send: wrote {} of {} bytes",
                sent,
                frame.len()
            ));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        // UDP has no connection teardown; dropping the socket is enough.
        Ok(())
    }
}

struct UdpReceiver {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self, read_timeout: Duration) -> Result<RecvOutcome> {
        let mut buf = vec![0u8; MAX_UDP_DATAGRAM];
        match timeout(read_timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(RecvOutcome::Frame(buf))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(RecvOutcome::TimedOut),
        }
    }
}

struct TcpSender {
    writer: OwnedWriteHalf,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

struct TcpReceiver {
    reader: BufReader<OwnedReadHalf>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self, read_timeout: Duration) -> Result<RecvOutcome> {
        let mut line = Vec::new();
        let read = timeout(read_timeout, self.reader.read_until(b'\n', &mut line)).await;
        match read {
            Ok(Ok(0)) => Ok(RecvOutcome::Closed),
            Ok(Ok(_)) => {
                while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
                    line.pop();
                }
                Ok(RecvOutcome::Frame(line))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(RecvOutcome::TimedOut),
        }
    }
}
