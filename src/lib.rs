//! # IPK24-CHAT client core
//!
//! A dual-transport (UDP/TCP) chat protocol engine: a bit-exact wire
//! codec, a client-side reliability layer for UDP (message ids, CONFIRM
//! acknowledgements, bounded retries), a session finite-state machine,
//! and a three-actor concurrency model (stdin producer, network sender,
//! network receiver) coordinated through a shared outbound queue and a
//! signal-driven shutdown path.
//!
//! `main.rs` is the only external collaborator: it parses CLI arguments,
//! resolves the server hostname, and constructs a connected transport
//! handle, then hands all three to [`runtime::ChatEngine`].

pub mod cli;
pub mod codec;
pub mod error;
pub mod input;
pub mod logging;
pub mod queue;
pub mod runtime;
pub mod session;
pub mod transport;

pub use cli::Args;
pub use runtime::ChatEngine;
