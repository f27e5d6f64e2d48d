//! # Session FSM (component D)
//!
//! States are represented by `SessionState`, stored in an `AtomicU8` so
//! Sender and Receiver can read/write it without a dedicated mutex. Every
//! transition is computed by the pure function `next`, which never
//! mutates anything itself — callers compute the next state, then
//! perform exactly one atomic store, so no transition is ever observed
//! half-applied.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// The events that can drive an FSM transition. TCP has no CONFIRM frame
/// on the wire, so `Transmitted` alone ends a BYE/ERR detour on TCP,
/// while UDP additionally waits for `ConfirmReceived` before reaching
/// `End` — `next` picks the right arm per `TransportKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    AuthQueued,
    /// The head of the outbound queue was physically sent. Generic across
    /// AUTH, the post-REPLY CONFIRM, and BYE — which one applies is
    /// determined by the current state.
    Transmitted,
    /// A CONFIRM frame matching the awaited id arrived (UDP only).
    ConfirmReceived,
    ReplyPositive,
    ReplyNegative,
    JoinQueued,
    JoinReplyReceived,
    ErrOrUnknownFrame,
    ByeReceived,
    LocalExit,
    Sigint,
}

/// Session FSM state, mirroring the original's `fsm_t` enum exactly
/// (spec.md §4.4), stored as a `u8` discriminant so it fits in an
/// `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Start = 0,
    AuthW82BeSent = 1,
    AuthSent = 2,
    W84Reply = 3,
    W84ReplyConf = 4,
    Open = 5,
    JoinAtempt = 6,
    EmptyQBye = 7,
    ByeRecv = 8,
    Err = 9,
    ErrW84Conf = 10,
    EndW84Conf = 11,
    SigintBye = 12,
    End = 13,
}

impl SessionState {
    fn from_u8(byte: u8) -> Self {
        match byte {
            0 => Self::Start,
            1 => Self::AuthW82BeSent,
            2 => Self::AuthSent,
            3 => Self::W84Reply,
            4 => Self::W84ReplyConf,
            5 => Self::Open,
            6 => Self::JoinAtempt,
            7 => Self::EmptyQBye,
            8 => Self::ByeRecv,
            9 => Self::Err,
            10 => Self::ErrW84Conf,
            11 => Self::EndW84Conf,
            12 => Self::SigintBye,
            13 => Self::End,
            _ => unreachable!("invalid SessionState discriminant"),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::End)
    }

    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            SessionState::Open | SessionState::JoinAtempt | SessionState::EmptyQBye
        )
    }
}

/// Whether the transport is UDP (which has CONFIRM/retransmission
/// detours) or TCP (which fast-paths straight to `End`, having no
/// CONFIRM frame of its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Udp,
    Tcp,
}

/// Pure transition function: given the current state, the incoming
/// event, and which transport is in use, compute the next state. Returns
/// `None` when `event` has no defined effect in `state` (the caller
/// leaves the state unchanged).
pub fn next(state: SessionState, event: SessionEvent, transport: TransportKind) -> Option<SessionState> {
    use SessionEvent::*;
    use SessionState::*;
    use TransportKind::*;

    match (state, event, transport) {
        (Start, AuthQueued, _) => Some(AuthW82BeSent),
        (AuthW82BeSent, Transmitted, _) => Some(AuthSent),

        // UDP waits for the transport-level CONFIRM before treating AUTH as
        // delivered; TCP has no such frame, so transmission alone suffices.
        (AuthSent, ConfirmReceived, Udp) => Some(W84Reply),
        (AuthSent, Transmitted, Tcp) => Some(W84Reply),

        (W84Reply, ReplyPositive, Udp) => Some(W84ReplyConf),
        (W84Reply, ReplyPositive, Tcp) => Some(Open),
        (W84Reply, ReplyNegative, _) => Some(Start),
        (W84ReplyConf, Transmitted, Udp) => Some(Open),

        (Open, JoinQueued, _) => Some(JoinAtempt),
        (JoinAtempt, JoinReplyReceived, _) => Some(Open),

        (state, ErrOrUnknownFrame, _) if !state.is_terminal() => Some(Err),
        (Err, Transmitted, Udp) => Some(ErrW84Conf),
        (Err, Transmitted, Tcp) => Some(End),
        (ErrW84Conf, ConfirmReceived, Udp) => Some(End),

        (state, ByeReceived, Udp) if !state.is_terminal() => Some(ByeRecv),
        (state, ByeReceived, Tcp) if !state.is_terminal() => Some(End),
        (ByeRecv, Transmitted, Udp) => Some(End),

        (state, LocalExit, _) if !state.is_terminal() => Some(EmptyQBye),
        (EmptyQBye, Transmitted, Udp) => Some(EndW84Conf),
        (EmptyQBye, Transmitted, Tcp) => Some(End),
        (EndW84Conf, ConfirmReceived, Udp) => Some(End),

        (state, Sigint, _) if !state.is_terminal() => Some(SigintBye),
        (SigintBye, Transmitted, Udp) => Some(EndW84Conf),
        (SigintBye, Transmitted, Tcp) => Some(End),

        _ => None,
    }
}

/// Atomic-backed FSM state cell. `load`/`store` are the Rust analogue of
/// the original's `getProgramState`/`setProgramState` accessors.
#[derive(Debug)]
pub struct SessionFsm {
    state: AtomicU8,
}

impl SessionFsm {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Start as u8),
        }
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Compute `next(load(), event, transport)` and, if it yields a new
    /// state, store it. Returns the resulting state either way.
    pub fn apply(&self, event: SessionEvent, transport: TransportKind) -> SessionState {
        let current = self.load();
        match next(current, event, transport) {
            Some(new_state) => {
                self.store(new_state);
                new_state
            }
            None => current,
        }
    }
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-scoped identity fields the FSM and codec consult when
/// assembling outbound frames: the display name (set once AUTH succeeds,
/// mutable afterward via RENAME), the joined channel id, and the local
/// message counter.
#[derive(Debug, Clone, Default)]
pub struct SessionDetails {
    pub display_name: String,
    pub channel_id: String,
    pub msg_counter: u16,
}

/// `SessionDetails` behind a plain mutex — it changes far less often
/// than the queue or FSM state and is read by every outbound assembly,
/// so a lightweight `std::sync::Mutex` (never held across an `.await`)
/// is enough.
pub type SharedSessionDetails = Mutex<SessionDetails>;
