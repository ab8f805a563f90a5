// src/handshake.rs

//! The two-step ready handshake: establishes that both peers are listening,
//! fixes this side's transaction-id parity, and buffers outbound traffic
//! until both are confirmed.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};

use serde_json::Value;

use crate::transaction::Parity;

/// Reserved method name for the handshake notification.
pub const READY_METHOD: &str = "__ready";

const PING_PAYLOAD: &str = "ping";
const PONG_PAYLOAD: &str = "pong";

/// Which half of the handshake this side played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the first `ping`; kept odd parity.
    Ping,
    /// Replied with `pong`; pushed to even parity.
    Pong,
}

impl Role {
    /// The identity suffix assigned to this role, per the identity scheme:
    /// `"-R"` for the ping side, `"-L"` for the pong side.
    pub fn identity_suffix(self) -> &'static str {
        match self {
            Role::Ping => "-R",
            Role::Pong => "-L",
        }
    }

    fn parity(self) -> Parity {
        match self {
            Role::Ping => Parity::Odd,
            Role::Pong => Parity::Even,
        }
    }
}

/// Outcome of processing one inbound `__ready` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// We received `ping`: reply with `pong` and become ready.
    ReceivedPing,
    /// We received `pong`: no reply needed, become ready.
    ReceivedPong,
}

/// Tracks whether the two-step handshake has completed for this side.
pub struct ReadyGate {
    role: Option<Role>,
}

impl ReadyGate {
    pub fn new() -> Self {
        ReadyGate { role: None }
    }

    pub fn is_ready(&self) -> bool {
        self.role.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Process an inbound `__ready` payload. Returns the resulting role and
    /// event, or `None` if the payload is neither `"ping"` nor `"pong"`.
    ///
    /// Receiving a second `__ready` while already ready is a programming
    /// error in the peer and is reported as such by the caller (the gate
    /// itself just refuses to downgrade an already-assigned role).
    pub fn on_ready_notification(&mut self, payload: &Value) -> Option<(Role, HandshakeEvent)> {
        if self.role.is_some() {
            return None;
        }
        let text = payload.as_str()?;
        let (role, event) = match text {
            PING_PAYLOAD => (Role::Ping, HandshakeEvent::ReceivedPing),
            PONG_PAYLOAD => (Role::Pong, HandshakeEvent::ReceivedPong),
            _ => return None,
        };
        self.role = Some(role);
        Some((role, event))
    }

    /// True once a second `__ready` arrives after we are already ready —
    /// the fatal double-handshake case.
    pub fn is_duplicate_ready(&self, payload: &Value) -> bool {
        self.role.is_some() && matches!(payload.as_str(), Some(PING_PAYLOAD) | Some(PONG_PAYLOAD))
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ping_payload() -> Value {
    Value::String(PING_PAYLOAD.to_string())
}

pub fn pong_payload() -> Value {
    Value::String(PONG_PAYLOAD.to_string())
}

/// Apply a handshake role to the id allocator, fixing its parity.
pub fn lock_parity(ids: &mut crate::transaction::TransactionIds, role: Role) {
    ids.lock(role.parity());
}

/// Generate the opaque 5-character identity token, independent of role.
///
/// Hashes a fresh [`RandomState`]'s keys rather than pulling in `rand` for a
/// one-off 5-character token.
pub fn random_token() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..5u8)
        .map(|i| {
            let mut hasher = RandomState::new().build_hasher();
            hasher.write_u8(i);
            let hash = hasher.finish();
            ALPHABET[(hash as usize) % ALPHABET.len()] as char
        })
        .collect()
}

/// A FIFO buffer of outbound wire frames, held until the handshake completes.
#[derive(Default)]
pub struct PendingQueue {
    frames: Vec<String>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: String) {
        self.frames.push(frame);
    }

    /// Drain in FIFO order — the documented contract, not the tail-popping
    /// (LIFO) behavior of the source this was distilled from.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
