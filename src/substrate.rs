// src/substrate.rs

//! The substrate contract the Channel consumes (§6): a send operation and an
//! inbound event source, symmetric in both peer contexts. Not reimplemented
//! here for the real browser case except behind the `wasm` feature — the
//! substrate itself is out of scope per §1, but a crate needs at least one
//! concrete implementation to be useful outside a test harness.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The interface a host primitive must expose for the Channel to ride on.
///
/// Mirrors `window.postMessage`: `send` takes the payload and the identity
/// the message should be restricted to (a target origin, or `"*"`); the
/// registered callback receives `(payload, sender_identity)` for every
/// inbound message, symmetric in both peer contexts.
pub trait Substrate {
    /// Hand `payload` to the peer, scoped to `peer_identity`.
    fn send(&self, payload: &str, peer_identity: &str);

    /// Register the single callback invoked for every inbound message.
    /// Replaces any previously registered callback.
    fn on_message(&self, callback: Rc<dyn Fn(&str, &str)>);

    /// Detach the listener. Idempotent; further `send`s are no-ops.
    fn close(&self);
}

struct EndState {
    callback: RefCell<Option<Rc<dyn Fn(&str, &str)>>>,
}

impl EndState {
    fn new() -> Rc<Self> {
        Rc::new(EndState {
            callback: RefCell::new(None),
        })
    }
}

/// An in-process substrate pair, in the style of an in-process transport's
/// `pair` constructor — realized synchronously here (a direct call into the
/// peer's registered callback) rather than over an async mpsc channel,
/// matching this crate's single-threaded cooperative
/// model where a substrate delivery is itself the discrete event.
pub struct MemSubstrate {
    my_identity: String,
    own_state: Rc<EndState>,
    peer_state: Rc<EndState>,
    closed: Rc<Cell<bool>>,
}

impl MemSubstrate {
    /// Build a connected pair of in-process substrates, presenting
    /// `identity_a`/`identity_b` to each other as sender identity.
    pub fn pair(identity_a: impl Into<String>, identity_b: impl Into<String>) -> (Self, Self) {
        let state_a = EndState::new();
        let state_b = EndState::new();
        let closed_a = Rc::new(Cell::new(false));
        let closed_b = Rc::new(Cell::new(false));

        let a = MemSubstrate {
            my_identity: identity_a.into(),
            own_state: state_a.clone(),
            peer_state: state_b.clone(),
            closed: closed_a,
        };
        let b = MemSubstrate {
            my_identity: identity_b.into(),
            own_state: state_b,
            peer_state: state_a,
            closed: closed_b,
        };
        (a, b)
    }
}

impl Substrate for MemSubstrate {
    fn send(&self, payload: &str, _peer_identity: &str) {
        if self.closed.get() {
            return;
        }
        let callback = self.peer_state.callback.borrow().clone();
        if let Some(callback) = callback {
            callback(payload, &self.my_identity);
        }
    }

    fn on_message(&self, callback: Rc<dyn Fn(&str, &str)>) {
        *self.own_state.callback.borrow_mut() = Some(callback);
    }

    fn close(&self) {
        self.closed.set(true);
        *self.own_state.callback.borrow_mut() = None;
    }
}

#[cfg(feature = "wasm")]
pub mod window;
