// tests/support/mod.rs
//
// Fault-injected substrate for property-style tests, using a basis-points
// drop/duplicate rate. Not part of the public API: test tooling only,
// proving that a misbehaving or restarted peer (dropped/duplicated frames)
// never corrupts the protocol's invariants — origin/scope checks aren't
// bypassed, and the transaction table never grows stuck entries from a
// dropped reply.

use std::cell::Cell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

use frame_channel::Substrate;

/// Wraps a [`Substrate`] and probabilistically drops or duplicates outbound
/// sends, after they've already passed through the wrapped Channel's own
/// codec/origin/scope logic — fault injection never masks a validation bug,
/// it only simulates substrate unreliability.
pub struct FaultSubstrate {
    inner: Rc<dyn Substrate>,
    drop_rate_bp: Cell<u32>,
    duplicate_rate_bp: Cell<u32>,
    counter: Cell<u64>,
    random_state: RandomState,
}

impl FaultSubstrate {
    pub fn wrap(inner: Rc<dyn Substrate>) -> Rc<Self> {
        Rc::new(FaultSubstrate {
            inner,
            drop_rate_bp: Cell::new(0),
            duplicate_rate_bp: Cell::new(0),
            counter: Cell::new(0),
            random_state: RandomState::new(),
        })
    }

    /// Drop rate in basis points (0-10000 = 0.00%-100.00%). Clamped to 10000.
    pub fn set_drop_rate(&self, rate: u32) {
        self.drop_rate_bp.set(rate.min(10_000));
    }

    /// Duplicate rate in basis points. Clamped to 10000.
    pub fn set_duplicate_rate(&self, rate: u32) {
        self.duplicate_rate_bp.set(rate.min(10_000));
    }

    fn rand_percent(&self) -> u32 {
        let counter = self.counter.get();
        self.counter.set(counter + 1);
        let mut hasher = self.random_state.build_hasher();
        counter.hash(&mut hasher);
        (hasher.finish() % 10_000) as u32
    }
}

impl Substrate for FaultSubstrate {
    fn send(&self, payload: &str, peer_identity: &str) {
        if self.drop_rate_bp.get() > 0 && self.rand_percent() < self.drop_rate_bp.get() {
            return;
        }
        self.inner.send(payload, peer_identity);
        if self.duplicate_rate_bp.get() > 0 && self.rand_percent() < self.duplicate_rate_bp.get() {
            self.inner.send(payload, peer_identity);
        }
    }

    fn on_message(&self, callback: Rc<dyn Fn(&str, &str)>) {
        self.inner.on_message(callback);
    }

    fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_channel::MemSubstrate;
    use std::cell::RefCell;

    #[test]
    fn hundred_percent_drop_delivers_nothing() {
        let (a, b) = MemSubstrate::pair("a", "b");
        let faulty = FaultSubstrate::wrap(Rc::new(a));
        faulty.set_drop_rate(10_000);

        let received = Rc::new(RefCell::new(0));
        let received_hook = received.clone();
        b.on_message(Rc::new(move |_, _| *received_hook.borrow_mut() += 1));

        faulty.send("hello", "b");
        assert_eq!(*received.borrow(), 0);
    }

    #[test]
    fn zero_percent_drop_delivers_everything() {
        let (a, b) = MemSubstrate::pair("a", "b");
        let faulty = FaultSubstrate::wrap(Rc::new(a));

        let received = Rc::new(RefCell::new(0));
        let received_hook = received.clone();
        b.on_message(Rc::new(move |_, _| *received_hook.borrow_mut() += 1));

        faulty.send("hello", "b");
        assert_eq!(*received.borrow(), 1);
    }

    #[test]
    fn hundred_percent_duplicate_delivers_twice() {
        let (a, b) = MemSubstrate::pair("a", "b");
        let faulty = FaultSubstrate::wrap(Rc::new(a));
        faulty.set_duplicate_rate(10_000);

        let received = Rc::new(RefCell::new(0));
        let received_hook = received.clone();
        b.on_message(Rc::new(move |_, _| *received_hook.borrow_mut() += 1));

        faulty.send("hello", "b");
        assert_eq!(*received.borrow(), 2);
    }
}
