// src/transaction.rs

//! The transaction table: bookkeeping for in-flight calls in both
//! directions, plus id allocation with collision-free parity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::codec::Outcome;
use crate::error::{ChannelError, ErrorPayload};
use crate::params::LocalCallback;

/// Which side of the handshake assigned this Channel's id space.
///
/// The side that sent the first `ping` keeps its counter odd; the side that
/// replies with `pong` is pushed to even. Kept as its own type rather than
/// derived from the counter's value on every allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::Odd => write!(f, "odd"),
            Parity::Even => write!(f, "even"),
        }
    }
}

/// Allocates outbound transaction ids and recognizes the peer's inbound
/// parity, once fixed by the handshake.
///
/// Defaults to odd parity before the handshake completes, so that a `call`
/// issued immediately after `build` (before the peer's `pong` arrives) still
/// gets a usable id; [`TransactionIds::lock`] fixes the final parity exactly
/// once, per the handshake.
pub struct TransactionIds {
    parity: Parity,
    locked: bool,
    step: u64,
}

impl TransactionIds {
    pub fn new() -> Self {
        TransactionIds {
            parity: Parity::Odd,
            locked: false,
            step: 0,
        }
    }

    /// Fix this side's parity at handshake time. Calling this more than once
    /// is a programming error (a second `__ready` in ready state is already
    /// fatal at a higher layer; this just documents the precondition).
    pub fn lock(&mut self, parity: Parity) {
        self.parity = parity;
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Allocate the next outbound id. Ids increase by 2, starting at 1 for
    /// odd parity and 2 for even parity.
    pub fn next(&mut self) -> u64 {
        let id = match self.parity {
            Parity::Odd => 2 * self.step + 1,
            Parity::Even => 2 * self.step + 2,
        };
        self.step += 1;
        id
    }

    /// Whether `id` falls in this side's own parity, i.e. an id we would
    /// have allocated ourselves, as opposed to one the peer allocated.
    pub fn owns(&self, id: u64) -> bool {
        match self.parity {
            Parity::Odd => id % 2 == 1,
            Parity::Even => id % 2 == 0,
        }
    }
}

impl Default for TransactionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuations for a call we issued, installed when the transaction is
/// recorded and consumed exactly once on final response.
pub struct OutEntry {
    pub success: LocalCallback,
    pub on_error: Rc<dyn Fn(ErrorPayload)>,
    pub callbacks: HashMap<String, LocalCallback>,
}

struct InState {
    declared_callbacks: Vec<String>,
    delay_return: bool,
    finalized: bool,
}

/// Sink a [`Transaction`] posts frames through. Implemented by the owning
/// channel; kept as a trait so this module has no dependency on `channel.rs`.
pub trait TransactionSink {
    fn post_progress(&self, id: u64, callback: &str, params: Value);
    fn post_final(&self, id: u64, outcome: Outcome);
    fn forget(&self, id: u64);
}

/// The control object a request handler receives, bound to one inbound
/// transaction id, exposing `invoke`/`complete`/`error`/`delay_return`.
#[derive(Clone)]
pub struct Transaction {
    id: u64,
    sink: Rc<dyn TransactionSink>,
    state: Rc<RefCell<InState>>,
}

impl Transaction {
    fn new(id: u64, sink: Rc<dyn TransactionSink>, declared_callbacks: Vec<String>) -> Self {
        Transaction {
            id,
            sink,
            state: Rc::new(RefCell::new(InState {
                declared_callbacks,
                delay_return: false,
                finalized: false,
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Emit a progress frame under `name`. Rejected if the peer did not
    /// declare this callback for this transaction.
    pub fn invoke(&self, name: &str, params: Value) -> Result<(), ChannelError> {
        let declared = self.state.borrow().declared_callbacks.iter().any(|c| c == name);
        if !declared {
            return Err(ChannelError::UndeclaredCallback(name.to_string()));
        }
        self.sink.post_progress(self.id, name, params);
        Ok(())
    }

    /// Finalize with a success value.
    pub fn complete(&self, value: Value) -> Result<(), ChannelError> {
        self.finalize(Outcome::Result(value))
    }

    /// Finalize with an error.
    pub fn error(&self, code: impl Into<String>, message: impl Into<String>) -> Result<(), ChannelError> {
        self.finalize(Outcome::Error(ErrorPayload::new(code, message)))
    }

    fn finalize(&self, outcome: Outcome) -> Result<(), ChannelError> {
        {
            let mut state = self.state.borrow_mut();
            if state.finalized {
                return Err(ChannelError::TransactionFinalized(self.id));
            }
            state.finalized = true;
        }
        self.sink.post_final(self.id, outcome);
        self.sink.forget(self.id);
        Ok(())
    }

    /// Suppress the automatic completion a handler's return value would
    /// otherwise trigger; the handler must finalize asynchronously later.
    pub fn delay_return(&self, delay: bool) {
        self.state.borrow_mut().delay_return = delay;
    }

    pub fn delay_return_requested(&self) -> bool {
        self.state.borrow().delay_return
    }

    /// Whether this transaction has already been finalized (by `complete`,
    /// `error`, or a `destroy` that force-closed it).
    pub fn completed(&self) -> bool {
        self.state.borrow().finalized
    }

    /// Mark finalized without posting a frame, used by `destroy` to make
    /// stray handles to torn-down transactions inert.
    fn force_finalize(&self) {
        self.state.borrow_mut().finalized = true;
    }
}

enum Entry {
    Out(OutEntry),
    In(Transaction),
}

/// The table of in-flight transactions, keyed by id.
#[derive(Default)]
pub struct TransactionTable {
    entries: HashMap<u64, Entry>,
}

impl TransactionTable {
    pub fn new() -> Self {
        TransactionTable {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an outbound call under `id`. The id must not already be present.
    pub fn insert_out(&mut self, id: u64, entry: OutEntry) {
        self.entries.insert(id, Entry::Out(entry));
    }

    /// Create and record the control object for an inbound request.
    pub fn insert_in(
        &mut self,
        id: u64,
        sink: Rc<dyn TransactionSink>,
        declared_callbacks: Vec<String>,
    ) -> Transaction {
        let transaction = Transaction::new(id, sink, declared_callbacks);
        self.entries.insert(id, Entry::In(transaction.clone()));
        transaction
    }

    /// Look up the progress-callback target for an inbound progress frame:
    /// requires direction `out` and `name` registered.
    pub fn progress_target(&self, id: u64, name: &str) -> Option<LocalCallback> {
        match self.entries.get(&id) {
            Some(Entry::Out(entry)) => entry.callbacks.get(name).cloned(),
            _ => None,
        }
    }

    /// Remove and return the final continuations for an inbound final
    /// response; requires direction `out`.
    pub fn take_out(&mut self, id: u64) -> Option<OutEntry> {
        match self.entries.remove(&id) {
            Some(Entry::Out(entry)) => Some(entry),
            Some(other) => {
                // Wrong direction: put it back untouched and report absent.
                self.entries.insert(id, other);
                None
            }
            None => None,
        }
    }

    /// Remove an in-flight entry (used once a `Transaction` finalizes itself).
    pub fn forget(&mut self, id: u64) {
        self.entries.remove(&id);
    }

    /// True if `id` is present with direction `out`.
    pub fn has_out(&self, id: u64) -> bool {
        matches!(self.entries.get(&id), Some(Entry::Out(_)))
    }

    /// Clear the table, force-finalizing any live `in` transaction control
    /// objects so stray handler-held handles become inert no-ops.
    pub fn clear(&mut self) {
        for entry in self.entries.values() {
            if let Entry::In(transaction) = entry {
                transaction.force_finalize();
            }
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;
    impl TransactionSink for NullSink {
        fn post_progress(&self, _id: u64, _callback: &str, _params: Value) {}
        fn post_final(&self, _id: u64, _outcome: Outcome) {}
        fn forget(&self, _id: u64) {}
    }

    #[test]
    fn odd_parity_ids_start_at_one_and_step_by_two() {
        let mut ids = TransactionIds::new();
        ids.lock(Parity::Odd);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 3);
        assert_eq!(ids.next(), 5);
    }

    #[test]
    fn even_parity_ids_start_at_two_and_step_by_two() {
        let mut ids = TransactionIds::new();
        ids.lock(Parity::Even);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 4);
    }

    #[test]
    fn odd_and_even_id_sequences_never_collide() {
        let mut odd = TransactionIds::new();
        odd.lock(Parity::Odd);
        let mut even = TransactionIds::new();
        even.lock(Parity::Even);

        let odd_ids: Vec<u64> = (0..50).map(|_| odd.next()).collect();
        let even_ids: Vec<u64> = (0..50).map(|_| even.next()).collect();

        assert!(odd_ids.iter().all(|id| id % 2 == 1));
        assert!(even_ids.iter().all(|id| id % 2 == 0));
    }

    #[test]
    fn defaults_to_odd_before_lock() {
        let ids = TransactionIds::new();
        assert_eq!(ids.parity(), Parity::Odd);
        assert!(!ids.is_locked());
    }

    #[test]
    fn owns_reflects_locked_parity() {
        let mut ids = TransactionIds::new();
        ids.lock(Parity::Even);
        assert!(ids.owns(2));
        assert!(!ids.owns(3));
    }

    #[test]
    fn table_tracks_len_across_insert_and_forget() {
        let mut table = TransactionTable::new();
        assert!(table.is_empty());
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let trans = table.insert_in(1, sink, vec![]);
        assert_eq!(table.len(), 1);
        trans.complete(serde_json::json!("ok")).unwrap();
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn invoke_rejects_undeclared_callback() {
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let mut table = TransactionTable::new();
        let trans = table.insert_in(1, sink, vec!["cb".into()]);
        assert!(trans.invoke("other", Value::Null).is_err());
        assert!(trans.invoke("cb", Value::Null).is_ok());
    }

    #[test]
    fn complete_twice_is_an_error() {
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let mut table = TransactionTable::new();
        let trans = table.insert_in(1, sink, vec![]);
        trans.complete(Value::Null).unwrap();
        assert!(trans.complete(Value::Null).is_err());
    }

    #[test]
    fn delay_return_suppresses_until_reset() {
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let mut table = TransactionTable::new();
        let trans = table.insert_in(1, sink, vec![]);
        assert!(!trans.delay_return_requested());
        trans.delay_return(true);
        assert!(trans.delay_return_requested());
    }

    #[test]
    fn clear_force_finalizes_live_in_transactions() {
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let mut table = TransactionTable::new();
        let trans = table.insert_in(1, sink, vec![]);
        table.clear();
        assert!(trans.completed());
        assert!(trans.complete(Value::Null).is_err());
    }

    #[test]
    fn take_out_refuses_wrong_direction() {
        let sink: Rc<dyn TransactionSink> = Rc::new(NullSink);
        let mut table = TransactionTable::new();
        let _trans = table.insert_in(1, sink, vec![]);
        assert!(table.take_out(1).is_none());
        assert_eq!(table.len(), 1);
    }
}
