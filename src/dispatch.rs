// src/dispatch.rs

//! The dispatcher: classifies each inbound frame into {request,
//! progress-callback, final response, notification} and routes it to the
//! bound handler or the matching transaction continuation.
//!
//! Frame classification itself happens in [`crate::codec`]; this module
//! owns the handler registry and the request/notification routing of
//! §4.3/§4.4. Progress and final-response routing are simple single-lookup
//! operations and are done directly against [`crate::transaction::TransactionTable`]
//! by [`crate::channel`] — see that module's notes on why request handling
//! is split into `begin_request`/`run_request` here rather than done in one
//! call: a handler is arbitrary application code that may reenter the
//! Channel, and must never run while a `RefCell` borrow of the Channel's
//! state is still held.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ChannelError, ErrorPayload};
use crate::params::{LocalCallback, Params};
use crate::transaction::{Transaction, TransactionSink, TransactionTable};

/// A bound method handler. Requests pass `Some(&Transaction)`; notifications
/// pass `None`, per §4.4 ("invoke it with `(null, params)`").
///
/// A handler signals a thrown error by returning `Err`; the value is
/// normalized per [`ErrorPayload::normalize`] before it reaches the peer.
pub trait Handler {
    fn handle(&self, transaction: Option<&Transaction>, params: Params) -> Result<Value, Value>;
}

impl<F> Handler for F
where
    F: Fn(Option<&Transaction>, Params) -> Result<Value, Value>,
{
    fn handle(&self, transaction: Option<&Transaction>, params: Params) -> Result<Value, Value> {
        self(transaction, params)
    }
}

/// The method-name → handler mapping. At most one handler per method name;
/// a second `bind` of the same name fails rather than replacing it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Rc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: HashMap::new(),
        }
    }

    pub fn bind(&mut self, method: &str, handler: Rc<dyn Handler>) -> Result<(), ChannelError> {
        if method.is_empty() {
            return Err(ChannelError::EmptyMethodName);
        }
        if self.handlers.contains_key(method) {
            return Err(ChannelError::MethodAlreadyBound(method.to_string()));
        }
        self.handlers.insert(method.to_string(), handler);
        Ok(())
    }

    pub fn unbind(&mut self, method: &str) -> bool {
        self.handlers.remove(method).is_some()
    }

    pub fn get(&self, method: &str) -> Option<Rc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// First half of inbound request routing (§4.3): look up the handler and
/// record the transaction. Takes `&mut TransactionTable` but does **not**
/// invoke the handler — callers must drop any state borrow before calling
/// [`run_request`]. Returns `None` if no handler is bound (the frame is
/// silently ignored, never error-replied).
pub fn begin_request(
    id: u64,
    method: &str,
    callbacks: Vec<String>,
    registry: &HandlerRegistry,
    table: &mut TransactionTable,
    sink: Rc<dyn TransactionSink>,
) -> Option<(Rc<dyn Handler>, Transaction)> {
    let handler = registry.get(method)?;
    let transaction = table.insert_in(id, sink, callbacks);
    Some((handler, transaction))
}

/// Second half of inbound request routing: install callback stand-ins,
/// invoke the handler, and auto-finalize unless it asked for a delayed
/// return. Safe to call with no state borrow held.
pub fn run_request(
    handler: Rc<dyn Handler>,
    transaction: Transaction,
    params_value: Value,
    callbacks: Vec<String>,
) {
    let transaction_for_callbacks = transaction.clone();
    let params = Params::install_callbacks(params_value, &callbacks, move |path| {
        let transaction = transaction_for_callbacks.clone();
        let path = path.to_string();
        Rc::new(move |value: Value| {
            let _ = transaction.invoke(&path, value);
        }) as LocalCallback
    });

    let result = handler.handle(Some(&transaction), params);

    if !transaction.delay_return_requested() && !transaction.completed() {
        match result {
            Ok(value) => {
                let _ = transaction.complete(value);
            }
            Err(thrown) => {
                let payload = ErrorPayload::normalize(&thrown);
                let _ = transaction.error(payload.code, payload.message);
            }
        }
    }
}

/// Look up the bound handler for an inbound notification (§4.4). Returns
/// `None` if nothing is bound.
pub fn begin_notification(method: &str, registry: &HandlerRegistry) -> Option<Rc<dyn Handler>> {
    registry.get(method)
}

/// Invoke a notification handler. Return value and thrown errors are
/// discarded; this never produces an outbound frame, by construction (there
/// is no transaction, no sink — nothing here *can* post one).
pub fn run_notification(handler: Rc<dyn Handler>, params_value: Value) {
    let params = Params::from_value(params_value);
    let _ = handler.handle(None, params);
}
