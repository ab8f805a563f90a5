// src/channel.rs

//! The public surface (§6): `Channel::build`, `bind`, `unbind`, `call`,
//! `notify`, `destroy`, and the substrate receive pipeline that ties every
//! other module together.
//!
//! `Channel` is a thin handle around `Rc<RefCell<Inner>>`. The one rule that
//! governs every method here: **never invoke application-supplied code (a
//! handler, a success/error continuation, a progress callback, an observer,
//! `onReady`) while a `RefCell` borrow of `Inner` is on the stack.** Any of
//! that code may legitimately call back into this same Channel — a handler
//! that synchronously completes and whose completion triggers another
//! `call`, an echo handler on a synchronous [`crate::substrate::MemSubstrate`]
//! pair bouncing a reply straight back in, and so on. Every method below
//! collects what it needs from `Inner` in a short `borrow()`/`borrow_mut()`
//! block, lets the guard drop, and only then calls out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::codec::{Frame, Outcome};
use crate::dispatch::{self, Handler, HandlerRegistry};
use crate::error::{ChannelError, ErrorPayload};
use crate::handshake::{self, HandshakeEvent, ReadyGate, READY_METHOD};
use crate::observe::{FrameObserver, Observers};
use crate::origin::{OriginFilter, Scope};
use crate::params::{LocalCallback, Params};
use crate::substrate::Substrate;
use crate::transaction::{OutEntry, Parity, TransactionIds, TransactionSink, TransactionTable};

/// Configuration for [`Channel::build`]: a closed set of construction-time
/// options.
///
/// Consuming fluent builder (`new` plus chained mutators), using owned-`self`
/// chaining since a Channel's config has no nested sub-builders to keep
/// alive across calls.
pub struct ChannelConfig {
    substrate: Rc<dyn Substrate>,
    local_context_id: String,
    peer_context_id: String,
    origin: String,
    scope: Option<String>,
    on_ready: Option<Rc<dyn Fn(&Channel)>>,
    post_observer: Option<FrameObserver>,
    recv_observer: Option<FrameObserver>,
    debug: bool,
}

impl ChannelConfig {
    /// `local_context_id`/`peer_context_id` are opaque identifiers for the
    /// two ends of `substrate`; `build` rejects a config where they are
    /// equal ("peer identical to self", §5/§6/§7).
    pub fn new(
        substrate: Rc<dyn Substrate>,
        local_context_id: impl Into<String>,
        peer_context_id: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        ChannelConfig {
            substrate,
            local_context_id: local_context_id.into(),
            peer_context_id: peer_context_id.into(),
            origin: origin.into(),
            scope: None,
            on_ready: None,
            post_observer: None,
            recv_observer: None,
            debug: false,
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn on_ready(mut self, hook: Rc<dyn Fn(&Channel)>) -> Self {
        self.on_ready = Some(hook);
        self
    }

    pub fn post_observer(mut self, observer: FrameObserver) -> Self {
        self.post_observer = Some(observer);
        self
    }

    pub fn recv_observer(mut self, observer: FrameObserver) -> Self {
        self.recv_observer = Some(observer);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

struct Inner {
    substrate: Rc<dyn Substrate>,
    peer_context_id: String,
    origin: OriginFilter,
    scope: Scope,
    ready: ReadyGate,
    ids: TransactionIds,
    table: TransactionTable,
    registry: HandlerRegistry,
    pending: handshake::PendingQueue,
    identity_token: String,
    observers: Observers,
    on_ready: Option<Rc<dyn Fn(&Channel)>>,
    destroyed: bool,
}

impl Inner {
    fn local_identity(&self) -> String {
        match self.ready.role() {
            Some(role) => format!("{}{}", self.identity_token, role.identity_suffix()),
            None => self.identity_token.clone(),
        }
    }
}

/// A channel implementing [`TransactionSink`] by posting through a weakly
/// held `Inner`. Kept `Weak` so a live in-flight `Transaction` (reachable
/// from application code that stored it for a delayed return) never keeps
/// `Inner` — and therefore the substrate listener closure — alive past
/// `destroy`.
struct ChannelSink(Weak<RefCell<Inner>>);

impl TransactionSink for ChannelSink {
    fn post_progress(&self, id: u64, callback: &str, params: Value) {
        if let Some(inner) = self.0.upgrade() {
            Channel::post_frame(
                &inner,
                Frame::Progress {
                    id,
                    callback: callback.to_string(),
                    params,
                },
                false,
            );
        }
    }

    fn post_final(&self, id: u64, outcome: Outcome) {
        if let Some(inner) = self.0.upgrade() {
            Channel::post_frame(&inner, Frame::Response { id, outcome }, false);
        }
    }

    fn forget(&self, id: u64) {
        if let Some(inner) = self.0.upgrade() {
            inner.borrow_mut().table.forget(id);
        }
    }
}

/// The outcome of processing one inbound `__ready` notification, decided
/// while `Inner` is still borrowed; acted on afterward with no borrow held.
enum ReadyOutcome {
    Ignored,
    Duplicate,
    Completed {
        event: HandshakeEvent,
        on_ready: Option<Rc<dyn Fn(&Channel)>>,
    },
}

/// A handle to one end of a cross-context RPC channel. Cheap to clone (an
/// `Rc` bump); every clone refers to the same underlying state.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<RefCell<Inner>>,
}

impl Channel {
    /// Build and immediately begin the ready handshake: sends the initial
    /// `__ready`/`"ping"` notification with the force flag that bypasses the
    /// pre-ready queue (§4.1).
    pub fn build(config: ChannelConfig) -> Result<Channel, ChannelError> {
        if config.local_context_id == config.peer_context_id {
            return Err(ChannelError::PeerIsSelf);
        }
        let origin = OriginFilter::new(&config.origin)?;
        let scope = Scope::new(config.scope)?;

        let inner = Rc::new(RefCell::new(Inner {
            substrate: config.substrate,
            peer_context_id: config.peer_context_id,
            origin,
            scope,
            ready: ReadyGate::new(),
            ids: TransactionIds::new(),
            table: TransactionTable::new(),
            registry: HandlerRegistry::new(),
            pending: handshake::PendingQueue::new(),
            identity_token: handshake::random_token(),
            observers: Observers::new(config.post_observer, config.recv_observer, config.debug),
            on_ready: config.on_ready,
            destroyed: false,
        }));

        let weak = Rc::downgrade(&inner);
        {
            let substrate = inner.borrow().substrate.clone();
            substrate.on_message(Rc::new(move |payload: &str, sender: &str| {
                Channel::handle_inbound(&weak, payload, sender);
            }));
        }

        let ready_method = inner.borrow().scope.encode(READY_METHOD);
        Self::post_frame(
            &inner,
            Frame::Notification {
                method: ready_method,
                params: handshake::ping_payload(),
            },
            true,
        );

        Ok(Channel { inner })
    }

    /// This Channel's opaque logging identity: a 5-character token, plus a
    /// role suffix once the handshake has assigned one.
    pub fn identity(&self) -> String {
        self.inner.borrow().local_identity()
    }

    /// Bind a method handler. Post-destroy, this is a best-effort no-op that
    /// reports success without actually registering anything (§7).
    pub fn bind(&self, method: &str, handler: impl Handler + 'static) -> Result<(), ChannelError> {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return Ok(());
        }
        inner.registry.bind(method, Rc::new(handler))
    }

    /// Unbind a method handler, reporting whether one was actually bound.
    pub fn unbind(&self, method: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return false;
        }
        inner.registry.unbind(method)
    }

    /// Issue an outbound call. `success` is mandatory — the type system rules
    /// out a "missing success callback" usage error entirely, rather than
    /// checking for it at runtime. `error` is optional; if omitted, a peer
    /// error response is silently discarded.
    pub fn call(
        &self,
        method: &str,
        params: Params,
        success: LocalCallback,
        error: Option<Rc<dyn Fn(ErrorPayload)>>,
    ) -> Result<(), ChannelError> {
        if method.is_empty() {
            return Err(ChannelError::EmptyMethodName);
        }

        let frame = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return Ok(());
            }

            let id = inner.ids.next();
            let (wire_params, callback_table) = params.extract_callbacks();
            let mut callbacks = HashMap::with_capacity(callback_table.len());
            let mut callback_paths = Vec::with_capacity(callback_table.len());
            for (path, callback) in callback_table {
                callback_paths.push(path.clone());
                callbacks.insert(path, callback);
            }

            inner.table.insert_out(
                id,
                OutEntry {
                    success,
                    on_error: error.unwrap_or_else(|| Rc::new(|_| {})),
                    callbacks,
                },
            );

            Frame::Request {
                id,
                method: inner.scope.encode(method),
                params: wire_params,
                callbacks: callback_paths,
            }
        };

        Self::post_frame(&self.inner, frame, false);
        Ok(())
    }

    /// Fire a one-way notification (§4.2 family, no transaction). Callables
    /// embedded in `params` make no sense here (there is no transaction to
    /// route a progress reply through), so this takes a plain `Value`.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), ChannelError> {
        if method.is_empty() {
            return Err(ChannelError::EmptyMethodName);
        }
        let frame = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return Ok(());
            }
            Frame::Notification {
                method: inner.scope.encode(method),
                params,
            }
        };
        Self::post_frame(&self.inner, frame, false);
        Ok(())
    }

    /// Detach the substrate listener, clear the registry and transaction
    /// table, and drop the pending-send buffer. Idempotent (§5).
    pub fn destroy(&self) {
        let substrate = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.registry.clear();
            inner.table.clear();
            inner.pending.drain();
            inner.substrate.clone()
        };
        substrate.close();
    }

    /// Hand `frame` to the substrate (or enqueue it if not yet ready), then
    /// fire the post observer — after the borrow used to decide that is
    /// dropped, since the observer is application code.
    fn post_frame(inner_rc: &Rc<RefCell<Inner>>, frame: Frame, force: bool) {
        let wire = frame.to_wire();
        let (should_send, substrate, peer_id, observers, identity) = {
            let mut inner = inner_rc.borrow_mut();
            if inner.destroyed {
                return;
            }
            let should_send = force || inner.ready.is_ready();
            if !should_send {
                inner.pending.push(wire.clone());
            }
            (
                should_send,
                inner.substrate.clone(),
                inner.peer_context_id.clone(),
                inner.observers.clone(),
                inner.local_identity(),
            )
        };

        if should_send {
            substrate.send(&wire, &peer_id);
        }
        observers.notify_post(&identity, &frame);
    }

    /// Send every buffered frame, in FIFO order, with no further observer
    /// notification (the post observer already fired when each was queued).
    fn flush_pending(inner_rc: &Rc<RefCell<Inner>>) {
        let (frames, substrate, peer_id) = {
            let mut inner = inner_rc.borrow_mut();
            (
                inner.pending.drain(),
                inner.substrate.clone(),
                inner.peer_context_id.clone(),
            )
        };
        for wire in frames {
            substrate.send(&wire, &peer_id);
        }
    }

    /// The substrate's inbound-message callback. Runs entirely off a `Weak`
    /// handle so the substrate's retained closure never keeps `Inner` alive.
    fn handle_inbound(inner_weak: &Weak<RefCell<Inner>>, payload: &str, sender_identity: &str) {
        let Some(inner_rc) = inner_weak.upgrade() else {
            return;
        };

        let accepted = {
            let inner = inner_rc.borrow();
            !inner.destroyed && inner.origin.accepts(sender_identity)
        };
        if !accepted {
            tracing::debug!(sender_identity, "channel: dropping frame from unexpected origin");
            return;
        }

        let frame = match Frame::from_wire(payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "channel: dropping unparseable frame");
                return;
            }
        };

        if let Frame::Notification { method, params } = &frame {
            let is_ready = {
                let inner = inner_rc.borrow();
                inner.scope.decode(method) == Some(READY_METHOD)
            };
            if is_ready {
                Self::handle_ready(&inner_rc, params);
                let (observers, identity) = {
                    let inner = inner_rc.borrow();
                    (inner.observers.clone(), inner.local_identity())
                };
                observers.notify_recv(&identity, &frame);
                return;
            }
        }

        match frame {
            Frame::Request {
                id,
                method,
                params,
                callbacks,
            } => Self::route_request(&inner_rc, inner_weak, id, method, params, callbacks),
            Frame::Progress { id, callback, params } => {
                Self::route_progress(&inner_rc, id, callback, params)
            }
            Frame::Response { id, outcome } => Self::route_response(&inner_rc, id, outcome),
            Frame::Notification { method, params } => {
                Self::route_notification(&inner_rc, method, params)
            }
        }
    }

    fn route_request(
        inner_rc: &Rc<RefCell<Inner>>,
        inner_weak: &Weak<RefCell<Inner>>,
        id: u64,
        method: String,
        params: Value,
        callbacks: Vec<String>,
    ) {
        let bare_method = {
            let inner = inner_rc.borrow();
            inner.scope.decode(&method).map(str::to_string)
        };
        let Some(bare_method) = bare_method else {
            tracing::debug!(method, "channel: dropping request with mismatched scope");
            return;
        };

        let (begun, observers, identity) = {
            let mut inner = inner_rc.borrow_mut();
            let sink: Rc<dyn TransactionSink> = Rc::new(ChannelSink(Weak::clone(inner_weak)));
            let begun = dispatch::begin_request(
                id,
                &bare_method,
                callbacks.clone(),
                &inner.registry,
                &mut inner.table,
                sink,
            );
            (begun, inner.observers.clone(), inner.local_identity())
        };

        observers.notify_recv(
            &identity,
            &Frame::Request {
                id,
                method: bare_method.clone(),
                params: params.clone(),
                callbacks: callbacks.clone(),
            },
        );

        match begun {
            Some((handler, transaction)) => dispatch::run_request(handler, transaction, params, callbacks),
            None => tracing::debug!(method = %bare_method, "channel: dropping request with no bound handler"),
        }
    }

    fn route_progress(inner_rc: &Rc<RefCell<Inner>>, id: u64, callback: String, params: Value) {
        let (target, observers, identity) = {
            let inner = inner_rc.borrow();
            (
                inner.table.progress_target(id, &callback),
                inner.observers.clone(),
                inner.local_identity(),
            )
        };

        observers.notify_recv(
            &identity,
            &Frame::Progress {
                id,
                callback: callback.clone(),
                params: params.clone(),
            },
        );

        match target {
            Some(target) => target(params),
            None => tracing::debug!(id, callback, "channel: dropping progress for unknown transaction/callback"),
        }
    }

    fn route_response(inner_rc: &Rc<RefCell<Inner>>, id: u64, outcome: Outcome) {
        let entry = {
            let mut inner = inner_rc.borrow_mut();
            inner.table.take_out(id)
        };
        let (observers, identity) = {
            let inner = inner_rc.borrow();
            (inner.observers.clone(), inner.local_identity())
        };

        observers.notify_recv(&identity, &Frame::Response { id, outcome: outcome.clone() });

        match entry {
            Some(entry) => match outcome {
                Outcome::Result(value) => (entry.success)(value),
                Outcome::Error(payload) => (entry.on_error)(payload),
            },
            None => tracing::debug!(id, "channel: dropping response for unknown transaction"),
        }
    }

    fn route_notification(inner_rc: &Rc<RefCell<Inner>>, method: String, params: Value) {
        let bare_method = {
            let inner = inner_rc.borrow();
            inner.scope.decode(&method).map(str::to_string)
        };
        let Some(bare_method) = bare_method else {
            tracing::debug!(method, "channel: dropping notification with mismatched scope");
            return;
        };

        let (handler, observers, identity) = {
            let inner = inner_rc.borrow();
            (
                dispatch::begin_notification(&bare_method, &inner.registry),
                inner.observers.clone(),
                inner.local_identity(),
            )
        };

        observers.notify_recv(
            &identity,
            &Frame::Notification {
                method: bare_method,
                params: params.clone(),
            },
        );

        if let Some(handler) = handler {
            dispatch::run_notification(handler, params);
        }
    }

    /// Handle one inbound `__ready` payload: assign role/parity, reply with
    /// `pong` if we received `ping`, flush the pending queue, and fire
    /// `onReady` — all after the borrow used to update state has dropped.
    fn handle_ready(inner_rc: &Rc<RefCell<Inner>>, payload: &Value) {
        let outcome = {
            let mut inner = inner_rc.borrow_mut();
            if inner.destroyed {
                return;
            }
            if inner.ready.is_duplicate_ready(payload) {
                ReadyOutcome::Duplicate
            } else if let Some((role, event)) = inner.ready.on_ready_notification(payload) {
                handshake::lock_parity(&mut inner.ids, role);
                ReadyOutcome::Completed {
                    event,
                    on_ready: inner.on_ready.clone(),
                }
            } else {
                ReadyOutcome::Ignored
            }
        };

        match outcome {
            ReadyOutcome::Ignored => {}
            ReadyOutcome::Duplicate => {
                panic!("channel: received a second __ready notification after entering ready state")
            }
            ReadyOutcome::Completed { event, on_ready } => {
                if matches!(event, HandshakeEvent::ReceivedPing) {
                    let pong_method = inner_rc.borrow().scope.encode(READY_METHOD);
                    Self::post_frame(
                        inner_rc,
                        Frame::Notification {
                            method: pong_method,
                            params: handshake::pong_payload(),
                        },
                        true,
                    );
                }
                Self::flush_pending(inner_rc);
                if let Some(on_ready) = on_ready {
                    let channel = Channel { inner: inner_rc.clone() };
                    on_ready(&channel);
                }
            }
        }
    }
}
