// src/substrate/window.rs

//! A browser `window.postMessage` [`Substrate`](super::Substrate), for the
//! "parent document and embedded document" messaging scenario. Gated behind
//! the `wasm` feature, built on the same `wasm-bindgen`/`web-sys` dependency
//! set a browser-targeting client crate would declare.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

use super::Substrate;

/// Wraps a [`web_sys::Window`] (typically an iframe's `contentWindow`, or
/// `window.parent`) as a [`Substrate`].
pub struct WindowSubstrate {
    peer: Window,
    own: Window,
    listener: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
}

impl WindowSubstrate {
    /// `peer` is the window `send` posts to; `own` is the window `on_message`
    /// attaches its `message` listener to (almost always the local
    /// `web_sys::window()`).
    pub fn new(peer: Window, own: Window) -> Self {
        WindowSubstrate {
            peer,
            own,
            listener: RefCell::new(None),
        }
    }
}

impl Substrate for WindowSubstrate {
    fn send(&self, payload: &str, peer_identity: &str) {
        // `post_message` takes the target origin as its second argument,
        // exactly the `peerIdentity` the consumed contract names.
        if let Err(err) = self
            .peer
            .post_message(&wasm_bindgen::JsValue::from_str(payload), peer_identity)
        {
            tracing::warn!(?err, "channel: window.postMessage failed");
        }
    }

    fn on_message(&self, callback: Rc<dyn Fn(&str, &str)>) {
        let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
            let Some(payload) = event.data().as_string() else {
                tracing::debug!("channel: dropping non-string postMessage payload");
                return;
            };
            let sender_identity = event.origin();
            callback(&payload, &sender_identity);
        }) as Box<dyn FnMut(MessageEvent)>);

        if let Err(err) = self
            .own
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
        {
            tracing::warn!(?err, "channel: failed to attach message listener");
        }

        *self.listener.borrow_mut() = Some(closure);
    }

    fn close(&self) {
        if let Some(closure) = self.listener.borrow_mut().take() {
            let _ = self
                .own
                .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
            // Dropping `closure` here deallocates the wasm-bindgen shim;
            // any in-flight JS call into it after this point would already
            // have been unregistered above.
        }
    }
}
