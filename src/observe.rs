// src/observe.rs

//! Observer hooks and the debug-log sink: optional taps fired on every send
//! and every accepted receive, per §2 item 8 and §9 design note 3.
//!
//! Hooks are taps, not filters: a `Fn(&str, &Frame)` only ever borrows the
//! frame, so the type system rules out the mutation the original avoided
//! only by convention (clone-then-hand-to-observer). There is nothing to
//! defensively clone here.

use std::rc::Rc;

use crate::codec::Frame;

/// A post-send or post-receive tap: `(sender/recipient identity, frame)`.
pub type FrameObserver = Rc<dyn Fn(&str, &Frame)>;

/// The observer/debug configuration carried by a Channel.
#[derive(Clone, Default)]
pub struct Observers {
    post: Option<FrameObserver>,
    recv: Option<FrameObserver>,
    debug: bool,
}

impl Observers {
    pub fn new(post: Option<FrameObserver>, recv: Option<FrameObserver>, debug: bool) -> Self {
        Observers { post, recv, debug }
    }

    /// Fire after a frame is handed to the substrate (or enqueued).
    pub fn notify_post(&self, identity: &str, frame: &Frame) {
        if let Some(observer) = &self.post {
            observer(identity, frame);
        }
        if self.debug {
            tracing::debug!(identity, frame = ?frame, "channel: posting frame");
        }
    }

    /// Fire after a frame has passed the origin/scope filter and been parsed.
    pub fn notify_recv(&self, identity: &str, frame: &Frame) {
        if let Some(observer) = &self.recv {
            observer(identity, frame);
        }
        if self.debug {
            tracing::debug!(identity, frame = ?frame, "channel: received frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn post_observer_is_invoked_with_identity_and_frame() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_for_hook = seen.clone();
        let observers = Observers::new(
            Some(Rc::new(move |identity: &str, frame: &Frame| {
                seen_for_hook
                    .borrow_mut()
                    .push((identity.to_string(), frame.clone()));
            })),
            None,
            false,
        );
        let frame = Frame::Notification {
            method: "__ready".into(),
            params: json!("ping"),
        };
        observers.notify_post("abcde-R", &frame);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].0, "abcde-R");
    }

    #[test]
    fn recv_observer_is_independent_of_post_observer() {
        let post_hits = Rc::new(RefCell::new(0));
        let recv_hits = Rc::new(RefCell::new(0));
        let p = post_hits.clone();
        let r = recv_hits.clone();
        let observers = Observers::new(
            Some(Rc::new(move |_, _| *p.borrow_mut() += 1)),
            Some(Rc::new(move |_, _| *r.borrow_mut() += 1)),
            false,
        );
        let frame = Frame::Notification {
            method: "m".into(),
            params: json!(null),
        };
        observers.notify_recv("x", &frame);
        assert_eq!(*post_hits.borrow(), 0);
        assert_eq!(*recv_hits.borrow(), 1);
    }

    #[test]
    fn no_observers_configured_is_a_no_op() {
        let observers = Observers::default();
        let frame = Frame::Notification {
            method: "m".into(),
            params: json!(null),
        };
        observers.notify_post("x", &frame);
        observers.notify_recv("x", &frame);
    }
}
