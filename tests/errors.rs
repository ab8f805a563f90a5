// tests/errors.rs
//
// Thrown string (§8) and the full error normalization algorithm
// (§4.6), exercised end to end: a handler's thrown value reaches the peer's
// error continuation as the normalized `{code, message}` pair (testable
// property 7).

use std::cell::RefCell;
use std::rc::Rc;

use frame_channel::{Channel, ChannelConfig, ErrorPayload, MemSubstrate, Params};
use serde_json::json;

fn build_pair() -> (Channel, Channel) {
    let (sub_a, sub_b) = MemSubstrate::pair("a", "b");
    let a = Channel::build(ChannelConfig::new(Rc::new(sub_a), "a", "b", "*")).unwrap();
    let b = Channel::build(ChannelConfig::new(Rc::new(sub_b), "b", "a", "*")).unwrap();
    (a, b)
}

fn call_and_capture_error(thrown: serde_json::Value) -> ErrorPayload {
    let (a, b) = build_pair();
    b.bind("boom", move |_trans, _params: Params| Err(thrown.clone()))
        .unwrap();

    let errors: Rc<RefCell<Vec<ErrorPayload>>> = Rc::new(RefCell::new(Vec::new()));
    let errors_hook = errors.clone();
    a.call(
        "boom",
        Params::Null,
        Rc::new(|_| panic!("success should not fire for a thrown error")),
        Some(Rc::new(move |e| errors_hook.borrow_mut().push(e))),
    )
    .unwrap();

    let mut errors = errors.borrow_mut();
    assert_eq!(errors.len(), 1);
    errors.remove(0)
}

#[test]
fn s4_thrown_string_normalizes_to_runtime_error() {
    let payload = call_and_capture_error(json!("boom"));
    assert_eq!(payload.code, "runtime_error");
    assert_eq!(payload.message, "boom");
}

#[test]
fn thrown_two_element_array_becomes_code_and_message() {
    let payload = call_and_capture_error(json!(["not_found", "no such widget"]));
    assert_eq!(payload.code, "not_found");
    assert_eq!(payload.message, "no such widget");
}

#[test]
fn thrown_object_with_string_error_field_uses_its_message() {
    let payload = call_and_capture_error(json!({"error": "denied", "message": "nope"}));
    assert_eq!(payload.code, "denied");
    assert_eq!(payload.message, "nope");
}

#[test]
fn thrown_object_without_error_field_falls_back_to_runtime_error() {
    let payload = call_and_capture_error(json!({"unexpected": "shape"}));
    assert_eq!(payload.code, "runtime_error");
    assert!(payload.message.contains("unexpected"));
}

#[test]
fn a_handler_error_never_touches_the_success_continuation() {
    let (a, b) = build_pair();
    b.bind("boom", |_trans, _params: Params| Err(json!("boom")))
        .unwrap();

    let success_fired = Rc::new(RefCell::new(false));
    let success_hook = success_fired.clone();
    let errors: Rc<RefCell<Vec<ErrorPayload>>> = Rc::new(RefCell::new(Vec::new()));
    let errors_hook = errors.clone();

    a.call(
        "boom",
        Params::Null,
        Rc::new(move |_| *success_hook.borrow_mut() = true),
        Some(Rc::new(move |e| errors_hook.borrow_mut().push(e))),
    )
    .unwrap();

    assert!(!*success_fired.borrow());
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn notification_handler_throwing_produces_no_outbound_frame_at_all() {
    // Fire-and-forget (testable property 8): a's peer never sees anything,
    // there is no continuation that could even observe the thrown value.
    let (a, b) = build_pair();
    let invoked = Rc::new(RefCell::new(false));
    let invoked_hook = invoked.clone();
    b.bind("fire_and_forget", move |_trans, _params: Params| {
        *invoked_hook.borrow_mut() = true;
        Err(json!("boom"))
    })
    .unwrap();

    a.notify("fire_and_forget", serde_json::Value::Null).unwrap();
    assert!(*invoked.borrow());
}
