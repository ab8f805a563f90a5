// tests/duplicate_bind.rs
//
// Duplicate bind (§8): the second `bind` of an already-bound method
// fails synchronously and the first handler stays in place.

use std::cell::RefCell;
use std::rc::Rc;

use frame_channel::{Channel, ChannelConfig, ChannelError, MemSubstrate, Params};
use serde_json::json;

fn build_pair() -> (Channel, Channel) {
    let (sub_a, sub_b) = MemSubstrate::pair("a", "b");
    let a = Channel::build(ChannelConfig::new(Rc::new(sub_a), "a", "b", "*")).unwrap();
    let b = Channel::build(ChannelConfig::new(Rc::new(sub_b), "b", "a", "*")).unwrap();
    (a, b)
}

#[test]
fn second_bind_of_the_same_method_fails_and_the_first_handler_still_runs() {
    let (a, b) = build_pair();
    b.bind("m", |_trans, _params: Params| Ok(json!(1))).unwrap();
    let err = b.bind("m", |_trans, _params: Params| Ok(json!(2))).unwrap_err();
    assert_eq!(err, ChannelError::MethodAlreadyBound("m".to_string()));

    let results: Rc<RefCell<Vec<serde_json::Value>>> = Rc::new(RefCell::new(Vec::new()));
    let results_hook = results.clone();
    a.call("m", Params::Null, Rc::new(move |v| results_hook.borrow_mut().push(v)), None)
        .unwrap();
    assert_eq!(*results.borrow(), vec![json!(1)]);
}

#[test]
fn unbind_then_rebind_succeeds_and_binds_to_the_original_name() {
    let (_a, b) = build_pair();
    b.bind("m", |_trans, _params: Params| Ok(json!(1))).unwrap();
    assert!(b.unbind("m"));
    assert!(!b.unbind("m"), "already unbound");
    b.bind("m", |_trans, _params: Params| Ok(json!(2))).unwrap();
}
