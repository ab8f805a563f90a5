// demos/two_channels.rs
//
// A human-runnable smoke test: wires two in-process Channels over a
// MemSubstrate pair and drives the echo, progress, and delayed-return
// scenarios to stdout. `cargo run --example two_channels`.

use std::cell::RefCell;
use std::rc::Rc;

use frame_channel::{Channel, ChannelConfig, LocalCallback, MemSubstrate, Params, Transaction};
use serde_json::json;

fn build_pair() -> (Channel, Channel) {
    let (sub_a, sub_b) = MemSubstrate::pair("parent", "child");
    let a = Channel::build(ChannelConfig::new(Rc::new(sub_a), "parent", "child", "*")).unwrap();
    let b = Channel::build(ChannelConfig::new(Rc::new(sub_b), "child", "parent", "*")).unwrap();
    (a, b)
}

fn echo_scenario() {
    let (a, b) = build_pair();
    b.bind("echo", |_trans, params: Params| Ok(params.to_value_lossy()))
        .unwrap();

    a.call(
        "echo",
        Params::from_value(json!({"greeting": "hello"})),
        Rc::new(|result| println!("echo: success({result})")),
        Some(Rc::new(|err| println!("echo: error({err})"))),
    )
    .unwrap();
}

fn progress_scenario() {
    let (a, b) = build_pair();
    b.bind("stream", |trans, _params: Params| {
        let trans = trans.unwrap();
        trans.invoke("cb", json!({"n": 1})).unwrap();
        trans.invoke("cb", json!({"n": 2})).unwrap();
        Ok(json!("done"))
    })
    .unwrap();

    let callback: LocalCallback = Rc::new(|v| println!("stream: progress({v})"));
    let params = Params::Object(vec![]).with_callback_at("cb", callback);
    a.call(
        "stream",
        params,
        Rc::new(|result| println!("stream: success({result})")),
        None,
    )
    .unwrap();
}

fn delayed_return_scenario() {
    let (a, b) = build_pair();
    let stored: Rc<RefCell<Option<Transaction>>> = Rc::new(RefCell::new(None));
    let stored_hook = stored.clone();
    b.bind("delayed", move |trans, _params: Params| {
        let trans = trans.unwrap();
        trans.delay_return(true);
        *stored_hook.borrow_mut() = Some(trans.clone());
        println!("delayed: handler returned without finalizing");
        Ok(serde_json::Value::Null)
    })
    .unwrap();

    a.call(
        "delayed",
        Params::Null,
        Rc::new(|result| println!("delayed: success({result})")),
        None,
    )
    .unwrap();

    println!("delayed: completing from outside the handler now");
    stored.borrow().as_ref().unwrap().complete(json!("finally")).unwrap();
}

fn main() {
    tracing_subscriber::fmt::init();
    echo_scenario();
    progress_scenario();
    delayed_return_scenario();
}
