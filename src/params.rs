// src/params.rs

//! Callback marshaling: embedding a live callable inside an otherwise pure
//! JSON parameter tree.
//!
//! A dynamically typed peer mutates an arbitrary object graph in place. We
//! instead give callbacks an explicit home in the type system: [`Params`] is
//! a JSON-shaped tree whose leaves may be a [`Callback`] as well as a plain
//! scalar. Extraction (sender side) walks a [`Params`] tree, pulls every
//! local callback out to a side table keyed by slash-joined path, and
//! produces a pure `serde_json::Value` for the wire. Installation (receiver
//! side) walks the inbound `serde_json::Value` and the peer-declared path
//! list together, producing a `Params` tree with a `RemoteCallback` stand-in
//! at each declared path.

use std::rc::Rc;

use serde_json::Value;

/// A local callable supplied by the application, e.g. the `success`
/// continuation of a `call`, or a progress callback nested in its `params`.
pub type LocalCallback = Rc<dyn Fn(Value)>;

/// A JSON-shaped parameter tree that may additionally hold callables.
#[derive(Clone)]
pub enum Params {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Params>),
    Object(Vec<(String, Params)>),
    /// A callable embedded in the tree: a local closure on the sending side
    /// before extraction, nothing on the wire, and a remote stand-in on the
    /// receiving side after installation.
    Callback(LocalCallback),
}

impl Params {
    /// Build a `Params` tree from a plain JSON value; no callbacks.
    pub fn from_value(value: Value) -> Params {
        match value {
            Value::Null => Params::Null,
            Value::Bool(b) => Params::Bool(b),
            Value::Number(n) => Params::Number(n),
            Value::String(s) => Params::String(s),
            Value::Array(items) => {
                Params::Array(items.into_iter().map(Params::from_value).collect())
            }
            Value::Object(map) => Params::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Params::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Wrap a plain value as `Params` with a single callback spliced in at
    /// `path` (slash-joined object keys; used by tests and call-sites that
    /// build params programmatically rather than from a `Value`).
    pub fn with_callback_at(mut self, path: &str, callback: LocalCallback) -> Params {
        if path.is_empty() {
            return Params::Callback(callback);
        }
        self.set_at(path, Params::Callback(callback));
        self
    }

    fn set_at(&mut self, path: &str, value: Params) {
        let (head, rest) = match path.split_once('/') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        match self {
            Params::Object(entries) => {
                if let Some(entry) = entries.iter_mut().find(|(k, _)| k == head) {
                    if let Some(rest) = rest {
                        entry.1.set_at(rest, value);
                    } else {
                        entry.1 = value;
                    }
                    return;
                }
                if rest.is_none() {
                    entries.push((head.to_string(), value));
                } else {
                    let mut child = Params::Object(Vec::new());
                    child.set_at(rest.unwrap(), value);
                    entries.push((head.to_string(), child));
                }
            }
            Params::Array(items) => {
                let Ok(index) = head.parse::<usize>() else {
                    return;
                };
                if index >= items.len() {
                    items.resize_with(index + 1, || Params::Null);
                }
                match rest {
                    Some(rest) => items[index].set_at(rest, value),
                    None => items[index] = value,
                }
            }
            _ => {}
        }
    }

    /// Extract every embedded callback into a side table keyed by
    /// slash-joined path, returning the pruned wire payload alongside it.
    ///
    /// Arrays are walked as objects whose keys are their indices, per the
    /// marshaling algorithm.
    pub fn extract_callbacks(self) -> (Value, Vec<(String, LocalCallback)>) {
        let mut table = Vec::new();
        let value = extract(self, String::new(), &mut table);
        (value, table)
    }

    /// Rebuild a `Params` tree from an inbound wire value, installing a
    /// [`Callback`] at each path the sender declared.
    ///
    /// `make_remote` is invoked once per declared path and must produce the
    /// stand-in callable that, when called, posts a progress frame back to
    /// the peer under that path.
    pub fn install_callbacks(
        value: Value,
        declared_paths: &[String],
        mut make_remote: impl FnMut(&str) -> LocalCallback,
    ) -> Params {
        let mut params = Params::from_value(value);
        for path in declared_paths {
            let remote = make_remote(path);
            params.set_at(path, Params::Callback(remote));
        }
        params
    }

    /// View this tree back as a plain JSON value, with any remaining
    /// callbacks dropped (used for diagnostics / observer taps only).
    pub fn to_value_lossy(&self) -> Value {
        match self {
            Params::Null => Value::Null,
            Params::Bool(b) => Value::Bool(*b),
            Params::Number(n) => Value::Number(n.clone()),
            Params::String(s) => Value::String(s.clone()),
            Params::Array(items) => {
                Value::Array(items.iter().map(Params::to_value_lossy).collect())
            }
            Params::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value_lossy()))
                    .collect(),
            ),
            Params::Callback(_) => Value::Null,
        }
    }
}

fn extract(params: Params, path: String, table: &mut Vec<(String, LocalCallback)>) -> Value {
    match params {
        Params::Null => Value::Null,
        Params::Bool(b) => Value::Bool(b),
        Params::Number(n) => Value::Number(n),
        Params::String(s) => Value::String(s),
        Params::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let child_path = join_path(&path, &i.to_string());
                    extract(item, child_path, table)
                })
                .collect(),
        ),
        Params::Object(entries) => Value::Object(
            entries
                .into_iter()
                .filter_map(|(key, value)| {
                    let child_path = join_path(&path, &key);
                    if let Params::Callback(callback) = value {
                        table.push((child_path, callback));
                        None
                    } else {
                        Some((key, extract(value, child_path, table)))
                    }
                })
                .collect(),
        ),
        Params::Callback(callback) => {
            table.push((path, callback));
            Value::Null
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn extract_pure_value_leaves_nothing_behind() {
        let params = Params::from_value(json!({"x": 1, "y": [1, 2, 3]}));
        let (value, table) = params.extract_callbacks();
        assert_eq!(value, json!({"x": 1, "y": [1, 2, 3]}));
        assert!(table.is_empty());
    }

    #[test]
    fn extract_top_level_callback() {
        let calls: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let c = calls.clone();
        let cb: LocalCallback = Rc::new(move |v| c.borrow_mut().push(v));
        let params = Params::Object(vec![("success".into(), Params::Callback(cb))]);

        let (value, table) = params.extract_callbacks();
        assert_eq!(value, json!({}));
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].0, "success");
    }

    #[test]
    fn extract_nested_callback_path_is_slash_joined() {
        let cb: LocalCallback = Rc::new(|_| {});
        let params = Params::Object(vec![(
            "a".into(),
            Params::Object(vec![("b".into(), Params::Callback(cb))]),
        )]);
        let (_value, table) = params.extract_callbacks();
        assert_eq!(table[0].0, "a/b");
    }

    #[test]
    fn extract_callback_in_array_uses_index_as_path_segment() {
        let cb: LocalCallback = Rc::new(|_| {});
        let params = Params::Array(vec![Params::Null, Params::Callback(cb)]);
        let (value, table) = params.extract_callbacks();
        assert_eq!(value, json!([null, null]));
        assert_eq!(table[0].0, "1");
    }

    #[test]
    fn install_callbacks_installs_at_an_array_traversing_path() {
        let cb: LocalCallback = Rc::new(|_| {});
        let params = Params::Array(vec![Params::Null, Params::Callback(cb)]);
        let (value, table) = params.extract_callbacks();
        assert_eq!(table[0].0, "1");

        let paths: Vec<String> = table.into_iter().map(|(path, _)| path).collect();
        let installed = Params::install_callbacks(value, &paths, |_path| Rc::new(|_v| {}));
        match installed {
            Params::Array(items) => {
                assert!(matches!(items[0], Params::Null));
                assert!(matches!(items[1], Params::Callback(_)));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn install_callbacks_builds_remote_stand_ins_at_declared_paths() {
        let seen_paths: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_for_factory = seen_paths.clone();
        let params = Params::install_callbacks(json!({"cb": null}), &["cb".to_string()], |path| {
            seen_for_factory.borrow_mut().push(path.to_string());
            Rc::new(|_v| {})
        });
        match params {
            Params::Object(entries) => {
                assert!(matches!(entries[0].1, Params::Callback(_)));
            }
            _ => panic!("expected object"),
        }
        assert_eq!(*seen_paths.borrow(), vec!["cb".to_string()]);
    }

    #[test]
    fn with_callback_at_splices_into_object() {
        let cb: LocalCallback = Rc::new(|_| {});
        let params = Params::Object(vec![("x".into(), Params::Number(1.into()))])
            .with_callback_at("success", cb);
        let (value, table) = params.extract_callbacks();
        assert_eq!(value, json!({"x": 1}));
        assert_eq!(table[0].0, "success");
    }

    #[test]
    fn to_value_lossy_drops_callbacks() {
        let cb: LocalCallback = Rc::new(|_| {});
        let params = Params::Object(vec![("cb".into(), Params::Callback(cb))]);
        assert_eq!(params.to_value_lossy(), json!({"cb": null}));
    }
}
