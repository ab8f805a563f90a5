// src/error.rs

//! Error types for channel construction, usage, and handler results.
//!
//! Per the error handling design: construction errors and usage errors are
//! surfaced synchronously as [`ChannelError`]; handler errors are normalized
//! into an [`ErrorPayload`] and sent to the peer as a final error response.
//! Protocol errors (unknown id, wrong direction, failed origin/scope check)
//! never become a `ChannelError` — they are logged and dropped, see
//! [`crate::dispatch`].

use std::fmt;

/// Errors raised synchronously by the public surface: construction (`build`)
/// and usage (`bind`, `call`, `notify`) errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// `origin` config value could not be parsed as `scheme://host[:port]` or `*`.
    InvalidOrigin(String),
    /// `scope` contains the reserved separator `::`.
    ScopeContainsSeparator(String),
    /// `peer` names the local context itself.
    PeerIsSelf,
    /// `bind` called with a method name already registered.
    MethodAlreadyBound(String),
    /// `bind`/`call`/`notify` called with an empty method name.
    EmptyMethodName,
    /// A callback name passed to `Transaction::invoke` was not declared by
    /// the caller for this transaction.
    UndeclaredCallback(String),
    /// `complete`/`error`/`invoke` called on a transaction that was already
    /// finalized or removed from the table.
    TransactionFinalized(u64),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::InvalidOrigin(s) => write!(f, "invalid origin: {s:?}"),
            ChannelError::ScopeContainsSeparator(s) => {
                write!(f, "scope {s:?} contains the reserved separator \"::\"")
            }
            ChannelError::PeerIsSelf => write!(f, "peer must not be the local context"),
            ChannelError::MethodAlreadyBound(m) => write!(f, "method {m:?} is already bound"),
            ChannelError::EmptyMethodName => write!(f, "method name must not be empty"),
            ChannelError::UndeclaredCallback(name) => {
                write!(f, "callback {name:?} was not declared for this transaction")
            }
            ChannelError::TransactionFinalized(id) => {
                write!(f, "transaction {id} is already finalized")
            }
        }
    }
}

impl std::error::Error for ChannelError {}

/// The normalized `{error, message}` shape delivered to a peer's error
/// continuation, per the error normalization algorithm.
///
/// Serializes on the wire as `{"error": code, "message": text}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorPayload {
    /// Short machine-readable error code, e.g. `"runtime_error"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Build a payload from an explicit code/message pair.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorPayload {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The default code used when a handler throws a bare string or an
    /// object that does not carry its own `error` field.
    pub const RUNTIME_ERROR: &'static str = "runtime_error";

    /// Normalize an arbitrary thrown value into an `ErrorPayload`.
    ///
    /// Mirrors the four cases of the error normalization algorithm, in
    /// order: plain string, two-element `[code, message]` array, an object
    /// carrying a string `error` field, and the catch-all case.
    pub fn normalize(thrown: &serde_json::Value) -> Self {
        use serde_json::Value;

        match thrown {
            Value::String(s) => ErrorPayload::new(Self::RUNTIME_ERROR, s.clone()),

            Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
                (Value::String(code), Value::String(message)) => {
                    ErrorPayload::new(code.clone(), message.clone())
                }
                (Value::String(code), other) => {
                    ErrorPayload::new(code.clone(), Self::stringify(other))
                }
                _ => ErrorPayload::new(Self::RUNTIME_ERROR, Self::stringify(thrown)),
            },

            Value::Object(map) => match map.get("error") {
                Some(Value::String(code)) => {
                    let message = match map.get("message") {
                        Some(Value::String(m)) => m.clone(),
                        Some(other) => Self::stringify(other),
                        None => Self::stringify(thrown),
                    };
                    ErrorPayload::new(code.clone(), message)
                }
                _ => ErrorPayload::new(Self::RUNTIME_ERROR, Self::stringify(thrown)),
            },

            other => ErrorPayload::new(Self::RUNTIME_ERROR, Self::stringify(other)),
        }
    }

    /// Serialize a value to a textual form, falling back to `Debug` if the
    /// value is somehow not representable (it always is for `serde_json::Value`,
    /// but the fallback documents intent for callers that build this from a
    /// non-`Value` source in the future).
    fn stringify(value: &serde_json::Value) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorPayload {}
