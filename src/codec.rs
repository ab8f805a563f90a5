// src/codec.rs

//! Wire codec: serializes [`Frame`]s to UTF-8 JSON text and parses them back,
//! enforcing the "exactly one of four shapes" rule from the data model.
//!
//! The four shapes (request, progress callback, final response, notification)
//! are not distinguished by a serde tag field — that would put a tag on the
//! wire this protocol does not use. Instead [`Frame`] is serialized through an
//! intermediate [`RawFrame`] with every field optional, and classified by
//! which fields are present, exactly as a dynamically typed peer would.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorPayload;

/// A parsed, already-descoped message frame.
///
/// `method` fields here are bare (scope prefix, if any, has already been
/// stripped by [`crate::origin`] on the way in, or is added on the way out).
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{ id, method, params, callbacks? }`
    Request {
        id: u64,
        method: String,
        params: Value,
        callbacks: Vec<String>,
    },
    /// `{ id, callback, params }`
    Progress {
        id: u64,
        callback: String,
        params: Value,
    },
    /// `{ id, result }` or `{ id, error, message }`
    Response { id: u64, outcome: Outcome },
    /// `{ method, params }`
    Notification { method: String, params: Value },
}

/// The payload of a [`Frame::Response`]: either a success value or a
/// normalized error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(ErrorPayload),
}

impl Frame {
    /// Serialize this frame to a JSON string for handing to the substrate.
    pub fn to_wire(&self) -> String {
        let raw = match self {
            Frame::Request {
                id,
                method,
                params,
                callbacks,
            } => RawFrame {
                id: Some(*id),
                method: Some(method.clone()),
                params: Some(params.clone()),
                callbacks: if callbacks.is_empty() {
                    None
                } else {
                    Some(callbacks.clone())
                },
                ..RawFrame::default()
            },
            Frame::Progress {
                id,
                callback,
                params,
            } => RawFrame {
                id: Some(*id),
                callback: Some(callback.clone()),
                params: Some(params.clone()),
                ..RawFrame::default()
            },
            Frame::Response { id, outcome } => match outcome {
                Outcome::Result(result) => RawFrame {
                    id: Some(*id),
                    result: Some(result.clone()),
                    ..RawFrame::default()
                },
                Outcome::Error(payload) => RawFrame {
                    id: Some(*id),
                    error: Some(payload.code.clone()),
                    message: Some(payload.message.clone()),
                    ..RawFrame::default()
                },
            },
            Frame::Notification { method, params } => RawFrame {
                method: Some(method.clone()),
                params: Some(params.clone()),
                ..RawFrame::default()
            },
        };

        // A RawFrame built above always serializes; the unwrap documents that
        // invariant rather than hiding a real failure mode.
        serde_json::to_string(&raw).expect("RawFrame is always serializable")
    }

    /// Parse a JSON string from the substrate into a classified [`Frame`].
    pub fn from_wire(text: &str) -> Result<Frame, CodecError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| CodecError::Parse(e.to_string()))?;
        raw.classify()
    }

    /// The transaction id this frame concerns, if any (notifications have none).
    pub fn id(&self) -> Option<u64> {
        match self {
            Frame::Request { id, .. } => Some(*id),
            Frame::Progress { id, .. } => Some(*id),
            Frame::Response { id, .. } => Some(*id),
            Frame::Notification { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callbacks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl RawFrame {
    fn classify(self) -> Result<Frame, CodecError> {
        match (
            self.id,
            &self.method,
            &self.callback,
            &self.result,
            &self.error,
        ) {
            (None, Some(_), None, None, None) => Ok(Frame::Notification {
                method: self.method.unwrap(),
                params: self.params.unwrap_or(Value::Null),
            }),
            (Some(id), Some(_), None, None, None) => Ok(Frame::Request {
                id,
                method: self.method.unwrap(),
                params: self.params.unwrap_or(Value::Null),
                callbacks: self.callbacks.unwrap_or_default(),
            }),
            (Some(id), None, Some(_), None, None) => Ok(Frame::Progress {
                id,
                callback: self.callback.unwrap(),
                params: self.params.unwrap_or(Value::Null),
            }),
            (Some(id), None, None, Some(_), None) => Ok(Frame::Response {
                id,
                outcome: Outcome::Result(self.result.unwrap()),
            }),
            (Some(id), None, None, None, Some(code)) => Ok(Frame::Response {
                id,
                outcome: Outcome::Error(ErrorPayload::new(
                    code.clone(),
                    self.message.clone().unwrap_or_default(),
                )),
            }),
            _ => Err(CodecError::AmbiguousShape),
        }
    }
}

/// Errors produced while parsing an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The text was not valid JSON, or not a JSON object.
    Parse(String),
    /// The object's fields do not match exactly one of the four frame shapes.
    AmbiguousShape,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Parse(msg) => write!(f, "failed to parse frame: {msg}"),
            CodecError::AmbiguousShape => {
                write!(f, "frame does not match exactly one of the four shapes")
            }
        }
    }
}

impl std::error::Error for CodecError {}
