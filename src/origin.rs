// src/origin.rs

//! Origin and scope filtering: the two independent checks every inbound
//! frame must pass before it reaches the dispatcher.
//!
//! Origin filtering rejects frames from the wrong sender identity. Scope
//! filtering lets several Channels multiplex the same substrate between the
//! same peer pair by requiring (and stripping) a `"<scope>::"` prefix on
//! `method`. The two checks are orthogonal, per the component design.

use crate::error::ChannelError;

/// The expected sender identity a Channel was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expected {
    /// Accept any sender. Only reachable by explicitly configuring `"*"`.
    Wildcard,
    /// Accept only a canonicalized `scheme://host[:port]`.
    Specific(String),
}

/// Filters inbound frames by sender identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginFilter {
    expected: Expected,
}

impl OriginFilter {
    /// Build a filter from the configured `origin` option. `"*"` opts into
    /// accepting any sender; anything else is canonicalized to
    /// scheme+host+optional-port.
    pub fn new(origin: &str) -> Result<Self, ChannelError> {
        if origin == "*" {
            return Ok(OriginFilter {
                expected: Expected::Wildcard,
            });
        }
        let canonical = canonicalize(origin).ok_or_else(|| ChannelError::InvalidOrigin(origin.to_string()))?;
        Ok(OriginFilter {
            expected: Expected::Specific(canonical),
        })
    }

    /// Whether a frame claiming `sender_identity` should be accepted.
    pub fn accepts(&self, sender_identity: &str) -> bool {
        match &self.expected {
            Expected::Wildcard => true,
            Expected::Specific(expected) => canonicalize(sender_identity)
                .map(|actual| &actual == expected)
                .unwrap_or(false),
        }
    }
}

/// Reduce an origin string to `scheme://host[:port]`, dropping any path,
/// query, or fragment. Returns `None` if it does not look like
/// `scheme://host...` at all.
fn canonicalize(origin: &str) -> Option<String> {
    let (scheme, rest) = origin.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{authority}"))
}

/// A configured scope label, encoding/decoding the `"<scope>::method"`
/// prefix on outbound/inbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    label: Option<String>,
}

impl Scope {
    pub fn new(label: Option<String>) -> Result<Self, ChannelError> {
        if let Some(label) = &label {
            if label.contains("::") {
                return Err(ChannelError::ScopeContainsSeparator(label.clone()));
            }
        }
        Ok(Scope { label })
    }

    /// Prepend this scope's prefix to a bare method name, for outbound frames.
    pub fn encode(&self, method: &str) -> String {
        match &self.label {
            Some(label) => format!("{label}::{method}"),
            None => method.to_string(),
        }
    }

    /// Strip this scope's prefix from a wire method name. Returns `None` if
    /// the wire method does not carry this scope's prefix (scoped Channel),
    /// or carries someone else's prefix (unscoped Channel) — either way the
    /// frame belongs to a different Channel sharing the substrate.
    pub fn decode<'a>(&self, wire_method: &'a str) -> Option<&'a str> {
        match &self.label {
            Some(label) => wire_method
                .strip_prefix(label.as_str())
                .and_then(|rest| rest.strip_prefix("::")),
            None => {
                if wire_method.contains("::") {
                    None
                } else {
                    Some(wire_method)
                }
            }
        }
    }
}
