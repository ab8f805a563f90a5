#![doc = include_str!("../README.md")]

mod channel;
mod codec;
mod dispatch;
mod error;
mod handshake;
mod observe;
mod origin;
mod params;
mod substrate;
mod transaction;

pub use channel::{Channel, ChannelConfig};
pub use codec::{CodecError, Frame, Outcome};
pub use dispatch::Handler;
pub use error::{ChannelError, ErrorPayload};
pub use observe::FrameObserver;
pub use origin::{OriginFilter, Scope};
pub use params::{LocalCallback, Params};
pub use substrate::{MemSubstrate, Substrate};
pub use transaction::{Parity, Transaction};

#[cfg(feature = "wasm")]
pub use substrate::window::WindowSubstrate;
