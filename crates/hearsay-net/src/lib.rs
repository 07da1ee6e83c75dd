//! Hearsay wire layer
//!
//! Length-prefixed message framing over TCP and the outbound connection
//! adapter used by the gossip engine.
//!
//! # Modules
//!
//! - [`framing`]: frame types and the length-prefixed codec
//! - [`transport`]: dial/ping/exchange/close over a persistent connection

pub mod framing;
pub mod transport;

pub use framing::{Frame, FrameCodec, FrameError, FrameType};
pub use transport::{Connection, Exchange, TransportError};
