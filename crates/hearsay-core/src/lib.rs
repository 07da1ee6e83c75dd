//! Hearsay Core Library
//!
//! Core data types for the hearsay push-gossip membership protocol.
//! All types serialize with serde and travel over the wire via postcard.
//!
//! # Modules
//!
//! - [`record`]: versioned per-peer records and the merge relation

pub mod record;

pub use record::{PeerInfo, PeerRecord};
