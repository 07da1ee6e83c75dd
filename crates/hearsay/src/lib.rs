//! hearsay - push-gossip membership and metadata dissemination
//!
//! Each peer keeps a local view of the cluster — a map from peer address
//! to that peer's advertised metadata — and trades full record snapshots
//! with one round-robin partner per tick, converging through
//! last-writer-wins reconciliation. Deletions travel as tombstones.
//!
//! # Modules
//!
//! - [`config`]: peer configuration
//! - [`membership`]: the versioned membership table and partner ring
//! - [`peer`]: spawn/stop lifecycle and the public API handle
//!
//! # Example
//!
//! ```no_run
//! use hearsay::{Peer, PeerConfig, PeerInfo};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hearsay::SpawnError> {
//!     let config = PeerConfig::new("127.0.0.1:0", Duration::from_millis(100));
//!     let peer = Peer::spawn(config).await?;
//!
//!     peer.update_self_info(PeerInfo::named("demo"));
//!     peer.add_seed("127.0.0.1:7000");
//!
//!     // ... peer.members() converges with the cluster ...
//!
//!     peer.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
mod engine;
pub mod membership;
pub mod peer;
mod server;

pub use config::PeerConfig;
pub use hearsay_core::{PeerInfo, PeerRecord};
pub use membership::{MembershipStats, MembershipTable};
pub use peer::{Peer, SpawnError};
