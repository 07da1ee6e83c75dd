//! Peer configuration.

use std::time::Duration;

/// Configuration for [`crate::Peer::spawn`].
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Address to bind and advertise, `host:port`. Port 0 asks the OS for
    /// a free port; the resolved address becomes the peer's identity.
    pub self_addr: String,
    /// Gossip tick period. One partner exchange is attempted per tick.
    pub ping_period: Duration,
    /// Upper bound on connecting to a new seed.
    pub dial_timeout: Duration,
}

impl PeerConfig {
    /// Config with the default dial timeout.
    pub fn new(self_addr: impl Into<String>, ping_period: Duration) -> Self {
        Self {
            self_addr: self_addr.into(),
            ping_period,
            dial_timeout: Duration::from_secs(1),
        }
    }
}
