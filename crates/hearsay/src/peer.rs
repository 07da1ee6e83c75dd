//! Peer lifecycle: spawn, API surface, coordinated shutdown.

use crate::config::PeerConfig;
use crate::membership::{MembershipStats, MembershipTable};
use crate::{engine, server};
use hearsay_core::{PeerInfo, PeerRecord};
use hearsay_net::Connection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn errors
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// State shared between the engine loop, the server handlers, and the
/// API handle.
pub(crate) struct Shared {
    pub(crate) config: PeerConfig,
    pub(crate) table: MembershipTable,
    pub(crate) token: CancellationToken,
    /// In-flight seed dials. Joined during shutdown so a late dial
    /// cannot register a connection after the table has been closed.
    dials: Mutex<JoinSet<()>>,
}

impl Shared {
    /// Run [`Shared::add_seed`] in the background, tracked for shutdown.
    pub(crate) fn spawn_add_seed(self: &Arc<Self>, addr: String) {
        let shared = self.clone();
        self.dials
            .lock()
            .spawn(async move { shared.add_seed(addr).await });
    }

    /// Dial, validate, and register a seed. All I/O happens before the
    /// table lock is taken; losing the registration race just closes the
    /// redundant connection.
    pub(crate) async fn add_seed(&self, addr: String) {
        let self_addr = self.table.self_addr();
        if addr == self_addr || self.token.is_cancelled() {
            return;
        }

        let conn = match Connection::dial(&addr, self.config.dial_timeout).await {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                warn!("{} cannot open connection to {}: {}", self_addr, addr, err);
                return;
            }
        };

        if self.table.add_seed(&addr, conn.clone()) {
            info!("{} added seed {}", self_addr, addr);
        } else {
            conn.close();
        }
    }

    /// Merge a batch of remote records and dial any newly learned live
    /// peer in the background. Shared by the engine's receive phase and
    /// the server's ShareData handler.
    pub(crate) fn absorb(self: &Arc<Self>, records: Vec<PeerRecord>) {
        for record in records {
            let addr = record.addr.clone();
            let deleted = record.deleted;
            let existed = self.table.upsert(record);
            if !existed && !deleted {
                self.spawn_add_seed(addr);
            }
        }
    }
}

struct Tasks {
    engine: JoinHandle<()>,
    server: JoinHandle<()>,
}

/// Handle to a running gossip peer.
///
/// Dropping the handle does not stop the peer; call [`Peer::stop`].
pub struct Peer {
    shared: Arc<Shared>,
    tasks: Mutex<Option<Tasks>>,
}

impl Peer {
    /// Bind the listener, resolve the advertised address, and start the
    /// RPC server and gossip engine in the background.
    pub async fn spawn(config: PeerConfig) -> Result<Peer, SpawnError> {
        let listener = TcpListener::bind(&config.self_addr)
            .await
            .map_err(|source| SpawnError::Bind {
                addr: config.self_addr.clone(),
                source,
            })?;
        let self_addr = listener
            .local_addr()
            .map_err(|source| SpawnError::Bind {
                addr: config.self_addr.clone(),
                source,
            })?
            .to_string();

        let shared = Arc::new(Shared {
            table: MembershipTable::new(self_addr),
            token: CancellationToken::new(),
            dials: Mutex::new(JoinSet::new()),
            config,
        });

        let server = tokio::spawn(server::run(shared.clone(), listener));
        let engine = tokio::spawn(engine::run(shared.clone()));
        info!("{} started", shared.table.self_addr());

        Ok(Peer {
            shared,
            tasks: Mutex::new(Some(Tasks { engine, server })),
        })
    }

    /// The resolved advertised address.
    pub fn addr(&self) -> &str {
        self.shared.table.self_addr()
    }

    /// Register a seed address as an entry point into the cluster.
    ///
    /// Dial and validation run in the background; a failed dial is logged
    /// and leaves the membership untouched.
    pub fn add_seed(&self, addr: impl Into<String>) {
        self.shared.spawn_add_seed(addr.into());
    }

    /// Replace the metadata this peer advertises about itself.
    pub fn update_self_info(&self, info: PeerInfo) {
        info!("{} update info: {:?}", self.addr(), info);
        self.shared.table.update_self_info(info);
    }

    /// Snapshot of live members, keyed by address. Always contains self.
    pub fn members(&self) -> HashMap<String, PeerInfo> {
        self.shared.table.members()
    }

    /// Membership counters.
    pub fn stats(&self) -> MembershipStats {
        self.shared.table.stats()
    }

    /// Stop the engine and server, then close every outbound connection.
    /// Idempotent; later calls return immediately.
    pub async fn stop(&self) {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else { return };

        self.shared.token.cancel();
        let _ = tasks.engine.await;
        let _ = tasks.server.await;

        // Join in-flight dials before closing the table so none of them
        // can slip a fresh connection in afterward.
        let mut dials = std::mem::take(&mut *self.shared.dials.lock());
        while dials.join_next().await.is_some() {}

        self.shared.table.close_all();
        info!("{} stopped", self.addr());
    }
}
