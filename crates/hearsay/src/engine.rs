//! Periodic dissemination loop.
//!
//! On every tick the engine rotates the partner ring once and performs a
//! single two-way exchange: stream the full local snapshot out, half-close,
//! drain the partner's snapshot, merge. A failed exchange tombstones the
//! partner; there is no retry within a tick.

use crate::peer::Shared;
use hearsay_net::{Connection, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// An exchange that overruns this many tick periods is written off as a
/// dead partner.
const EXCHANGE_DEADLINE_TICKS: u32 = 4;

/// Exchange errors
#[derive(Debug, Error)]
pub(crate) enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("exchange deadline exceeded")]
    DeadlineExceeded,
    /// Shutdown observed mid-exchange. Not the partner's fault: the tick
    /// loop unwinds without evicting anyone.
    #[error("cancelled")]
    Cancelled,
}

/// Engine loop; exits when the peer's token is cancelled.
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut ticker = interval(shared.config.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shared.token.cancelled() => {
                debug!("{} gossip loop stopped", shared.table.self_addr());
                return;
            }
            _ = ticker.tick() => {
                gossip_round(&shared).await;
            }
        }
    }
}

/// One tick: at most one exchange with one partner.
async fn gossip_round(shared: &Arc<Shared>) {
    let Some((partner, conn)) = shared.table.pick_partner() else {
        return;
    };
    debug!("{} chose {} for exchange", shared.table.self_addr(), partner);

    let deadline = shared.config.ping_period * EXCHANGE_DEADLINE_TICKS;
    let result = match tokio::time::timeout(deadline, exchange_with(shared, &conn)).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::DeadlineExceeded),
    };

    match result {
        Ok(()) => {}
        Err(ExchangeError::Cancelled) => {}
        Err(err) => {
            shared.table.delete_seed(&partner);
            warn!(
                "{} deleted {} after failed exchange: {}",
                shared.table.self_addr(),
                partner,
                err
            );
        }
    }
}

/// Initiator side of the exchange: send first, then read.
async fn exchange_with(shared: &Arc<Shared>, conn: &Connection) -> Result<(), ExchangeError> {
    let mut exchange = conn.begin_exchange().await?;

    for record in shared.table.wire_snapshot() {
        if shared.token.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }
        exchange.send(&record).await?;
    }
    exchange.finish_send().await?;

    let mut incoming = Vec::new();
    while let Some(record) = exchange.recv().await? {
        if shared.token.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }
        incoming.push(record);
    }
    drop(exchange);

    shared.absorb(incoming);
    Ok(())
}
