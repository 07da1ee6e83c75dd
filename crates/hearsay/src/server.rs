//! RPC server: the accept loop and the per-connection handlers serving
//! `Ping` and `ShareData` from remote peers.
//!
//! The server half of an exchange mirrors the engine with the phases
//! swapped: read the initiator's records to exhaustion, merge, then send
//! the post-merge snapshot back. Each side drains the other before
//! producing, so the exchange cannot deadlock on flow control.

use crate::peer::Shared;
use futures::{SinkExt, StreamExt};
use hearsay_net::{Frame, FrameCodec, FrameType, TransportError};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type ServerStream = Framed<TcpStream, FrameCodec>;

/// Accept loop. On cancellation it stops accepting, then drains the
/// in-flight connection handlers before returning, so awaiting this
/// task is enough to know no handler is still mid-exchange.
pub(crate) async fn run(shared: Arc<Shared>, listener: TcpListener) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shared.token.cancelled() => break,
            // Reap finished handlers so the set stays small.
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        let shared = shared.clone();
                        handlers.spawn(async move {
                            if let Err(err) = serve_connection(&shared, stream).await {
                                debug!(
                                    "{} connection from {} ended: {}",
                                    shared.table.self_addr(),
                                    remote,
                                    err
                                );
                            }
                        });
                    }
                    Err(err) => {
                        warn!("{} accept error: {}", shared.table.self_addr(), err);
                    }
                }
            }
        }
    }

    // Handlers observe the cancelled token and finish promptly.
    drop(listener);
    while handlers.join_next().await.is_some() {}
    debug!("{} server stopped", shared.table.self_addr());
}

/// Serve one inbound connection until the remote hangs up or we shut down.
async fn serve_connection(shared: &Arc<Shared>, stream: TcpStream) -> Result<(), TransportError> {
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, FrameCodec::new());

    while let Some(frame) = next_frame(shared, &mut framed).await? {
        match frame.frame_type {
            FrameType::Ping => framed.send(Frame::pong()).await?,
            FrameType::Record | FrameType::RecordsDone => {
                share_data(shared, &mut framed, frame).await?;
            }
            other => return Err(TransportError::UnexpectedFrame(other)),
        }
    }
    Ok(())
}

/// Server half of an exchange, starting from its first frame.
async fn share_data(
    shared: &Arc<Shared>,
    framed: &mut ServerStream,
    first: Frame,
) -> Result<(), TransportError> {
    let mut incoming = Vec::new();
    let mut frame = first;
    loop {
        match frame.frame_type {
            FrameType::Record => incoming.push(frame.decode_record()?),
            FrameType::RecordsDone => break,
            FrameType::Ping => framed.send(Frame::pong()).await?,
            other => return Err(TransportError::UnexpectedFrame(other)),
        }
        frame = match next_frame(shared, framed).await? {
            Some(frame) => frame,
            // Remote died (or we shut down) mid-batch; nothing to merge.
            None => return Err(TransportError::ConnectionClosed),
        };
    }

    shared.absorb(incoming);
    debug!("{} received remote snapshot", shared.table.self_addr());

    for record in shared.table.wire_snapshot() {
        if shared.token.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        framed.send(Frame::record(&record)?).await?;
    }
    framed.send(Frame::records_done()).await?;
    debug!("{} sent local snapshot", shared.table.self_addr());

    Ok(())
}

/// Next inbound frame; `None` on remote EOF or local shutdown.
async fn next_frame(
    shared: &Shared,
    framed: &mut ServerStream,
) -> Result<Option<Frame>, TransportError> {
    tokio::select! {
        _ = shared.token.cancelled() => Ok(None),
        frame = framed.next() => Ok(frame.transpose()?),
    }
}
