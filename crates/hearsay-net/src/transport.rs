//! Outbound connection adapter.
//!
//! One persistent framed TCP connection per known partner. Calls on it
//! are sequential frame sequences: a ping round-trip, or a full exchange
//! in which the initiator sends its records first and reads second. The
//! gossip engine is the only caller of [`Connection::begin_exchange`],
//! so no multiplexing is needed.

use crate::framing::{Frame, FrameCodec, FrameError, FrameType};
use futures::{SinkExt, StreamExt};
use hearsay_core::PeerRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::codec::Framed;
use tracing::debug;

/// Transport errors. Dial, ping, and exchange failures all mean the same
/// thing to the engine: the partner is unreachable.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("dial timed out")]
    DialTimeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unexpected frame: {0:?}")]
    UnexpectedFrame(FrameType),
}

type FramedStream = Framed<TcpStream, FrameCodec>;

/// Persistent outbound connection to one partner.
pub struct Connection {
    addr: String,
    stream: Mutex<FramedStream>,
    open: AtomicBool,
}

impl Connection {
    /// Open a connection to `addr` and validate it with a ping round-trip.
    ///
    /// `timeout` bounds the whole call, connect and validating ping both,
    /// so a peer that accepts but never answers cannot wedge the caller.
    pub async fn dial(addr: &str, timeout: Duration) -> Result<Self, TransportError> {
        let conn = tokio::time::timeout(timeout, async {
            let stream = TcpStream::connect(addr).await?;
            let _ = stream.set_nodelay(true);

            let conn = Self {
                addr: addr.to_string(),
                stream: Mutex::new(Framed::new(stream, FrameCodec::new())),
                open: AtomicBool::new(true),
            };
            conn.ping().await?;
            Ok::<_, TransportError>(conn)
        })
        .await
        .map_err(|_| TransportError::DialTimeout)??;

        debug!("dialed {}", addr);
        Ok(conn)
    }

    /// The remote address this connection was dialed with.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Round-trip a ping frame.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let mut stream = self.lock_open().await?;
        stream.send(Frame::ping()).await?;
        match stream.next().await {
            Some(Ok(frame)) if frame.frame_type == FrameType::Pong => Ok(()),
            Some(Ok(frame)) => Err(TransportError::UnexpectedFrame(frame.frame_type)),
            Some(Err(err)) => Err(err.into()),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    /// Start a bidirectional exchange. The returned handle owns the
    /// connection until dropped; send all records, half-close with
    /// [`Exchange::finish_send`], then drain the remote's records.
    pub async fn begin_exchange(&self) -> Result<Exchange<'_>, TransportError> {
        let stream = self.lock_open().await?;
        Ok(Exchange { stream })
    }

    /// Whether the connection has been closed locally.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Idempotent; the socket itself is
    /// released when the last handle drops.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, FramedStream>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(self.stream.lock().await)
    }
}

/// In-flight exchange on a [`Connection`].
pub struct Exchange<'a> {
    stream: MutexGuard<'a, FramedStream>,
}

impl Exchange<'_> {
    /// Stream one record to the remote.
    pub async fn send(&mut self, record: &PeerRecord) -> Result<(), TransportError> {
        self.stream.send(Frame::record(record)?).await?;
        Ok(())
    }

    /// Half-close the send side: no more records will follow.
    pub async fn finish_send(&mut self) -> Result<(), TransportError> {
        self.stream.send(Frame::records_done()).await?;
        Ok(())
    }

    /// Receive the next record, or `None` once the remote half-closes.
    pub async fn recv(&mut self) -> Result<Option<PeerRecord>, TransportError> {
        match self.stream.next().await {
            Some(Ok(frame)) => match frame.frame_type {
                FrameType::Record => Ok(Some(frame.decode_record()?)),
                FrameType::RecordsDone => Ok(None),
                other => Err(TransportError::UnexpectedFrame(other)),
            },
            Some(Err(err)) => Err(err.into()),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearsay_core::PeerInfo;
    use tokio::net::TcpListener;

    const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

    /// Minimal server half of the protocol: answer pings, echo exchanges.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, FrameCodec::new());
                    let mut batch = Vec::new();
                    while let Some(Ok(frame)) = framed.next().await {
                        match frame.frame_type {
                            FrameType::Ping => framed.send(Frame::pong()).await.unwrap(),
                            FrameType::Record => batch.push(frame),
                            FrameType::RecordsDone => {
                                for frame in batch.drain(..) {
                                    framed.send(frame).await.unwrap();
                                }
                                framed.send(Frame::records_done()).await.unwrap();
                            }
                            FrameType::Pong => {}
                        }
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_dial_validates_with_ping() {
        let addr = spawn_echo_server().await;
        let conn = Connection::dial(&addr, DIAL_TIMEOUT).await.unwrap();
        assert!(conn.is_open());
        conn.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop a listener so the port is free but unserved.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(Connection::dial(&addr, DIAL_TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn test_exchange_roundtrip() {
        let addr = spawn_echo_server().await;
        let conn = Connection::dial(&addr, DIAL_TIMEOUT).await.unwrap();

        let record = PeerRecord {
            addr: "10.0.0.9:7000".to_string(),
            version: 7,
            deleted: false,
            info: PeerInfo::named("echo-me"),
        };

        let mut exchange = conn.begin_exchange().await.unwrap();
        exchange.send(&record).await.unwrap();
        exchange.finish_send().await.unwrap();

        let echoed = exchange.recv().await.unwrap().unwrap();
        assert_eq!(echoed, record);
        assert!(exchange.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_connection_refuses_calls() {
        let addr = spawn_echo_server().await;
        let conn = Connection::dial(&addr, DIAL_TIMEOUT).await.unwrap();

        conn.close();
        conn.close(); // idempotent
        assert!(!conn.is_open());
        assert!(matches!(conn.ping().await, Err(TransportError::ConnectionClosed)));
        assert!(conn.begin_exchange().await.is_err());
    }
}
