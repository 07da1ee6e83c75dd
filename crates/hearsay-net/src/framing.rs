//! Message framing for the gossip wire protocol.
//!
//! Provides length-prefixed framing for the four logical messages:
//! ping, pong, a single peer record, and the end-of-records marker that
//! stands in for a stream half-close.

use bytes::{Buf, BufMut, BytesMut};
use hearsay_core::PeerRecord;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (1 MB). Records are tiny; anything near this bound
/// is a corrupt or hostile stream.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
    #[error("zero-length frame body")]
    EmptyBody,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
    #[error("unknown frame type: {0}")]
    UnknownType(u8),
}

/// A framed message
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Payload bytes (postcard-encoded for [`FrameType::Record`])
    pub payload: Vec<u8>,
}

/// Frame types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Liveness probe
    Ping = 0,
    /// Probe response
    Pong = 1,
    /// One peer record of a snapshot
    Record = 10,
    /// Sender has no more records (half-close of its send side)
    RecordsDone = 11,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ping),
            1 => Ok(Self::Pong),
            10 => Ok(Self::Record),
            11 => Ok(Self::RecordsDone),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl Frame {
    /// Create a new frame
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }

    /// Create a ping frame
    pub fn ping() -> Self {
        Self::new(FrameType::Ping, vec![])
    }

    /// Create a pong frame
    pub fn pong() -> Self {
        Self::new(FrameType::Pong, vec![])
    }

    /// Create an end-of-records frame
    pub fn records_done() -> Self {
        Self::new(FrameType::RecordsDone, vec![])
    }

    /// Encode a peer record into a frame
    pub fn record(record: &PeerRecord) -> Result<Self, FrameError> {
        let payload = postcard::to_stdvec(record)?;
        Ok(Self::new(FrameType::Record, payload))
    }

    /// Decode the payload of a [`FrameType::Record`] frame
    pub fn decode_record(&self) -> Result<PeerRecord, FrameError> {
        Ok(postcard::from_bytes(&self.payload)?)
    }
}

/// Codec for the length-prefixed gossip frames.
///
/// Each frame is a big-endian `u32` body length followed by the body:
/// one type byte plus the payload. The length word covers the body only.
#[derive(Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        // Validate the length word before waiting for the body; a bogus
        // length must fail fast, not stall the connection.
        let body_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if body_len == 0 {
            return Err(FrameError::EmptyBody);
        }
        if body_len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(body_len));
        }
        if src.len() < 4 + body_len {
            return Ok(None);
        }

        // Take the whole frame, shed the length word, split body into
        // type byte and payload.
        let mut body = src.split_to(4 + body_len).split_off(4);
        let frame_type = FrameType::try_from(body[0])?;
        body.advance(1);

        Ok(Some(Frame {
            frame_type,
            payload: body.to_vec(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = 1 + frame.payload.len();
        if body_len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(body_len));
        }

        dst.reserve(4 + body_len);
        dst.put_u32(body_len as u32);
        dst.put_u8(frame.frame_type as u8);
        dst.put_slice(&frame.payload);

        Ok(())
    }
}
