//! Length-prefixed framing for the control channel
//!
//! Each frame is a 4-byte big-endian length followed by the payload; the
//! length counts the whole packet, prefix included. The handshake that opens
//! a connection is written raw, before the codec takes over the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix in bytes.
const PREFIX_LEN: usize = 4;

/// Upper bound on a single frame, prefix included. Control messages are small
/// JSON documents; anything near this limit is a corrupt or hostile peer.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds maximum of {MAX_FRAME_LEN}")]
    TooLong(usize),

    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for 4-byte big-endian length-prefixed frames.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&src[..PREFIX_LEN]);
        let total = u32::from_be_bytes(prefix) as usize;

        if total < PREFIX_LEN {
            return Err(FrameError::InvalidLength(total));
        }
        if total > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(total));
        }

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        Ok(Some(src.split_to(total - PREFIX_LEN).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        let total = item.len() + PREFIX_LEN;
        if total > MAX_FRAME_LEN {
            return Err(FrameError::TooLong(total));
        }

        dst.reserve(total);
        dst.put_u32(total as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
