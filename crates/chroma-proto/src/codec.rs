//! Host-side framing for async transports.
//!
//! Wraps the wire format in a `tokio_util` codec so the host can speak the
//! link over a serial port or a socket with `Framed`. Items are raw frame
//! payloads; command typing stays in [`crate::commands`].

use crate::crc::crc32;
use crate::frame::{encode_frame, CRC_LEN, MAX_FRAME_LEN, MIN_LEN_FIELD, START1, START2};
use crate::Error;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Errors surfaced by the host-side framed transport.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A payload could not be framed.
    #[error("frame error: {0:?}")]
    Frame(Error),
    /// The underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A codec for encoding and decoding command-link frames.
///
/// Corrupt frames (bad length or CRC) are dropped silently, mirroring the
/// controller's receiver: the stream resynchronises on the next start
/// sequence and the caller observes nothing but a missing response.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new `FrameCodec`.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = encode_frame(&item, &mut buf).map_err(CodecError::Frame)?;
        dst.extend_from_slice(&buf[..n]);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Find the start sequence.
            let Some(pos) = src.windows(2).position(|w| w == [START1, START2]) else {
                // Keep a trailing START1; its partner may be in the next
                // read.
                if src.last() == Some(&START1) {
                    let keep = src.len() - 1;
                    src.advance(keep);
                } else {
                    src.clear();
                }
                return Ok(None);
            };
            src.advance(pos);

            if src.len() < 3 {
                return Ok(None);
            }
            let len = src[2] as usize;
            if len < MIN_LEN_FIELD {
                // Bad length: skip the start pair and rescan.
                src.advance(2);
                continue;
            }
            let total = 3 + len;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let frame = src.split_to(total);
            let payload_len = len - CRC_LEN;
            let payload = &frame[3..3 + payload_len];
            let rx_crc = u32::from_be_bytes([
                frame[total - 4],
                frame[total - 3],
                frame[total - 2],
                frame[total - 1],
            ]);
            if crc32(payload, payload_len) == rx_crc {
                return Ok(Some(payload.to_vec()));
            }
            // CRC mismatch: the frame is already consumed; rescan what is
            // left.
        }
    }
}
