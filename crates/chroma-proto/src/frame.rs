//! Frame encoding and the streaming receiver state machine.
//!
//! Wire format: `START1 START2 | LEN | PAYLOAD | CRC32`, where `LEN` counts
//! the payload plus the four big-endian CRC bytes. The CRC is computed over
//! the payload only.

use crate::{crc::crc32, Error};

/// First start byte of every frame.
pub const START1: u8 = 0x21;
/// Second start byte of every frame.
pub const START2: u8 = 0x37;

/// Number of CRC bytes trailing the payload.
pub const CRC_LEN: usize = 4;
/// Smallest valid value of the LEN byte (one payload byte + CRC).
pub const MIN_LEN_FIELD: usize = 5;
/// Largest payload a frame can carry (`255 - CRC_LEN`).
pub const MAX_PAYLOAD_LEN: usize = 255 - CRC_LEN;
/// Size of the largest possible frame on the wire.
pub const MAX_FRAME_LEN: usize = 2 + 1 + 255;

/// Encodes `payload` as a complete frame into `out`.
///
/// Returns the number of bytes written. The payload must be non-empty and
/// at most [`MAX_PAYLOAD_LEN`] bytes.
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::InvalidLength);
    }
    let total = 3 + payload.len() + CRC_LEN;
    if out.len() < total {
        return Err(Error::BufferTooSmall);
    }

    out[0] = START1;
    out[1] = START2;
    out[2] = (payload.len() + CRC_LEN) as u8;
    out[3..3 + payload.len()].copy_from_slice(payload);
    let crc = crc32(payload, payload.len());
    out[3 + payload.len()..total].copy_from_slice(&crc.to_be_bytes());
    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    WaitStart1,
    WaitStart2,
    RxLen,
    RxPayload,
}

/// A byte-at-a-time receiver for command-link frames.
///
/// The receiver holds at most one frame of buffer and resynchronises on the
/// start sequence after any error. Timeout policy is the caller's: a read
/// timeout while [`FrameReceiver::is_idle`] simply means no frame has
/// started; once a frame is in progress the caller is expected to keep
/// draining bytes, because a started frame completes promptly at line rate.
#[derive(Debug)]
pub struct FrameReceiver {
    state: RxState,
    buf: [u8; 255],
    need: usize,
    have: usize,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    /// Creates a new receiver in the idle state.
    pub fn new() -> Self {
        Self {
            state: RxState::WaitStart1,
            buf: [0; 255],
            need: 0,
            have: 0,
        }
    }

    /// Returns `true` while no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == RxState::WaitStart1
    }

    /// Discards any partial frame and returns to the idle state.
    pub fn reset(&mut self) {
        self.state = RxState::WaitStart1;
        self.have = 0;
        self.need = 0;
    }

    /// Feeds one received byte into the state machine.
    ///
    /// Returns `None` while more bytes are needed, `Some(Ok(payload))` when
    /// a frame passed its CRC check, and `Some(Err(_))` when a frame was
    /// dropped. Dropped frames are not acknowledged; the caller may log the
    /// error and continue pushing bytes.
    pub fn push(&mut self, byte: u8) -> Option<Result<&[u8], Error>> {
        match self.state {
            RxState::WaitStart1 => {
                if byte == START1 {
                    self.state = RxState::WaitStart2;
                }
                None
            }
            RxState::WaitStart2 => {
                self.state = match byte {
                    START2 => RxState::RxLen,
                    // A repeated START1 may itself begin a frame.
                    START1 => RxState::WaitStart2,
                    _ => RxState::WaitStart1,
                };
                None
            }
            RxState::RxLen => {
                let len = byte as usize;
                if len < MIN_LEN_FIELD {
                    self.state = RxState::WaitStart1;
                    return Some(Err(Error::InvalidLength));
                }
                self.need = len;
                self.have = 0;
                self.state = RxState::RxPayload;
                None
            }
            RxState::RxPayload => {
                self.buf[self.have] = byte;
                self.have += 1;
                if self.have < self.need {
                    return None;
                }

                self.state = RxState::WaitStart1;
                let payload_len = self.need - CRC_LEN;
                let p = payload_len;
                let rx_crc = u32::from_be_bytes([
                    self.buf[p],
                    self.buf[p + 1],
                    self.buf[p + 2],
                    self.buf[p + 3],
                ]);
                if crc32(&self.buf, payload_len) == rx_crc {
                    Some(Ok(&self.buf[..payload_len]))
                } else {
                    Some(Err(Error::InvalidCrc))
                }
            }
        }
    }
}
