#![deny(clippy::all)]
#![deny(warnings)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # Chromatography Controller Command-Link Protocol
//!
//! A `no_std` implementation of the framed binary protocol spoken between
//! the controller and its operator host over a serial link.
//!
//! ## Key Components
//!
//! - **[`frame`]**: The frame encoder and a byte-at-a-time `FrameReceiver`
//!   state machine, designed for use from a blocking serial read loop.
//! - **[`commands`]**: The typed `Command` enum with payload parsing and
//!   encoding for every command id.
//! - **[`crc`]**: A `const fn` implementation of the CRC-32 used for frame
//!   integrity.
//! - **[`codec`]** (std): a `tokio_util` codec for the host side of the
//!   link.
//!
//! ## Design
//!
//! The receiver is designed for robustness on a noisy line:
//!
//! - **Streaming**: bytes are pushed as they arrive; frame boundaries are
//!   recovered from the two start bytes.
//! - **Silent drop**: frames with a bad length or checksum are discarded
//!   without acknowledgement, and the receiver resynchronises on the next
//!   start sequence.
//! - **No allocation**: the receive buffer is a fixed array sized by the
//!   one-byte length field.

pub mod commands;
pub mod crc;
pub mod frame;

#[cfg(feature = "std")]
pub mod codec;

/// Common error type for the protocol crate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A frame declared a length outside the valid `[5, 255]` range.
    InvalidLength,
    /// The CRC-32 checksum of a received frame was invalid.
    InvalidCrc,
    /// The payload could not be decoded into a known command shape.
    InvalidPayload,
    /// A buffer was too small for the requested operation.
    BufferTooSmall,
}
