//! The published device snapshot.
//!
//! The control task overwrites one `DeviceState` per tick and readers take
//! whole copies, so a reader sees a value at most one tick stale but never
//! torn. The 20-byte wire form is a little-endian struct dump with three
//! trailing padding bytes.

use crate::device::DeviceMode;
use crate::errors::SnapshotError;
use crate::valve::{ValveState, PORT_UNKNOWN};

/// Serialized size of a snapshot.
pub const DEVICE_STATE_WIRE_LEN: usize = 20;

/// A snapshot of the whole device, published every control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceState {
    /// Current pump speed in mL/min (signed).
    pub speed_ml_min: f32,
    /// Volume delivered since the current step began, in µL.
    pub volume_ul: f32,
    /// Index of the executing program step.
    pub step_idx: u16,
    pub running: bool,
    /// Fractional completion of the current step, 0…255.
    pub progress: u8,
    /// Reagent valve port, 0…5 or 0xFF when unknown.
    pub reagent_port: u8,
    /// Column valve port, 0…5 or 0xFF when unknown.
    pub column_port: u8,
    pub reagent_valve: ValveState,
    pub column_valve: ValveState,
    pub mode: DeviceMode,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            speed_ml_min: 0.0,
            volume_ul: 0.0,
            step_idx: 0,
            running: false,
            progress: 0,
            reagent_port: PORT_UNKNOWN,
            column_port: PORT_UNKNOWN,
            reagent_valve: ValveState::Reset,
            column_valve: ValveState::Reset,
            mode: DeviceMode::Initializing,
        }
    }
}

impl DeviceState {
    pub fn to_wire(&self) -> [u8; DEVICE_STATE_WIRE_LEN] {
        let mut b = [0u8; DEVICE_STATE_WIRE_LEN];
        b[0..4].copy_from_slice(&self.speed_ml_min.to_le_bytes());
        b[4..8].copy_from_slice(&self.volume_ul.to_le_bytes());
        b[8..10].copy_from_slice(&self.step_idx.to_le_bytes());
        b[10] = u8::from(self.running);
        b[11] = self.progress;
        b[12] = self.reagent_port;
        b[13] = self.column_port;
        b[14] = self.reagent_valve.wire();
        b[15] = self.column_valve.wire();
        b[16] = self.mode.wire();
        // b[17..20] stay zero: alignment padding.
        b
    }

    pub fn from_wire(b: &[u8]) -> Result<Self, SnapshotError> {
        if b.len() < DEVICE_STATE_WIRE_LEN {
            return Err(SnapshotError::Truncated);
        }
        Ok(Self {
            speed_ml_min: f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            volume_ul: f32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            step_idx: u16::from_le_bytes([b[8], b[9]]),
            running: b[10] != 0,
            progress: b[11],
            reagent_port: b[12],
            column_port: b[13],
            reagent_valve: ValveState::from_wire(b[14]),
            column_valve: ValveState::from_wire(b[15]),
            mode: DeviceMode::from_wire(b[16]),
        })
    }
}
