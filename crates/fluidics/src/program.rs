//! Program storage and the 16-byte step wire format.
//!
//! A step serializes as `[reagent, column, 0, 0, flow f32, volume f32,
//! duration f32]` with little-endian floats. The two padding bytes keep the
//! floats 4-byte aligned; persisted programs and link transfers share this
//! exact layout, so it is reproduced byte-for-byte rather than derived from
//! the in-memory struct.

use crate::errors::ProgramError;
use heapless::Vec;

/// Serialized size of one step.
pub const STEP_WIRE_LEN: usize = 16;

/// Program capacity: a 64 KiB store of 16-byte steps.
pub const MAX_PROGRAM_STEPS: usize = 65_536 / STEP_WIRE_LEN;

/// Port value meaning "leave this valve where it is".
pub const PORT_KEEP_CURRENT: u8 = 0xFF;

/// One program instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramStep {
    /// Inlet port, or [`PORT_KEEP_CURRENT`].
    pub reagent_port: u8,
    /// Outlet port, or [`PORT_KEEP_CURRENT`].
    pub column_port: u8,
    /// Signed flow in mL/min.
    pub flow_ml_min: f32,
    /// Volume limit in mL; `+∞` means no volume limit.
    pub volume_ml: f32,
    /// Time limit in seconds; `+∞` means no time limit.
    pub duration_s: f32,
}

impl Default for ProgramStep {
    /// An inert step: no flow, no valve change, no termination.
    fn default() -> Self {
        Self {
            reagent_port: PORT_KEEP_CURRENT,
            column_port: PORT_KEEP_CURRENT,
            flow_ml_min: 0.0,
            volume_ml: f32::INFINITY,
            duration_s: f32::INFINITY,
        }
    }
}

impl ProgramStep {
    /// A flush: pump through the given ports for a time.
    pub fn flush(reagent_port: u8, column_port: u8, flow_ml_min: f32, duration_s: f32) -> Self {
        Self {
            reagent_port,
            column_port,
            flow_ml_min,
            volume_ml: f32::INFINITY,
            duration_s,
        }
    }

    /// A wait: valves untouched, pump idle, terminated by time.
    pub fn wait(duration_s: f32) -> Self {
        Self {
            duration_s,
            ..Self::default()
        }
    }

    pub fn to_wire(&self) -> [u8; STEP_WIRE_LEN] {
        let mut b = [0u8; STEP_WIRE_LEN];
        b[0] = self.reagent_port;
        b[1] = self.column_port;
        // b[2..4] stay zero: alignment padding.
        b[4..8].copy_from_slice(&self.flow_ml_min.to_le_bytes());
        b[8..12].copy_from_slice(&self.volume_ml.to_le_bytes());
        b[12..16].copy_from_slice(&self.duration_s.to_le_bytes());
        b
    }

    pub fn from_wire(b: &[u8; STEP_WIRE_LEN]) -> Self {
        Self {
            reagent_port: b[0],
            column_port: b[1],
            flow_ml_min: f32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            volume_ml: f32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            duration_s: f32::from_le_bytes([b[12], b[13], b[14], b[15]]),
        }
    }
}

/// The stored program: an ordered, bounded sequence of steps.
///
/// Mutation happens only between executions (or after an explicit
/// clear-for-write has aborted the executor); appends that would exceed
/// capacity are refused whole.
#[derive(Debug, Default)]
pub struct Program {
    steps: Vec<ProgramStep, MAX_PROGRAM_STEPS>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub const fn capacity() -> usize {
        MAX_PROGRAM_STEPS
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn get(&self, idx: usize) -> Option<ProgramStep> {
        self.steps.get(idx).copied()
    }

    pub fn push(&mut self, step: ProgramStep) -> Result<(), ProgramError> {
        self.steps
            .push(step)
            .map_err(|_| ProgramError::CapacityExceeded)
    }

    /// Appends a block of serialized steps. The block must be a non-empty
    /// whole number of steps and must fit the remaining capacity, else
    /// nothing is appended.
    pub fn append_wire(&mut self, data: &[u8]) -> Result<usize, ProgramError> {
        if data.is_empty() || data.len() % STEP_WIRE_LEN != 0 {
            return Err(ProgramError::BlockNotAligned);
        }
        let n = data.len() / STEP_WIRE_LEN;
        if self.steps.len() + n > MAX_PROGRAM_STEPS {
            return Err(ProgramError::CapacityExceeded);
        }
        for chunk in data.chunks_exact(STEP_WIRE_LEN) {
            let bytes: &[u8; STEP_WIRE_LEN] =
                chunk.try_into().map_err(|_| ProgramError::BlockNotAligned)?;
            self.steps
                .push(ProgramStep::from_wire(bytes))
                .map_err(|_| ProgramError::CapacityExceeded)?;
        }
        Ok(n)
    }

    /// Serializes up to `count` steps starting at `start` into `out`.
    /// Returns the number of bytes written.
    pub fn read_wire(&self, start: usize, count: usize, out: &mut [u8]) -> usize {
        let end = core::cmp::min(start.saturating_add(count), self.steps.len());
        let mut written = 0;
        for i in start..end {
            if written + STEP_WIRE_LEN > out.len() {
                break;
            }
            out[written..written + STEP_WIRE_LEN].copy_from_slice(&self.steps[i].to_wire());
            written += STEP_WIRE_LEN;
        }
        written
    }

    /// The persisted form: `u16` little-endian length, then the raw steps.
    #[cfg(feature = "std")]
    pub fn to_persist_bytes(&self) -> std::vec::Vec<u8> {
        let mut out = std::vec::Vec::with_capacity(2 + self.steps.len() * STEP_WIRE_LEN);
        out.extend_from_slice(&(self.steps.len() as u16).to_le_bytes());
        for step in &self.steps {
            out.extend_from_slice(&step.to_wire());
        }
        out
    }

    /// Parses the persisted form. Truncated or oversized data is an error;
    /// the caller falls back to an empty program.
    #[cfg(feature = "std")]
    pub fn from_persist_bytes(data: &[u8]) -> Result<Self, ProgramError> {
        if data.len() < 2 {
            return Err(ProgramError::BlockNotAligned);
        }
        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        if len > MAX_PROGRAM_STEPS {
            return Err(ProgramError::CapacityExceeded);
        }
        let body = &data[2..];
        if body.len() < len * STEP_WIRE_LEN {
            return Err(ProgramError::BlockNotAligned);
        }
        let mut program = Self::new();
        if len > 0 {
            program.append_wire(&body[..len * STEP_WIRE_LEN])?;
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wire_layout_is_fixed() {
        let step = ProgramStep::flush(1, 4, 1.5, 30.0);
        let wire = step.to_wire();
        assert_eq!(wire[0], 1);
        assert_eq!(wire[1], 4);
        // Alignment padding is always zero.
        assert_eq!(&wire[2..4], &[0, 0]);
        // 1.5f32 = 0x3FC00000, little-endian.
        assert_eq!(&wire[4..8], &[0x00, 0x00, 0xC0, 0x3F]);
        // Infinity = 0x7F800000.
        assert_eq!(&wire[8..12], &[0x00, 0x00, 0x80, 0x7F]);
        // 30.0f32 = 0x41F00000.
        assert_eq!(&wire[12..16], &[0x00, 0x00, 0xF0, 0x41]);
    }

    #[test]
    fn step_roundtrips_through_wire_form() {
        let steps = [
            ProgramStep::flush(0, 5, -2.25, 12.5),
            ProgramStep::wait(5.0),
            ProgramStep {
                reagent_port: 3,
                column_port: 2,
                flow_ml_min: 0.5,
                volume_ml: 1.25,
                duration_s: f32::INFINITY,
            },
        ];
        for step in steps {
            assert_eq!(ProgramStep::from_wire(&step.to_wire()), step);
        }
    }

    #[test]
    fn wait_steps_keep_both_valves() {
        let step = ProgramStep::wait(5.0);
        assert_eq!(step.reagent_port, PORT_KEEP_CURRENT);
        assert_eq!(step.column_port, PORT_KEEP_CURRENT);
        assert_eq!(step.flow_ml_min, 0.0);
        assert!(step.volume_ml.is_infinite());
    }

    #[test]
    fn append_rejects_misaligned_blocks() {
        let mut program = Program::new();
        assert_eq!(program.append_wire(&[]), Err(ProgramError::BlockNotAligned));
        assert_eq!(
            program.append_wire(&[0u8; 17]),
            Err(ProgramError::BlockNotAligned)
        );
        assert_eq!(program.len(), 0);
    }

    #[test]
    fn append_refuses_over_capacity_whole() {
        let mut program = Program::new();
        let step = ProgramStep::wait(1.0);
        for _ in 0..MAX_PROGRAM_STEPS {
            program.push(step).unwrap();
        }
        assert_eq!(program.len(), MAX_PROGRAM_STEPS);

        let block = step.to_wire();
        assert_eq!(
            program.append_wire(&block),
            Err(ProgramError::CapacityExceeded)
        );
        assert_eq!(program.len(), MAX_PROGRAM_STEPS);
    }

    #[test]
    fn multi_block_append_grows_monotonically() {
        let mut program = Program::new();
        let mut block = std::vec::Vec::new();
        for i in 0..15 {
            block.extend_from_slice(&ProgramStep::flush(i % 6, 0, 1.0, 1.0).to_wire());
        }
        assert_eq!(program.append_wire(&block), Ok(15));
        assert_eq!(program.append_wire(&block), Ok(15));
        assert_eq!(program.len(), 30);
        assert_eq!(program.get(17).unwrap().reagent_port, 2);
    }

    #[test]
    fn read_wire_clamps_to_available_steps() {
        let mut program = Program::new();
        for i in 0..4 {
            program.push(ProgramStep::flush(i, i, 1.0, 1.0)).unwrap();
        }
        let mut out = [0u8; 16 * 8];
        assert_eq!(program.read_wire(2, 10, &mut out), 32);
        assert_eq!(out[0], 2);
        assert_eq!(out[16], 3);
        assert_eq!(program.read_wire(9, 1, &mut out), 0);
    }

    #[test]
    fn persist_roundtrip() {
        let mut program = Program::new();
        program.push(ProgramStep::flush(1, 0, 2.0, 30.0)).unwrap();
        program.push(ProgramStep::wait(5.0)).unwrap();

        let bytes = program.to_persist_bytes();
        assert_eq!(&bytes[..2], &[2, 0]);
        assert_eq!(bytes.len(), 2 + 32);

        let restored = Program::from_persist_bytes(&bytes).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(0), program.get(0));
        assert_eq!(restored.get(1), program.get(1));
    }

    #[test]
    fn persist_rejects_truncated_and_oversized_data() {
        assert!(Program::from_persist_bytes(&[]).is_err());
        assert!(Program::from_persist_bytes(&[5, 0, 1, 2]).is_err());
        let oversized = ((MAX_PROGRAM_STEPS + 1) as u16).to_le_bytes();
        assert!(Program::from_persist_bytes(&oversized).is_err());
    }
}
