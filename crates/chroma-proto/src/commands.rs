//! Typed commands for the control link.
//!
//! The first payload byte of every frame is the command id; the remaining
//! bytes are its arguments. Multi-byte counters are big-endian on the wire,
//! floats are IEEE-754 single precision little-endian, matching the
//! controller's native layout.

use crate::Error;

/// Commands sent from the operator host to the controller.
///
/// Borrowed variants reference the frame receive buffer; they must be acted
/// on before the next frame is pushed.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Command<'a> {
    /// Liveness check; acked with code 0.
    Ping,
    /// Select the inlet reagent port and outlet column port.
    SetValves { reagent_port: u8, column_port: u8 },
    /// Manual pump setpoint: signed flow in mL/min, acceleration in
    /// mL/min/s.
    SetPump {
        flow_ml_min: f32,
        accel_ml_min_s: f32,
    },
    /// Reserved for the weight-sensor data path.
    GetWeight,
    /// Abort any execution and clear the stored program.
    InitProgramWrite,
    /// Append whole 16-byte program steps.
    WriteProgramBlock { data: &'a [u8] },
    /// Start executing the stored program from step 0.
    ExecuteProgram,
    /// Read back `count` steps starting at `start`.
    ReadProgramBlock { start: u16, count: u16 },
    /// Query stored length and capacity.
    GetProgramLength,
    GetReagents,
    GetColumns,
    /// Replace the 240-byte reagent name table.
    SetReagents { data: &'a [u8] },
    /// Replace the 240-byte column name table.
    SetColumns { data: &'a [u8] },
    /// Stop execution; the pump ramps down in the background.
    AbortProgram,
    /// Read the latest published device snapshot.
    GetDeviceState,
    /// Reserved: tare the weight sensor.
    TareWeight,
    /// Any id outside the table; acked with code 1.
    Unknown(u8),
}

fn fixed<const N: usize>(args: &[u8]) -> Result<&[u8; N], Error> {
    args.try_into().map_err(|_| Error::InvalidPayload)
}

fn empty(args: &[u8]) -> Result<(), Error> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidPayload)
    }
}

impl<'a> Command<'a> {
    /// The wire id of this command.
    pub fn id(&self) -> u8 {
        match self {
            Command::Ping => 0,
            Command::SetValves { .. } => 1,
            Command::SetPump { .. } => 2,
            Command::GetWeight => 3,
            Command::InitProgramWrite => 4,
            Command::WriteProgramBlock { .. } => 5,
            Command::ExecuteProgram => 6,
            Command::ReadProgramBlock { .. } => 7,
            Command::GetProgramLength => 8,
            Command::GetReagents => 9,
            Command::GetColumns => 10,
            Command::SetReagents { .. } => 11,
            Command::SetColumns { .. } => 12,
            Command::AbortProgram => 13,
            Command::GetDeviceState => 14,
            Command::TareWeight => 15,
            Command::Unknown(id) => *id,
        }
    }

    /// Attempts to decode a frame payload into a command.
    ///
    /// Argument lengths are checked strictly: a known id with malformed
    /// arguments is an [`Error::InvalidPayload`], which the dispatcher
    /// answers with a non-zero ack.
    pub fn parse(payload: &'a [u8]) -> Result<Self, Error> {
        let (&id, args) = payload.split_first().ok_or(Error::InvalidPayload)?;
        let cmd = match id {
            0 => {
                empty(args)?;
                Command::Ping
            }
            1 => {
                let a = fixed::<2>(args)?;
                Command::SetValves {
                    reagent_port: a[0],
                    column_port: a[1],
                }
            }
            2 => {
                let a = fixed::<8>(args)?;
                Command::SetPump {
                    flow_ml_min: f32::from_le_bytes([a[0], a[1], a[2], a[3]]),
                    accel_ml_min_s: f32::from_le_bytes([a[4], a[5], a[6], a[7]]),
                }
            }
            3 => {
                empty(args)?;
                Command::GetWeight
            }
            4 => {
                empty(args)?;
                Command::InitProgramWrite
            }
            5 => Command::WriteProgramBlock { data: args },
            6 => {
                empty(args)?;
                Command::ExecuteProgram
            }
            7 => {
                let a = fixed::<4>(args)?;
                Command::ReadProgramBlock {
                    start: u16::from_be_bytes([a[0], a[1]]),
                    count: u16::from_be_bytes([a[2], a[3]]),
                }
            }
            8 => {
                empty(args)?;
                Command::GetProgramLength
            }
            9 => {
                empty(args)?;
                Command::GetReagents
            }
            10 => {
                empty(args)?;
                Command::GetColumns
            }
            11 => Command::SetReagents { data: args },
            12 => Command::SetColumns { data: args },
            13 => {
                empty(args)?;
                Command::AbortProgram
            }
            14 => {
                empty(args)?;
                Command::GetDeviceState
            }
            15 => {
                empty(args)?;
                Command::TareWeight
            }
            other => Command::Unknown(other),
        };
        Ok(cmd)
    }

    /// Encodes this command as a frame payload into `out`.
    ///
    /// Returns the payload length. Used by the host side of the link.
    pub fn write_payload(&self, out: &mut [u8]) -> Result<usize, Error> {
        let args_len = match self {
            Command::SetValves { .. } => 2,
            Command::SetPump { .. } => 8,
            Command::ReadProgramBlock { .. } => 4,
            Command::WriteProgramBlock { data }
            | Command::SetReagents { data }
            | Command::SetColumns { data } => data.len(),
            _ => 0,
        };
        let total = 1 + args_len;
        if out.len() < total {
            return Err(Error::BufferTooSmall);
        }

        out[0] = self.id();
        match self {
            Command::SetValves {
                reagent_port,
                column_port,
            } => {
                out[1] = *reagent_port;
                out[2] = *column_port;
            }
            Command::SetPump {
                flow_ml_min,
                accel_ml_min_s,
            } => {
                out[1..5].copy_from_slice(&flow_ml_min.to_le_bytes());
                out[5..9].copy_from_slice(&accel_ml_min_s.to_le_bytes());
            }
            Command::ReadProgramBlock { start, count } => {
                out[1..3].copy_from_slice(&start.to_be_bytes());
                out[3..5].copy_from_slice(&count.to_be_bytes());
            }
            Command::WriteProgramBlock { data }
            | Command::SetReagents { data }
            | Command::SetColumns { data } => {
                out[1..total].copy_from_slice(data);
            }
            _ => {}
        }
        Ok(total)
    }
}
