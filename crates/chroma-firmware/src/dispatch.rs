//! Command dispatch: maps decoded link commands onto the machine.
//!
//! Every command gets a reply payload. Data commands answer with their
//! data; everything else answers with a one-byte ack code. Frame-level
//! errors never reach this layer (the receiver drops those silently).

use crate::machine::Machine;
use crate::names::{NameTable, NAME_TABLE_WIRE_LEN};
use chroma_proto::commands::Command;
use chroma_proto::frame::MAX_PAYLOAD_LEN;
use fluidics::hal::{HomeSwitch, StepperBackend};
use fluidics::program::STEP_WIRE_LEN;
use fluidics::{Program, ProgramError, PumpCommand};

/// Command accepted.
pub const ACK_OK: u8 = 0;
/// Unknown id or malformed arguments.
pub const ACK_ERROR: u8 = 1;
/// Program append refused: it would exceed capacity.
pub const ACK_CAPACITY: u8 = 2;

/// Steps per frame: bounded by the one-byte LEN field.
pub const MAX_STEPS_PER_FRAME: usize = MAX_PAYLOAD_LEN / STEP_WIRE_LEN;

/// A reply payload, bounded by the frame payload size.
pub type Reply = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

/// Builds a one-byte ack reply.
pub fn ack(code: u8) -> Reply {
    let mut reply = Reply::new();
    let _ = reply.push(code);
    reply
}

fn data_reply(bytes: &[u8]) -> Reply {
    Reply::from_slice(bytes).unwrap_or_default()
}

/// Executes one command against the machine and returns the reply payload.
pub fn dispatch<E, PB, RB, RS, CB, CS>(
    machine: &mut Machine<PB, RB, RS, CB, CS>,
    cmd: Command<'_>,
    now_ms: u32,
) -> Reply
where
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    match cmd {
        Command::Ping => ack(ACK_OK),

        Command::SetValves {
            reagent_port,
            column_port,
        } => {
            machine.device.set_valves(reagent_port, column_port);
            ack(ACK_OK)
        }

        Command::SetPump {
            flow_ml_min,
            accel_ml_min_s,
        } => {
            machine
                .device
                .set_pump(PumpCommand::new(flow_ml_min, accel_ml_min_s));
            ack(ACK_OK)
        }

        // Reserved: the weight-sensor data path is handled elsewhere.
        Command::GetWeight | Command::TareWeight => ack(ACK_OK),

        Command::InitProgramWrite => {
            machine.executor.abort(&mut machine.device);
            machine.program.clear();
            machine.mark_program_dirty();
            ack(ACK_OK)
        }

        Command::WriteProgramBlock { data } => match machine.program.append_wire(data) {
            Ok(_) => {
                machine.mark_program_dirty();
                ack(ACK_OK)
            }
            Err(ProgramError::CapacityExceeded) => ack(ACK_CAPACITY),
            Err(ProgramError::BlockNotAligned) => ack(ACK_ERROR),
        },

        Command::ExecuteProgram => {
            machine
                .executor
                .execute(now_ms, &machine.program, &mut machine.device);
            ack(ACK_OK)
        }

        Command::ReadProgramBlock { start, count } => {
            let count = (count as usize).min(MAX_STEPS_PER_FRAME);
            let mut buf = [0u8; MAX_PAYLOAD_LEN];
            let n = machine.program.read_wire(start as usize, count, &mut buf);
            if n == 0 {
                // A frame cannot carry an empty payload.
                ack(ACK_ERROR)
            } else {
                data_reply(&buf[..n])
            }
        }

        Command::GetProgramLength => {
            let mut buf = [0u8; 4];
            buf[0..2].copy_from_slice(&(machine.program.len() as u16).to_be_bytes());
            buf[2..4].copy_from_slice(&(Program::capacity() as u16).to_be_bytes());
            data_reply(&buf)
        }

        Command::GetReagents => data_reply(&machine.reagent_names.to_wire()),
        Command::GetColumns => data_reply(&machine.column_names.to_wire()),

        Command::SetReagents { data } => match NameTable::from_wire(data) {
            Some(table) => {
                machine.reagent_names = table;
                machine.mark_names_dirty();
                ack(ACK_OK)
            }
            None => ack(ACK_ERROR),
        },

        Command::SetColumns { data } => match NameTable::from_wire(data) {
            Some(table) => {
                machine.column_names = table;
                machine.mark_names_dirty();
                ack(ACK_OK)
            }
            None => ack(ACK_ERROR),
        },

        Command::AbortProgram => {
            machine.executor.abort(&mut machine.device);
            ack(ACK_OK)
        }

        Command::GetDeviceState => data_reply(&machine.state().to_wire()),

        Command::Unknown(_) => ack(ACK_ERROR),
    }
}

// NAME_TABLE_WIRE_LEN is part of this module's contract with the protocol:
// a full table fits one frame payload.
const _: () = assert!(NAME_TABLE_WIRE_LEN <= MAX_PAYLOAD_LEN);
