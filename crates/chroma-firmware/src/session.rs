//! The comm-task receive loop: bytes in, reply frames out.
//!
//! Reads run with a short timeout so the loop stays responsive while idle;
//! a frame in progress is simply awaited, since a started frame completes
//! promptly at line rate. Frame errors are logged and dropped without an
//! acknowledgement.

use crate::dispatch::{ack, dispatch, ACK_ERROR};
use crate::machine::Machine;
use chroma_proto::commands::Command;
use chroma_proto::frame::{encode_frame, FrameReceiver, MAX_FRAME_LEN};
use fluidics::hal::{HomeSwitch, StepperBackend};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-read timeout while waiting for a frame to start.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Runs one client session until the peer disconnects or the transport
/// fails. Commands are dispatched under the machine lock between control
/// ticks, so a setpoint takes effect within one tick.
pub fn run_session<T, E, PB, RB, RS, CB, CS>(
    mut io: T,
    machine: &Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
    now_ms: &dyn Fn() -> u32,
) -> std::io::Result<()>
where
    T: Read + Write,
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    let mut rx = FrameReceiver::new();
    let mut buf = [0u8; 256];

    loop {
        let n = match io.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        for &byte in &buf[..n] {
            let payload = match rx.push(byte) {
                None => continue,
                Some(Err(e)) => {
                    debug!(?e, "dropped frame");
                    continue;
                }
                Some(Ok(payload)) => payload,
            };

            let reply = match Command::parse(payload) {
                Ok(cmd) => {
                    let mut machine = machine.lock();
                    dispatch(&mut machine, cmd, now_ms())
                }
                Err(e) => {
                    debug!(?e, "unparseable command");
                    ack(ACK_ERROR)
                }
            };

            let mut frame = [0u8; MAX_FRAME_LEN];
            match encode_frame(&reply, &mut frame) {
                Ok(len) => io.write_all(&frame[..len])?,
                Err(e) => warn!(?e, "reply did not fit a frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use fluidics::{Device, ValveConfig};
    use std::io::{self, Cursor};

    #[derive(Default)]
    struct NullMotor;

    impl StepperBackend for NullMotor {
        type Error = Infallible;

        fn enable(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn disable(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_forward(&mut self, _forward: bool) -> Result<(), Infallible> {
            Ok(())
        }

        fn write_step(&mut self, _level: bool) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullSwitch;

    impl HomeSwitch for NullSwitch {
        type Error = Infallible;

        fn is_asserted(&mut self) -> Result<bool, Infallible> {
            Ok(false)
        }
    }

    type TestMachine = Machine<NullMotor, NullMotor, NullSwitch, NullMotor, NullSwitch>;

    /// A scripted transport: reads from the input, collects writes.
    struct Pipe {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn machine() -> Arc<Mutex<TestMachine>> {
        Arc::new(Mutex::new(Machine::new(Device::new(
            NullMotor,
            NullMotor,
            NullSwitch,
            ValveConfig::default(),
            NullMotor,
            NullSwitch,
            ValveConfig::default(),
        ))))
    }

    fn run(input: Vec<u8>) -> Vec<u8> {
        let machine = machine();
        let mut pipe = Pipe {
            input: Cursor::new(input),
            output: Vec::new(),
        };
        run_session(&mut pipe, &machine, &|| 0).unwrap();
        pipe.output
    }

    #[test]
    fn ping_echoes_the_exact_ack_frame() {
        let ping = vec![0x21, 0x37, 0x05, 0x00, 0xD2, 0x02, 0xEF, 0x8D];
        let output = run(ping.clone());
        // The ack payload is a single zero byte, so the reply frame equals
        // the request frame.
        assert_eq!(output, ping);
    }

    #[test]
    fn corrupt_frame_gets_no_reply_and_next_ping_works() {
        let ping = vec![0x21, 0x37, 0x05, 0x00, 0xD2, 0x02, 0xEF, 0x8D];
        let mut corrupt = ping.clone();
        *corrupt.last_mut().unwrap() ^= 0xFF;

        let mut input = corrupt;
        input.extend_from_slice(&ping);
        let output = run(input);
        assert_eq!(output, ping);
    }

    #[test]
    fn unknown_command_acks_code_one() {
        let mut frame = [0u8; MAX_FRAME_LEN];
        let len = encode_frame(&[0xEE], &mut frame).unwrap();
        let output = run(frame[..len].to_vec());

        let mut expected = [0u8; MAX_FRAME_LEN];
        let n = encode_frame(&[0x01], &mut expected).unwrap();
        assert_eq!(output, expected[..n].to_vec());
    }
}
