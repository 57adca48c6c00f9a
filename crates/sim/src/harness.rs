//! Virtual-Time Simulation Harness
//!
//! Runs the full device application against a microsecond event clock.
//! Four deadlines are maintained, one per timer in the real task layout:
//! the 10 ms control tick and the three self-re-arming step timers.
//! `advance_*` fires them in time order, so the interleaving matches the
//! device and scenarios are reproducible down to the step edge.
//!
//! Commands can be injected either pre-decoded ([`SimDevice::send`]) or as
//! raw frame bytes through the receiver state machine
//! ([`SimDevice::send_frame`]), which exercises the whole link path and
//! returns the encoded reply frames.

use crate::fake_hw::{ok, SimHomeSwitch, SimMotor};
use chroma_firmware::dispatch::{ack, dispatch, Reply, ACK_ERROR};
use chroma_firmware::machine::Machine;
use chroma_proto::commands::Command;
use chroma_proto::frame::{encode_frame, FrameReceiver, MAX_FRAME_LEN};
use fluidics::{Device, DeviceState, ValveConfig, CONTROL_TICK_MS};
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;

/// The machine type the simulator drives.
pub type SimMachine = Machine<SimMotor, SimMotor, SimHomeSwitch, SimMotor, SimHomeSwitch>;

const TICK_US: u64 = CONTROL_TICK_MS as u64 * 1000;

/// Where each valve's switch sits relative to the motor's boot angle, in
/// full steps. Non-zero so homing actually travels.
const SWITCH_ANGLE: u16 = 600;
const SWITCH_WINDOW: u16 = 8;

#[derive(Serialize, Debug, Clone)]
pub enum TraceDirection {
    HostToDevice,
    DeviceToHost,
}

#[derive(Serialize, Debug, Clone)]
pub struct TraceEntry {
    pub timestamp: SystemTime,
    pub at_us: u64,
    pub direction: TraceDirection,
    pub bytes: Vec<u8>,
}

/// Builds a simulated machine plus handles on its three motors.
pub fn sim_machine() -> (SimMachine, SimMotor, SimMotor, SimMotor) {
    let config = ValveConfig::default();
    let pump_motor = SimMotor::default();
    let reagent_motor = SimMotor::default();
    let column_motor = SimMotor::default();

    let device = Device::new(
        pump_motor.clone(),
        reagent_motor.clone(),
        SimHomeSwitch::new(
            &reagent_motor,
            config.steps_per_revolution,
            SWITCH_ANGLE,
            SWITCH_WINDOW,
        ),
        config,
        column_motor.clone(),
        SimHomeSwitch::new(
            &column_motor,
            config.steps_per_revolution,
            SWITCH_ANGLE,
            SWITCH_WINDOW,
        ),
        config,
    );
    (
        Machine::new(device),
        pump_motor,
        reagent_motor,
        column_motor,
    )
}

/// The simulated controller under a virtual clock.
pub struct SimDevice {
    machine: Box<SimMachine>,
    pub pump_motor: SimMotor,
    pub reagent_motor: SimMotor,
    pub column_motor: SimMotor,
    clock_us: u64,
    tick_at: u64,
    pump_at: u64,
    reagent_at: u64,
    column_at: u64,
    link_rx: FrameReceiver,
    trace: Vec<TraceEntry>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    pub fn new() -> Self {
        let (mut machine, pump_motor, reagent_motor, column_motor) = sim_machine();
        ok(machine.device.initialize());
        Self {
            machine: Box::new(machine),
            pump_motor,
            reagent_motor,
            column_motor,
            clock_us: 0,
            tick_at: 0,
            pump_at: 0,
            reagent_at: 0,
            column_at: 0,
            link_rx: FrameReceiver::new(),
            trace: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        (self.clock_us / 1000) as u32
    }

    /// The snapshot published on the last control tick.
    pub fn state(&self) -> DeviceState {
        self.machine.state()
    }

    /// Direct access for scenario setup and assertions.
    pub fn machine(&mut self) -> &mut SimMachine {
        &mut self.machine
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance_us(ms * 1000);
    }

    /// Advances the virtual clock, firing every due timer in time order.
    pub fn advance_us(&mut self, us: u64) {
        let target = self.clock_us + us;
        loop {
            let next = self
                .tick_at
                .min(self.pump_at)
                .min(self.reagent_at)
                .min(self.column_at);
            if next > target {
                break;
            }
            self.clock_us = next;

            if self.tick_at == next {
                let now_ms = self.now_ms();
                ok(self.machine.control_tick(now_ms));
                self.tick_at += TICK_US;
            }
            if self.pump_at == next {
                let delay = ok(self.machine.pump_timer());
                self.pump_at += u64::from(delay);
            }
            if self.reagent_at == next {
                let delay = ok(self.machine.reagent_timer());
                self.reagent_at += u64::from(delay);
            }
            if self.column_at == next {
                let delay = ok(self.machine.column_timer());
                self.column_at += u64::from(delay);
            }
        }
        self.clock_us = target;
    }

    /// Dispatches a decoded command at the current virtual time.
    pub fn send(&mut self, cmd: Command<'_>) -> Reply {
        let now_ms = self.now_ms();
        dispatch(&mut self.machine, cmd, now_ms)
    }

    /// Feeds raw bytes through the link receiver and returns every encoded
    /// reply frame produced.
    pub fn send_frame(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let now_ms = self.now_ms();
        let at_us = self.clock_us;
        self.trace.push(TraceEntry {
            timestamp: SystemTime::now(),
            at_us,
            direction: TraceDirection::HostToDevice,
            bytes: bytes.to_vec(),
        });

        let mut replies = Vec::new();
        for &byte in bytes {
            let payload = match self.link_rx.push(byte) {
                None | Some(Err(_)) => continue,
                Some(Ok(payload)) => payload,
            };
            let reply = match Command::parse(payload) {
                Ok(cmd) => dispatch(&mut self.machine, cmd, now_ms),
                Err(_) => ack(ACK_ERROR),
            };
            let mut frame = [0u8; MAX_FRAME_LEN];
            if let Ok(len) = encode_frame(&reply, &mut frame) {
                replies.push(frame[..len].to_vec());
            }
        }

        for reply in &replies {
            self.trace.push(TraceEntry {
                timestamp: SystemTime::now(),
                at_us,
                direction: TraceDirection::DeviceToHost,
                bytes: reply.clone(),
            });
        }
        replies
    }

    /// Dumps the recorded link trace as JSON for offline analysis.
    pub fn dump_trace(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.trace)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
