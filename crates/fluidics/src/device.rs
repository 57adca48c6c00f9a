//! # Device Coordination FSM
//!
//! Owns the pump and both valve controllers and sequences fluid-path
//! changes: the pump is ramped to zero before either valve moves, and the
//! latched pump setpoint is re-applied once both valves are settled.
//!
//! While any valve is homing or moving the FSM is in `Stopping` or
//! `SettingValves`, both of which command zero flow, so no pump step is
//! ever emitted with the fluid path open.

use crate::hal::{HomeSwitch, StepperBackend};
use crate::pump::{PumpCommand, PumpController};
use crate::valve::{ValveConfig, ValveController, PORT_COUNT};

/// Deceleration used while stopping for a valve change, in mL/min/s.
const STOPPING_DECEL_ML_MIN_S: f32 = 10.0;

/// The coordination state reported in the device snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceMode {
    /// Before the first control tick has run.
    Initializing,
    /// Normal operation; the latched pump setpoint is applied every tick.
    Pumping,
    /// Ramping the pump to zero ahead of a valve change.
    Stopping,
    /// Waiting for both valves to settle on their targets.
    SettingValves,
}

impl DeviceMode {
    pub fn wire(self) -> u8 {
        match self {
            DeviceMode::Initializing => 0,
            DeviceMode::Pumping => 1,
            DeviceMode::Stopping => 2,
            DeviceMode::SettingValves => 3,
        }
    }

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            1 => DeviceMode::Pumping,
            2 => DeviceMode::Stopping,
            3 => DeviceMode::SettingValves,
            _ => DeviceMode::Initializing,
        }
    }
}

/// The device aggregate: pump, reagent valve, column valve, and the FSM
/// that coordinates them.
pub struct Device<PB, RB, RS, CB, CS>
where
    PB: StepperBackend,
    RB: StepperBackend<Error = PB::Error>,
    RS: HomeSwitch<Error = PB::Error>,
    CB: StepperBackend<Error = PB::Error>,
    CS: HomeSwitch<Error = PB::Error>,
{
    pub pump: PumpController<PB>,
    pub reagent_valve: ValveController<RB, RS>,
    pub column_valve: ValveController<CB, CS>,
    mode: DeviceMode,
    pending_pump: PumpCommand,
    requested_reagent: u8,
    requested_column: u8,
}

impl<E, PB, RB, RS, CB, CS> Device<PB, RB, RS, CB, CS>
where
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    pub fn new(
        pump_backend: PB,
        reagent_backend: RB,
        reagent_switch: RS,
        reagent_config: ValveConfig,
        column_backend: CB,
        column_switch: CS,
        column_config: ValveConfig,
    ) -> Self {
        Self {
            pump: PumpController::new(pump_backend),
            reagent_valve: ValveController::new(reagent_backend, reagent_switch, reagent_config),
            column_valve: ValveController::new(column_backend, column_switch, column_config),
            mode: DeviceMode::Initializing,
            pending_pump: PumpCommand::default(),
            requested_reagent: 0,
            requested_column: 0,
        }
    }

    /// Puts both valve output stages in a known state. Called once at boot.
    pub fn initialize(&mut self) -> Result<(), E> {
        self.reagent_valve.initialize()?;
        self.column_valve.initialize()
    }

    /// Latches the requested ports and forces the stop/move/resume cycle.
    pub fn set_valves(&mut self, reagent_port: u8, column_port: u8) {
        self.requested_reagent = reagent_port.min(PORT_COUNT - 1);
        self.requested_column = column_port.min(PORT_COUNT - 1);
        self.mode = DeviceMode::Stopping;
    }

    /// Updates the pending pump setpoint; it is applied only while the FSM
    /// is in `Pumping`.
    pub fn set_pump(&mut self, cmd: PumpCommand) {
        self.pending_pump = cmd;
    }

    /// Runs one FSM step. Called on the control tick, after
    /// `pump.tick_speed()`.
    pub fn tick(&mut self) -> Result<(), E> {
        match self.mode {
            DeviceMode::Initializing => {
                self.mode = DeviceMode::Pumping;
            }
            DeviceMode::Pumping => {
                self.pump.set_setpoint(self.pending_pump);
            }
            DeviceMode::Stopping => {
                self.pump
                    .set_setpoint(PumpCommand::stop(STOPPING_DECEL_ML_MIN_S));
                if self.pump.is_stopped() {
                    self.reagent_valve.request_position(self.requested_reagent)?;
                    self.column_valve.request_position(self.requested_column)?;
                    self.mode = DeviceMode::SettingValves;
                }
            }
            DeviceMode::SettingValves => {
                if self.reagent_valve.reached_target() && self.column_valve.reached_target() {
                    self.mode = DeviceMode::Pumping;
                }
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// The setpoint that will be applied when the FSM is next in `Pumping`.
    pub fn pending_pump(&self) -> PumpCommand {
        self.pending_pump
    }
}
