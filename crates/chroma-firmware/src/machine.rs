//! The device aggregate driven by the control tick and the step timers.

use crate::names::NameTable;
use fluidics::hal::{HomeSwitch, StepperBackend};
use fluidics::valve::PORT_UNKNOWN;
use fluidics::{Device, DeviceState, Program, ProgramExecutor};

/// Controllers, program storage, executor, name tables, and the published
/// snapshot, owned as one unit so a single lock covers every mutation.
pub struct Machine<PB, RB, RS, CB, CS>
where
    PB: StepperBackend,
    RB: StepperBackend<Error = PB::Error>,
    RS: HomeSwitch<Error = PB::Error>,
    CB: StepperBackend<Error = PB::Error>,
    CS: HomeSwitch<Error = PB::Error>,
{
    pub device: Device<PB, RB, RS, CB, CS>,
    pub program: Program,
    pub executor: ProgramExecutor,
    pub reagent_names: NameTable,
    pub column_names: NameTable,
    state: DeviceState,
    program_dirty: bool,
    names_dirty: bool,
}

impl<E, PB, RB, RS, CB, CS> Machine<PB, RB, RS, CB, CS>
where
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    pub fn new(device: Device<PB, RB, RS, CB, CS>) -> Self {
        Self {
            device,
            program: Program::new(),
            executor: ProgramExecutor::new(),
            reagent_names: NameTable::reagents(),
            column_names: NameTable::columns(),
            state: DeviceState::default(),
            program_dirty: false,
            names_dirty: false,
        }
    }

    /// One 10 ms control tick: speed ramp, FSM, executor, then snapshot
    /// publication.
    pub fn control_tick(&mut self, now_ms: u32) -> Result<(), E> {
        self.device.pump.tick_speed();
        self.device.tick()?;
        self.executor.tick(now_ms, &self.program, &mut self.device);
        self.publish();
        Ok(())
    }

    /// Pump step-timer callback; returns the next delay in µs.
    pub fn pump_timer(&mut self) -> Result<u32, E> {
        self.device.pump.step()
    }

    /// Reagent-valve step-timer callback; returns the next delay in µs.
    pub fn reagent_timer(&mut self) -> Result<u32, E> {
        self.device.reagent_valve.tick()
    }

    /// Column-valve step-timer callback; returns the next delay in µs.
    pub fn column_timer(&mut self) -> Result<u32, E> {
        self.device.column_valve.tick()
    }

    /// The snapshot published on the last control tick.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn mark_program_dirty(&mut self) {
        self.program_dirty = true;
    }

    pub fn mark_names_dirty(&mut self) {
        self.names_dirty = true;
    }

    /// Clears and returns the program-dirty flag; used by the persistence
    /// sweep.
    pub fn take_program_dirty(&mut self) -> bool {
        core::mem::take(&mut self.program_dirty)
    }

    pub fn take_names_dirty(&mut self) -> bool {
        core::mem::take(&mut self.names_dirty)
    }

    fn publish(&mut self) {
        self.state = DeviceState {
            speed_ml_min: self.device.pump.current_speed(),
            volume_ul: self.device.pump.volume_ul(),
            step_idx: self.executor.step_idx(),
            running: self.executor.is_running(),
            progress: self.executor.progress(),
            reagent_port: self
                .device
                .reagent_valve
                .current_port()
                .unwrap_or(PORT_UNKNOWN),
            column_port: self
                .device
                .column_valve
                .current_port()
                .unwrap_or(PORT_UNKNOWN),
            reagent_valve: self.device.reagent_valve.state(),
            column_valve: self.device.column_valve.state(),
            mode: self.device.mode(),
        };
    }
}
