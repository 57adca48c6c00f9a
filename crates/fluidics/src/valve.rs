//! # Radial Valve Control
//!
//! A six-port selector valve on a stepper with a single homing switch. The
//! controller homes against the switch, then positions the valve by index:
//! `target_raw = mapping[port] · steps_per_port`, where the mapping lets
//! physical port wiring differ from logical numbering.
//!
//! Travel is monotone in the configured direction; the raw step counter
//! wraps at one revolution. The step period follows a geometric decay so
//! motion starts slow and asymptotes to the minimum period.

use crate::hal::{HomeSwitch, StepperBackend};

/// Number of ports on a valve.
pub const PORT_COUNT: u8 = 6;

/// Reported for a valve position that is not at a known port.
pub const PORT_UNKNOWN: u8 = 0xFF;

/// Fastest step period the valve motor tolerates.
pub const MIN_STEP_PERIOD_US: u32 = 500;

/// Step period at the start of every move, and the idle tick period.
pub const MAX_STEP_PERIOD_US: u32 = 30_000;

// Geometric ramp divisor: period -= period / RAMP_SMOOTHNESS per step.
const RAMP_SMOOTHNESS: u32 = 100;

/// Compile-time description of one valve's mechanics.
#[derive(Debug, Clone, Copy)]
pub struct ValveConfig {
    /// Logical port number to physical port index.
    pub position_mapping: [u8; PORT_COUNT as usize],
    /// Raw position corresponding to the limit switch, i.e. where the
    /// counter is latched when homing completes.
    pub home_offset: u16,
    pub steps_per_revolution: u16,
    pub invert_direction: bool,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            position_mapping: [0, 1, 2, 3, 4, 5],
            home_offset: 0,
            steps_per_revolution: 1200,
            invert_direction: false,
        }
    }
}

impl ValveConfig {
    pub fn steps_per_port(&self) -> u16 {
        self.steps_per_revolution / PORT_COUNT as u16
    }

    fn port_to_raw(&self, port: u8) -> u16 {
        u16::from(self.position_mapping[port as usize]) * self.steps_per_port()
    }

    fn raw_to_port(&self, raw: u16) -> Option<u8> {
        let spp = self.steps_per_port();
        if spp == 0 || raw % spp != 0 {
            return None;
        }
        let physical = (raw / spp) as u8;
        self.position_mapping
            .iter()
            .position(|&m| m == physical)
            .map(|i| i as u8)
    }
}

/// Valve controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum ValveState {
    /// Initial state: idle, driver disabled, position unknown.
    Reset,
    /// Driving toward the limit switch.
    Homing,
    /// At target, driver disabled.
    Stopped,
    /// Driving toward the target, driver enabled.
    Moving,
}

impl ValveState {
    pub fn wire(self) -> u8 {
        match self {
            ValveState::Reset => 0,
            ValveState::Homing => 1,
            ValveState::Stopped => 2,
            ValveState::Moving => 3,
        }
    }

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            1 => ValveState::Homing,
            2 => ValveState::Stopped,
            3 => ValveState::Moving,
            _ => ValveState::Reset,
        }
    }
}

/// The radial valve controller.
pub struct ValveController<B, S>
where
    B: StepperBackend,
    S: HomeSwitch<Error = B::Error>,
{
    backend: B,
    switch: S,
    config: ValveConfig,
    state: ValveState,
    homed: bool,
    raw_position: u16,
    target_raw: u16,
    step_period_us: u32,
    step_level: bool,
}

impl<B, S> ValveController<B, S>
where
    B: StepperBackend,
    S: HomeSwitch<Error = B::Error>,
{
    pub fn new(backend: B, switch: S, config: ValveConfig) -> Self {
        Self {
            backend,
            switch,
            config,
            state: ValveState::Reset,
            homed: false,
            raw_position: 0,
            target_raw: 0,
            step_period_us: MAX_STEP_PERIOD_US,
            step_level: false,
        }
    }

    /// Puts the output stage in a known (disabled) state. The controller
    /// stays in `Reset` until homed or positioned.
    pub fn initialize(&mut self) -> Result<(), B::Error> {
        self.backend.disable()?;
        self.state = ValveState::Reset;
        Ok(())
    }

    /// Starts driving toward the limit switch.
    pub fn home(&mut self) -> Result<(), B::Error> {
        self.backend.set_forward(self.forward())?;
        self.backend.enable()?;
        self.step_period_us = MAX_STEP_PERIOD_US;
        self.state = ValveState::Homing;
        Ok(())
    }

    /// Stores a new target port. If the valve was never homed it homes
    /// first and then travels on; otherwise the ramp is reset and the next
    /// update tick begins the move.
    pub fn request_position(&mut self, port: u8) -> Result<(), B::Error> {
        let port = port.min(PORT_COUNT - 1);
        self.target_raw = self.config.port_to_raw(port);
        if !self.homed {
            return self.home();
        }
        self.step_period_us = MAX_STEP_PERIOD_US;
        Ok(())
    }

    /// Runs one step of the state machine and returns the delay until the
    /// next tick, in microseconds. Called from a one-shot timer.
    pub fn tick(&mut self) -> Result<u32, B::Error> {
        match self.state {
            ValveState::Reset => Ok(MAX_STEP_PERIOD_US),
            ValveState::Homing => {
                if self.switch.is_asserted()? {
                    self.park()?;
                    self.raw_position = self.config.home_offset;
                    self.homed = true;
                    Ok(MAX_STEP_PERIOD_US)
                } else {
                    self.advance_ramp();
                    self.emit_edge()?;
                    Ok(self.step_period_us)
                }
            }
            ValveState::Stopped => {
                if self.raw_position != self.target_raw {
                    self.backend.set_forward(self.forward())?;
                    self.backend.enable()?;
                    self.step_period_us = MAX_STEP_PERIOD_US;
                    self.state = ValveState::Moving;
                }
                Ok(MAX_STEP_PERIOD_US)
            }
            ValveState::Moving => {
                if self.raw_position == self.target_raw {
                    self.park()?;
                    Ok(MAX_STEP_PERIOD_US)
                } else {
                    self.advance_ramp();
                    self.emit_edge()?;
                    Ok(self.step_period_us)
                }
            }
        }
    }

    /// True while the valve needs no motion: stopped at its target, or
    /// idle in `Reset` with nothing requested.
    pub fn reached_target(&self) -> bool {
        match self.state {
            ValveState::Reset => true,
            ValveState::Stopped => self.raw_position == self.target_raw,
            _ => false,
        }
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn raw_position(&self) -> u16 {
        self.raw_position
    }

    /// The logical port the valve rests at, if it is settled on one.
    pub fn current_port(&self) -> Option<u8> {
        if self.homed && self.state == ValveState::Stopped {
            self.config.raw_to_port(self.raw_position)
        } else {
            None
        }
    }

    fn forward(&self) -> bool {
        !self.config.invert_direction
    }

    /// Disables the driver with the STEP pin low and settles in `Stopped`.
    fn park(&mut self) -> Result<(), B::Error> {
        self.backend.disable()?;
        if self.step_level {
            self.step_level = false;
            self.backend.write_step(false)?;
        }
        self.state = ValveState::Stopped;
        Ok(())
    }

    fn advance_ramp(&mut self) {
        let p = self.step_period_us;
        self.step_period_us = (p - p / RAMP_SMOOTHNESS).max(MIN_STEP_PERIOD_US);
    }

    fn emit_edge(&mut self) -> Result<(), B::Error> {
        self.step_level = !self.step_level;
        self.backend.write_step(self.step_level)?;
        if self.step_level {
            self.raw_position = if self.raw_position + 1 >= self.config.steps_per_revolution {
                0
            } else {
                self.raw_position + 1
            };
        }
        Ok(())
    }
}
