//! A `no_std` driver for the DRV8825 stepper motor driver.
//!
//! This driver controls the DRV8825 using GPIO pins for step, direction and
//! enable. Unlike pulse-oriented drivers it exposes the STEP pin at edge
//! level: the caller writes each half of the step pulse itself, which lets a
//! one-shot timer hold the pin between edges and derive motion timing from
//! the interval between calls.

#![no_std]

use embedded_hal::digital::{OutputPin, PinState};

/// Represents the motor direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A DRV8825 driver instance.
///
/// The microstep mode pins are assumed to be strapped in hardware.
pub struct Drv8825<STEP, DIR, EN> {
    step: STEP,
    dir: DIR,
    enable: EN,
    enabled: bool,
}

impl<STEP, DIR, EN, E> Drv8825<STEP, DIR, EN>
where
    STEP: OutputPin<Error = E>,
    DIR: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
{
    /// Creates a new DRV8825 driver from its control pins.
    ///
    /// The driver starts disabled; call [`Drv8825::enable`] before stepping.
    pub fn new(step: STEP, dir: DIR, enable: EN) -> Self {
        Self {
            step,
            dir,
            enable,
            enabled: false,
        }
    }

    /// Enables the driver (by pulling the nENABLE pin low).
    pub fn enable(&mut self) -> Result<(), E> {
        self.enabled = true;
        self.enable.set_low()
    }

    /// Disables the driver (by pulling the nENABLE pin high).
    pub fn disable(&mut self) -> Result<(), E> {
        self.enabled = false;
        self.enable.set_high()
    }

    /// Returns whether the output stage is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the motor direction.
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), E> {
        let state = match direction {
            Direction::Forward => PinState::High, // Or Low, depending on wiring
            Direction::Backward => PinState::Low,
        };
        self.dir.set_state(state)
    }

    /// Writes one STEP edge. The DRV8825 advances the motor on the rising
    /// edge; the falling edge only completes the pulse.
    pub fn write_step(&mut self, level: bool) -> Result<(), E> {
        self.step.set_state(PinState::from(level))
    }
}
