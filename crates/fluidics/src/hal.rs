//! Hardware seams for the control core.
//!
//! The controllers drive motors through two narrow traits so the same code
//! runs against real GPIO-backed drivers, mock pins, and the simulator.
//! Blanket implementations wire up the `mcu-drivers` crates.

use driver_drv8825::{Direction, Drv8825};
use driver_limit_switch::LimitSwitch;
use embedded_hal::digital::{InputPin, OutputPin};

/// Output side of one stepper axis: enable, direction, and the STEP pin at
/// edge level.
pub trait StepperBackend {
    type Error;

    /// Powers the output stage.
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Cuts the output stage; the motor freewheels.
    fn disable(&mut self) -> Result<(), Self::Error>;

    /// Latches the direction for subsequent step edges.
    fn set_forward(&mut self, forward: bool) -> Result<(), Self::Error>;

    /// Writes one STEP edge; the motor advances on the rising edge.
    fn write_step(&mut self, level: bool) -> Result<(), Self::Error>;
}

/// The homing switch of a radial valve.
pub trait HomeSwitch {
    type Error;

    /// Returns `true` while the valve presses its limit switch.
    fn is_asserted(&mut self) -> Result<bool, Self::Error>;
}

impl<STEP, DIR, EN, E> StepperBackend for Drv8825<STEP, DIR, EN>
where
    STEP: OutputPin<Error = E>,
    DIR: OutputPin<Error = E>,
    EN: OutputPin<Error = E>,
{
    type Error = E;

    fn enable(&mut self) -> Result<(), E> {
        Drv8825::enable(self)
    }

    fn disable(&mut self) -> Result<(), E> {
        Drv8825::disable(self)
    }

    fn set_forward(&mut self, forward: bool) -> Result<(), E> {
        self.set_direction(if forward {
            Direction::Forward
        } else {
            Direction::Backward
        })
    }

    fn write_step(&mut self, level: bool) -> Result<(), E> {
        Drv8825::write_step(self, level)
    }
}

impl<PIN, E> HomeSwitch for LimitSwitch<PIN>
where
    PIN: InputPin<Error = E>,
{
    type Error = E;

    fn is_asserted(&mut self) -> Result<bool, E> {
        LimitSwitch::is_asserted(self)
    }
}
