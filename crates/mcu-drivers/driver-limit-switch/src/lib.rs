//! A `no_std` driver for a homing limit switch.
//!
//! Radial valves home against a single mechanical switch. The switch may be
//! wired active-high or active-low depending on the board revision, so the
//! polarity is part of the driver configuration rather than the caller's
//! problem.

#![no_std]

use embedded_hal::digital::InputPin;

/// The electrical level at which the switch reads as pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveLevel {
    High,
    Low,
}

/// A limit switch on a single digital input pin.
pub struct LimitSwitch<PIN> {
    pin: PIN,
    active: ActiveLevel,
}

impl<PIN, E> LimitSwitch<PIN>
where
    PIN: InputPin<Error = E>,
{
    /// Creates a new limit switch from an input pin and its active level.
    pub fn new(pin: PIN, active: ActiveLevel) -> Self {
        Self { pin, active }
    }

    /// Returns `true` if the switch is currently pressed.
    pub fn is_asserted(&mut self) -> Result<bool, E> {
        let high = self.pin.is_high()?;
        Ok(match self.active {
            ActiveLevel::High => high,
            ActiveLevel::Low => !high,
        })
    }
}
