//! Simulated Motor and Switch Hardware
//!
//! A `SimMotor` records pin-level activity (enable, direction, step edges)
//! and integrates rising edges into a signed position. A `SimHomeSwitch`
//! derives its assertion from the motor angle, so homing behaves like the
//! real mechanics: the valve finds the switch wherever the motor happens
//! to start.

use core::convert::Infallible;
use fluidics::hal::{HomeSwitch, StepperBackend};
use parking_lot::Mutex;
use std::sync::Arc;

/// Unwraps a `Result` whose error type has no inhabitants.
pub fn ok<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => match e {},
    }
}

/// Observable state of a simulated motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct MotorState {
    pub enabled: bool,
    pub forward: bool,
    pub level: bool,
    pub rising_edges: u64,
    /// Net full steps, signed by direction.
    pub position: i64,
}

/// A simulated stepper; clones share state so the harness can observe a
/// motor the controller owns.
#[derive(Clone, Default)]
pub struct SimMotor {
    state: Arc<Mutex<MotorState>>,
}

impl SimMotor {
    pub fn state(&self) -> MotorState {
        *self.state.lock()
    }
}

impl StepperBackend for SimMotor {
    type Error = Infallible;

    fn enable(&mut self) -> Result<(), Infallible> {
        self.state.lock().enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Infallible> {
        self.state.lock().enabled = false;
        Ok(())
    }

    fn set_forward(&mut self, forward: bool) -> Result<(), Infallible> {
        self.state.lock().forward = forward;
        Ok(())
    }

    fn write_step(&mut self, level: bool) -> Result<(), Infallible> {
        let mut m = self.state.lock();
        if level && !m.level {
            m.rising_edges += 1;
            m.position += if m.forward { 1 } else { -1 };
        }
        m.level = level;
        Ok(())
    }
}

/// A home switch asserted while the motor angle sits inside a small
/// window.
#[derive(Clone)]
pub struct SimHomeSwitch {
    motor: SimMotor,
    steps_per_revolution: i64,
    switch_angle: i64,
    window: i64,
}

impl SimHomeSwitch {
    pub fn new(motor: &SimMotor, steps_per_revolution: u16, switch_angle: u16, window: u16) -> Self {
        Self {
            motor: motor.clone(),
            steps_per_revolution: i64::from(steps_per_revolution),
            switch_angle: i64::from(switch_angle),
            window: i64::from(window),
        }
    }
}

impl HomeSwitch for SimHomeSwitch {
    type Error = Infallible;

    fn is_asserted(&mut self) -> Result<bool, Infallible> {
        let angle = self
            .motor
            .state()
            .position
            .rem_euclid(self.steps_per_revolution);
        let offset = (angle - self.switch_angle).rem_euclid(self.steps_per_revolution);
        Ok(offset < self.window)
    }
}
