//! Shared in-memory fakes for controller unit tests.

use crate::hal::{HomeSwitch, StepperBackend};
use core::convert::Infallible;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Observable state of a fake motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct MotorState {
    pub enabled: bool,
    pub forward: bool,
    pub level: bool,
    pub rising_edges: u32,
    pub position: i64,
}

/// A fake stepper backend; clones share the same state so tests can
/// inspect a motor the controller owns.
#[derive(Clone, Default)]
pub struct StubMotor(Rc<RefCell<MotorState>>);

impl StubMotor {
    pub fn state(&self) -> MotorState {
        *self.0.borrow()
    }
}

impl StepperBackend for StubMotor {
    type Error = Infallible;

    fn enable(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().enabled = false;
        Ok(())
    }

    fn set_forward(&mut self, forward: bool) -> Result<(), Infallible> {
        self.0.borrow_mut().forward = forward;
        Ok(())
    }

    fn write_step(&mut self, level: bool) -> Result<(), Infallible> {
        let mut m = self.0.borrow_mut();
        if level && !m.level {
            m.rising_edges += 1;
            m.position += if m.forward { 1 } else { -1 };
        }
        m.level = level;
        Ok(())
    }
}

/// A fake limit switch; tests flip the shared flag to simulate the valve
/// reaching home.
#[derive(Clone, Default)]
pub struct StubSwitch(Rc<Cell<bool>>);

impl StubSwitch {
    pub fn set_asserted(&self, asserted: bool) {
        self.0.set(asserted);
    }
}

impl HomeSwitch for StubSwitch {
    type Error = Infallible;

    fn is_asserted(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.get())
    }
}
