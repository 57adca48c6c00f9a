//! # Controller Simulation
//!
//! Simulated motors and home switches plus a virtual-time harness that
//! drives the full device application: control ticks and the three step
//! timers fire in deadline order against a microsecond clock, so
//! multi-minute fluidic scenarios run in milliseconds of wall time and are
//! bit-for-bit reproducible.
//!
//! The same fake hardware also backs the interactive emulator (see the
//! `run_sim` example), which serves the command link on a Unix socket for
//! the operator host to talk to.

pub mod fake_hw;
pub mod harness;

pub use fake_hw::{MotorState, SimHomeSwitch, SimMotor};
pub use harness::SimDevice;
