//! # Fluidic Control Core
//!
//! A deterministic control library for the chromatography controller,
//! usable on both host and MCU (`no_std`-friendly).
//!
//! Provides the real-time control primitives:
//! - Pump controller (trapezoidal speed profile, step timing, volume
//!   accounting)
//! - Radial valve controller (homing and indexed positioning)
//! - Device FSM coordinating pump-stop / valve-move / pump-resume
//! - Program storage and the step executor
//! - The published device snapshot
//!
//! Two clocks drive the core: a 10 ms control tick where acceleration and
//! program progress happen, and per-edge microsecond timers where step
//! pulses fire. The slow side publishes step periods the fast side
//! consumes; every public entry point is a plain function call so the whole
//! core can run under a simulated clock.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod device;
pub mod errors;
pub mod executor;
pub mod hal;
pub mod program;
pub mod pump;
pub mod state;
pub mod valve;

#[cfg(test)]
mod testutil;

// Re-export core types for easier access
pub use device::{Device, DeviceMode};
pub use errors::{ProgramError, SnapshotError};
pub use executor::ProgramExecutor;
pub use program::{Program, ProgramStep, MAX_PROGRAM_STEPS, PORT_KEEP_CURRENT};
pub use pump::{PumpCommand, PumpController, DEFAULT_ACCEL_ML_MIN_S, MAX_FLOW_ML_MIN};
pub use state::DeviceState;
pub use valve::{ValveConfig, ValveController, ValveState, PORT_UNKNOWN};

/// Period of the control task tick in milliseconds.
pub const CONTROL_TICK_MS: u32 = 10;

/// `f32::abs` without the standard library.
#[inline]
pub(crate) fn fabs(v: f32) -> f32 {
    num_traits::float::FloatCore::abs(v)
}
