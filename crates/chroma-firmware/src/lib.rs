//! # Controller Application
//!
//! Everything device-side above the control core: the [`machine::Machine`]
//! aggregate that the control tick and the step timers drive, the command
//! [`dispatch`]er behind the serial link, reagent/column [`names`],
//! [`persist`]ence of programs and name tables, and a threaded [`runtime`]
//! that reproduces the original task layout (control task, comm task, one
//! timer per stepper) on a host OS.
//!
//! The crate is hardware-agnostic: backends come in through the control
//! core's seams, so the same machine runs against GPIO drivers, mocks, or
//! the simulator.

pub mod dispatch;
pub mod machine;
pub mod names;
pub mod persist;
pub mod runtime;
pub mod session;
