//! # Program Executor
//!
//! Drives the device FSM through an ordered list of program steps. Each
//! step terminates on elapsed time or delivered volume, whichever comes
//! first; the dominant criterion drives the 0…255 progress byte. Runs on
//! the control tick with an explicit millisecond clock so execution is
//! fully deterministic under test.

use crate::device::Device;
use crate::hal::{HomeSwitch, StepperBackend};
use crate::program::{Program, ProgramStep, PORT_KEEP_CURRENT};
use crate::pump::{PumpCommand, DEFAULT_ACCEL_ML_MIN_S};

/// The program executor.
#[derive(Debug)]
pub struct ProgramExecutor {
    running: bool,
    step_idx: u16,
    current: ProgramStep,
    step_end_time_ms: u32,
    step_end_volume_ul: f32,
    progress: u8,
}

impl Default for ProgramExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramExecutor {
    pub fn new() -> Self {
        Self {
            running: false,
            step_idx: 0,
            current: ProgramStep::default(),
            step_end_time_ms: u32::MAX,
            step_end_volume_ul: f32::INFINITY,
            progress: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn step_idx(&self) -> u16 {
        self.step_idx
    }

    /// Fractional completion of the current step, 0…255.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Starts execution from step 0. An empty program finishes at once.
    pub fn execute<E, PB, RB, RS, CB, CS>(
        &mut self,
        now_ms: u32,
        program: &Program,
        device: &mut Device<PB, RB, RS, CB, CS>,
    ) where
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        self.running = true;
        self.step_idx = 0;
        self.progress = 0;
        match program.get(0) {
            Some(step) => {
                self.current = step;
                self.enter_step(now_ms, device);
            }
            None => self.finish(device),
        }
    }

    /// Stops execution; the pump ramps down at the default acceleration
    /// while the valves stay where they are.
    pub fn abort<E, PB, RB, RS, CB, CS>(&mut self, device: &mut Device<PB, RB, RS, CB, CS>)
    where
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        self.running = false;
        device.set_pump(PumpCommand::stop(DEFAULT_ACCEL_ML_MIN_S));
    }

    /// One control tick: updates progress, advances past finished steps,
    /// and shuts the pump down after the last one.
    pub fn tick<E, PB, RB, RS, CB, CS>(
        &mut self,
        now_ms: u32,
        program: &Program,
        device: &mut Device<PB, RB, RS, CB, CS>,
    ) where
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        if !self.running {
            return;
        }

        let (done, progress) = self.check_termination(now_ms, device.pump.volume_ul());
        self.progress = progress;
        if !done {
            return;
        }

        self.step_idx += 1;
        match program.get(self.step_idx as usize) {
            Some(step) => {
                self.current = step;
                self.enter_step(now_ms, device);
            }
            None => self.finish(device),
        }
    }

    fn finish<E, PB, RB, RS, CB, CS>(&mut self, device: &mut Device<PB, RB, RS, CB, CS>)
    where
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        self.running = false;
        device.set_pump(PumpCommand::stop(DEFAULT_ACCEL_ML_MIN_S));
    }

    fn enter_step<E, PB, RB, RS, CB, CS>(
        &mut self,
        now_ms: u32,
        device: &mut Device<PB, RB, RS, CB, CS>,
    ) where
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        let s = self.current;
        device.pump.reset_volume();

        // A keep-current marker on either port leaves both valves alone,
        // so a wait step never induces a stop/move cycle.
        if s.reagent_port != PORT_KEEP_CURRENT && s.column_port != PORT_KEEP_CURRENT {
            device.set_valves(s.reagent_port, s.column_port);
        }
        device.set_pump(PumpCommand::new(s.flow_ml_min, DEFAULT_ACCEL_ML_MIN_S));

        self.step_end_time_ms = if s.duration_s.is_finite() {
            now_ms.saturating_add((s.duration_s * 1000.0) as u32)
        } else {
            u32::MAX
        };
        self.step_end_volume_ul = s.volume_ml * 1000.0;
        self.progress = 0;
    }

    fn check_termination(&self, now_ms: u32, volume_ul: f32) -> (bool, u8) {
        // Strictly "past the deadline": a tick landing exactly on the
        // boundary terminates on the next one.
        if self.step_end_time_ms < now_ms {
            return (true, 255);
        }
        if volume_ul >= self.step_end_volume_ul {
            return (true, 255);
        }

        let time_progress = if self.step_end_time_ms == u32::MAX {
            0.0
        } else {
            let duration_ms = self.current.duration_s * 1000.0;
            let remaining = (self.step_end_time_ms - now_ms) as f32;
            255.0 * (1.0 - remaining / duration_ms)
        };
        let volume_progress = if self.step_end_volume_ul.is_finite() && self.step_end_volume_ul > 0.0
        {
            255.0 * volume_ul / self.step_end_volume_ul
        } else {
            0.0
        };
        let progress = time_progress.max(volume_progress).clamp(0.0, 255.0) as u8;
        (false, progress)
    }
}
