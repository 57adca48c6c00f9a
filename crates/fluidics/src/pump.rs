//! # Peristaltic Pump Control
//!
//! Translates a commanded volumetric flow rate into step pulses. Two
//! cadences cooperate: `tick_speed` runs on the 10 ms control tick and
//! advances the speed along a trapezoidal profile, publishing a new step
//! half-period; `step` runs from a one-shot timer at microsecond scale,
//! emits one STEP edge, and reschedules itself with the published period.
//!
//! The acceleration ramp is therefore piecewise-constant in step rate: the
//! control loop only recomputes timing when the speed changes, and the hot
//! path writes one pin and returns the next delay.

use crate::fabs;
use crate::hal::StepperBackend;

/// Maximum commanded flow magnitude in mL/min.
pub const MAX_FLOW_ML_MIN: f32 = 10.0;

/// Acceleration applied by the executor, abort, and finish paths, in
/// mL/min per second.
pub const DEFAULT_ACCEL_ML_MIN_S: f32 = 5.0;

/// Calibrated volume delivered by one full motor step, in microlitres.
pub const VOLUME_PER_STEP_UL: f32 = 0.075_219_2;

/// Shortest half-period the driver tolerates.
pub const MIN_HALF_PERIOD_US: u32 = 500;

/// Half-period returned while no motion is commanded; the timer keeps
/// ticking at this rate so a new setpoint takes effect promptly.
pub const MAX_HALF_PERIOD_US: u32 = 100_000;

/// Below this magnitude the pump counts as stopped.
pub const SPEED_EPSILON: f32 = 1e-6;

const TICK_DT_S: f32 = crate::CONTROL_TICK_MS as f32 / 1000.0;

// Converts mL/min to µs per half step:
// (60e6 µs/min · volume_per_step) / (2 · 1000 µL/mL) = 30000 · volume_per_step.
const HALF_PERIOD_K_US: f32 = 30_000.0 * VOLUME_PER_STEP_UL;

/// A pump setpoint: signed flow rate (sign = direction) and acceleration.
///
/// Construction clamps the flow to ±[`MAX_FLOW_ML_MIN`]; NaN flow is
/// rejected to zero and a non-positive or non-finite acceleration falls
/// back to [`DEFAULT_ACCEL_ML_MIN_S`], so no unusable value ever reaches
/// step timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpCommand {
    flow_ml_min: f32,
    accel_ml_min_s: f32,
}

impl PumpCommand {
    pub fn new(flow_ml_min: f32, accel_ml_min_s: f32) -> Self {
        let flow = if flow_ml_min.is_nan() {
            0.0
        } else {
            flow_ml_min.clamp(-MAX_FLOW_ML_MIN, MAX_FLOW_ML_MIN)
        };
        let accel = if accel_ml_min_s.is_finite() && accel_ml_min_s > 0.0 {
            accel_ml_min_s
        } else {
            DEFAULT_ACCEL_ML_MIN_S
        };
        Self {
            flow_ml_min: flow,
            accel_ml_min_s: accel,
        }
    }

    /// A ramp-to-zero command with the given deceleration.
    pub fn stop(accel_ml_min_s: f32) -> Self {
        Self::new(0.0, accel_ml_min_s)
    }

    pub fn flow_ml_min(&self) -> f32 {
        self.flow_ml_min
    }

    pub fn accel_ml_min_s(&self) -> f32 {
        self.accel_ml_min_s
    }
}

impl Default for PumpCommand {
    fn default() -> Self {
        Self::new(0.0, DEFAULT_ACCEL_ML_MIN_S)
    }
}

/// The pump controller.
pub struct PumpController<B: StepperBackend> {
    backend: B,
    target_speed: f32,
    accel: f32,
    current_speed: f32,
    half_period_us: u32,
    step_level: bool,
    enabled: bool,
    volume_ul: f32,
}

impl<B: StepperBackend> PumpController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            target_speed: 0.0,
            accel: DEFAULT_ACCEL_ML_MIN_S,
            current_speed: 0.0,
            half_period_us: MAX_HALF_PERIOD_US,
            step_level: false,
            enabled: false,
            volume_ul: 0.0,
        }
    }

    /// Latches a new setpoint. Pure; never blocks and never touches pins.
    pub fn set_setpoint(&mut self, cmd: PumpCommand) {
        self.target_speed = cmd.flow_ml_min;
        self.accel = cmd.accel_ml_min_s;
    }

    /// Advances `current_speed` toward the target by at most
    /// `acceleration · dt`, snapping when within one increment, and
    /// recomputes the published half-period. Called on the control tick.
    pub fn tick_speed(&mut self) {
        let dv = self.accel * TICK_DT_S;
        let err = self.target_speed - self.current_speed;
        if fabs(err) <= dv {
            self.current_speed = self.target_speed;
        } else if err > 0.0 {
            self.current_speed += dv;
        } else {
            self.current_speed -= dv;
        }
        self.half_period_us = half_period_for(self.current_speed);
    }

    /// Emits one half-step edge and returns the delay until the next one.
    ///
    /// Called from the step timer. In the dead zone the driver output is
    /// disabled and the max period is returned so the timer keeps running
    /// without motion. The direction pin is latched from the sign of the
    /// current speed before every edge.
    pub fn step(&mut self) -> Result<u32, B::Error> {
        if fabs(self.current_speed) < SPEED_EPSILON {
            if self.enabled {
                self.backend.disable()?;
                self.enabled = false;
            }
            if self.step_level {
                self.step_level = false;
                self.backend.write_step(false)?;
            }
            return Ok(MAX_HALF_PERIOD_US);
        }

        self.backend.set_forward(self.current_speed > 0.0)?;
        if !self.enabled {
            self.backend.enable()?;
            self.enabled = true;
        }

        self.step_level = !self.step_level;
        self.backend.write_step(self.step_level)?;
        if self.step_level {
            // One full step per rising edge.
            self.volume_ul += VOLUME_PER_STEP_UL;
        }
        Ok(self.half_period_us)
    }

    /// Volume delivered since the last [`PumpController::reset_volume`],
    /// in microlitres.
    pub fn volume_ul(&self) -> f32 {
        self.volume_ul
    }

    pub fn reset_volume(&mut self) {
        self.volume_ul = 0.0;
    }

    pub fn current_speed(&self) -> f32 {
        self.current_speed
    }

    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn is_stopped(&self) -> bool {
        fabs(self.current_speed) < SPEED_EPSILON
    }

    /// The half-period the step timer is currently being asked to use.
    pub fn half_period_us(&self) -> u32 {
        self.half_period_us
    }
}

fn half_period_for(speed: f32) -> u32 {
    let mag = fabs(speed);
    if mag < SPEED_EPSILON {
        return MAX_HALF_PERIOD_US;
    }
    let period = HALF_PERIOD_K_US / mag;
    if period <= MIN_HALF_PERIOD_US as f32 {
        MIN_HALF_PERIOD_US
    } else if period >= MAX_HALF_PERIOD_US as f32 {
        MAX_HALF_PERIOD_US
    } else {
        period as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubMotor;

    fn controller() -> (PumpController<StubMotor>, StubMotor) {
        let motor = StubMotor::default();
        (PumpController::new(motor.clone()), motor)
    }

    #[test]
    fn setpoints_are_clamped() {
        assert_eq!(PumpCommand::new(12.0, 1.0).flow_ml_min(), 10.0);
        assert_eq!(PumpCommand::new(-12.0, 1.0).flow_ml_min(), -10.0);
        assert_eq!(PumpCommand::new(f32::INFINITY, 1.0).flow_ml_min(), 10.0);
        assert_eq!(PumpCommand::new(f32::NEG_INFINITY, 1.0).flow_ml_min(), -10.0);
        assert_eq!(PumpCommand::new(f32::NAN, 1.0).flow_ml_min(), 0.0);
    }

    #[test]
    fn bad_accelerations_fall_back_to_default() {
        assert_eq!(
            PumpCommand::new(1.0, 0.0).accel_ml_min_s(),
            DEFAULT_ACCEL_ML_MIN_S
        );
        assert_eq!(
            PumpCommand::new(1.0, -3.0).accel_ml_min_s(),
            DEFAULT_ACCEL_ML_MIN_S
        );
        assert_eq!(
            PumpCommand::new(1.0, f32::NAN).accel_ml_min_s(),
            DEFAULT_ACCEL_ML_MIN_S
        );
        assert_eq!(
            PumpCommand::new(1.0, f32::INFINITY).accel_ml_min_s(),
            DEFAULT_ACCEL_ML_MIN_S
        );
    }

    #[test]
    fn speed_ramps_at_the_commanded_acceleration() {
        let (mut pump, _) = controller();
        pump.set_setpoint(PumpCommand::new(5.0, 1.0));

        let mut prev = 0.0f32;
        for _ in 0..100 {
            pump.tick_speed();
            let delta = pump.current_speed() - prev;
            assert!(delta <= 1.0 * 0.01 + 1e-5, "over-accelerated: {}", delta);
            prev = pump.current_speed();
        }
        // After 1 s at 1 mL/min/s the pump runs at ~1 mL/min.
        assert!((pump.current_speed() - 1.0).abs() < 1e-3);

        for _ in 0..450 {
            pump.tick_speed();
        }
        // Snapped to target well past the nominal 5 s ramp.
        assert_eq!(pump.current_speed(), 5.0);
    }

    #[test]
    fn half_period_follows_speed_with_clamps() {
        let (mut pump, _) = controller();

        // 3 mL/min -> 30000 * 0.0752192 / 3 = 752.192 µs.
        pump.set_setpoint(PumpCommand::new(3.0, 1000.0));
        pump.tick_speed();
        assert_eq!(pump.half_period_us(), 752);

        // 10 mL/min would need ~226 µs; the floor clamps it.
        pump.set_setpoint(PumpCommand::new(10.0, 1000.0));
        pump.tick_speed();
        assert_eq!(pump.half_period_us(), MIN_HALF_PERIOD_US);

        // Crawl speeds clamp to the ceiling.
        pump.set_setpoint(PumpCommand::new(0.01, 1000.0));
        pump.tick_speed();
        assert_eq!(pump.half_period_us(), MAX_HALF_PERIOD_US);
    }

    #[test]
    fn dead_zone_disables_driver_and_keeps_timer_alive() {
        let (mut pump, motor) = controller();
        assert!(pump.is_stopped());
        assert_eq!(pump.step().unwrap(), MAX_HALF_PERIOD_US);
        assert!(!motor.state().enabled);
        assert_eq!(motor.state().rising_edges, 0);
    }

    #[test]
    fn volume_accumulates_per_full_step() {
        let (mut pump, motor) = controller();
        pump.set_setpoint(PumpCommand::new(3.0, 1000.0));
        pump.tick_speed();

        for _ in 0..10 {
            pump.step().unwrap();
        }
        assert_eq!(motor.state().rising_edges, 5);
        assert!((pump.volume_ul() - 5.0 * VOLUME_PER_STEP_UL).abs() < 1e-6);

        pump.reset_volume();
        assert_eq!(pump.volume_ul(), 0.0);
    }

    #[test]
    fn direction_latches_from_speed_sign() {
        let (mut pump, motor) = controller();

        pump.set_setpoint(PumpCommand::new(3.0, 1000.0));
        pump.tick_speed();
        pump.step().unwrap();
        assert!(motor.state().forward);
        assert!(motor.state().enabled);

        pump.set_setpoint(PumpCommand::new(-3.0, 1000.0));
        // Two ticks: 10 mL/min/s of headroom per tick at accel 1000.
        pump.tick_speed();
        pump.step().unwrap();
        assert!(!motor.state().forward);
    }

    #[test]
    fn stopping_releases_the_driver() {
        let (mut pump, motor) = controller();
        pump.set_setpoint(PumpCommand::new(2.0, 1000.0));
        pump.tick_speed();
        pump.step().unwrap();
        assert!(motor.state().enabled);

        pump.set_setpoint(PumpCommand::stop(1000.0));
        pump.tick_speed();
        assert!(pump.is_stopped());
        assert_eq!(pump.step().unwrap(), MAX_HALF_PERIOD_US);
        assert!(!motor.state().enabled);
        assert!(!motor.state().level);
    }
}
