//! Benchmarks for the control-tick and step hot paths.

use core::convert::Infallible;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fluidics::hal::{HomeSwitch, StepperBackend};
use fluidics::{PumpCommand, PumpController, ValveConfig, ValveController};

#[derive(Default)]
struct NullMotor;

impl StepperBackend for NullMotor {
    type Error = Infallible;

    fn enable(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_forward(&mut self, _forward: bool) -> Result<(), Infallible> {
        Ok(())
    }

    fn write_step(&mut self, _level: bool) -> Result<(), Infallible> {
        Ok(())
    }
}

#[derive(Default)]
struct NullSwitch;

impl HomeSwitch for NullSwitch {
    type Error = Infallible;

    fn is_asserted(&mut self) -> Result<bool, Infallible> {
        Ok(false)
    }
}

fn bench_pump(c: &mut Criterion) {
    let mut pump = PumpController::new(NullMotor);
    pump.set_setpoint(PumpCommand::new(3.0, 5.0));

    c.bench_function("pump_tick_speed", |b| {
        b.iter(|| {
            pump.tick_speed();
            black_box(pump.half_period_us())
        })
    });

    c.bench_function("pump_step", |b| {
        b.iter(|| black_box(pump.step().unwrap()))
    });
}

fn bench_valve(c: &mut Criterion) {
    let mut valve = ValveController::new(NullMotor, NullSwitch, ValveConfig::default());
    valve.home().unwrap();

    c.bench_function("valve_tick", |b| {
        b.iter(|| black_box(valve.tick().unwrap()))
    });
}

criterion_group!(benches, bench_pump, bench_valve);
criterion_main!(benches);
