//! Runs the simulated controller in real time and serves the command link
//! on a Unix socket, so the operator host can be pointed at
//! `unix:/tmp/chroma-sim.sock` without any hardware attached.

use anyhow::Result;
use chroma_firmware::runtime::{
    restore, serve_unix, spawn_control_loop, spawn_persistence, spawn_step_timers, BootClock,
    StoragePaths,
};
use parking_lot::Mutex;
use sim::harness::sim_machine;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let data_dir = std::env::temp_dir().join("chroma-sim");
    std::fs::create_dir_all(&data_dir)?;
    let paths = StoragePaths::in_dir(&data_dir);

    let (mut machine, _pump, _reagent, _column) = sim_machine();
    machine.device.initialize()?;
    restore(&mut machine, &paths);

    let machine = Arc::new(Mutex::new(machine));
    let clock = BootClock::new();

    spawn_control_loop(Arc::clone(&machine), clock);
    spawn_step_timers(&machine);
    spawn_persistence(Arc::clone(&machine), paths);
    info!(data_dir = %data_dir.display(), "simulated controller running");

    serve_unix(Path::new("/tmp/chroma-sim.sock"), machine, clock)?;
    Ok(())
}
