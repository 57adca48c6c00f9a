//! The task layout of the controller, rendered with OS threads.
//!
//! - a control thread on a fixed 10 ms cadence;
//! - one timer thread per stepper, re-arming itself with the delay each
//!   step call returns;
//! - a housekeeping thread persisting dirty program/name tables while no
//!   program runs;
//! - a comm loop serving one client session at a time (serial semantics).
//!
//! All of them share the machine behind a mutex with short critical
//! sections; the snapshot published each tick is what readers consume.

use crate::machine::Machine;
use crate::persist;
use crate::session;
use fluidics::hal::{HomeSwitch, StepperBackend};
use fluidics::CONTROL_TICK_MS;
use parking_lot::Mutex;
use std::io;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Milliseconds since boot, shared by the control loop and the sessions.
#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    start: Instant,
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BootClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}

/// Where the controller persists its state.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub program: PathBuf,
    pub reagents: PathBuf,
    pub columns: PathBuf,
}

impl StoragePaths {
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            program: dir.join("program.bin"),
            reagents: dir.join("reagents.bin"),
            columns: dir.join("columns.bin"),
        }
    }
}

/// Loads persisted program and names into the machine at boot.
pub fn restore<E, PB, RB, RS, CB, CS>(machine: &mut Machine<PB, RB, RS, CB, CS>, paths: &StoragePaths)
where
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    machine.program = persist::load_program(&paths.program);
    machine.reagent_names = persist::load_names(&paths.reagents, machine.reagent_names.clone());
    machine.column_names = persist::load_names(&paths.columns, machine.column_names.clone());
}

/// Spawns the 10 ms control loop.
pub fn spawn_control_loop<E, PB, RB, RS, CB, CS>(
    machine: Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
    clock: BootClock,
) -> thread::JoinHandle<()>
where
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E> + Send + 'static,
    RB: StepperBackend<Error = E> + Send + 'static,
    RS: HomeSwitch<Error = E> + Send + 'static,
    CB: StepperBackend<Error = E> + Send + 'static,
    CS: HomeSwitch<Error = E> + Send + 'static,
{
    thread::spawn(move || {
        let tick = Duration::from_millis(u64::from(CONTROL_TICK_MS));
        let mut next = Instant::now();
        loop {
            if let Err(e) = machine.lock().control_tick(clock.now_ms()) {
                // The control path clamps everything it can; a pin failure
                // here means the output stage is already safe (disabled).
                error!(?e, "control tick failed");
            }
            next += tick;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Missed the cadence; realign rather than burst.
                next = now;
            }
        }
    })
}

/// Spawns the three step-timer threads. Each one re-arms itself with the
/// microsecond delay its controller returns, the thread rendition of a
/// one-shot hardware timer.
pub fn spawn_step_timers<E, PB, RB, RS, CB, CS>(
    machine: &Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
) -> Vec<thread::JoinHandle<()>>
where
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E> + Send + 'static,
    RB: StepperBackend<Error = E> + Send + 'static,
    RS: HomeSwitch<Error = E> + Send + 'static,
    CB: StepperBackend<Error = E> + Send + 'static,
    CS: HomeSwitch<Error = E> + Send + 'static,
{
    // Three identical loops over different callbacks.
    fn timer_loop<E, PB, RB, RS, CB, CS>(
        machine: Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
        name: &'static str,
        step: fn(&mut Machine<PB, RB, RS, CB, CS>) -> Result<u32, E>,
    ) where
        E: core::fmt::Debug,
        PB: StepperBackend<Error = E>,
        RB: StepperBackend<Error = E>,
        RS: HomeSwitch<Error = E>,
        CB: StepperBackend<Error = E>,
        CS: HomeSwitch<Error = E>,
    {
        loop {
            let delay_us = match step(&mut machine.lock()) {
                Ok(us) => us,
                Err(e) => {
                    error!(timer = name, ?e, "step timer failed");
                    100_000
                }
            };
            thread::sleep(Duration::from_micros(u64::from(delay_us)));
        }
    }

    vec![
        thread::spawn({
            let machine = Arc::clone(machine);
            move || timer_loop(machine, "pump", Machine::pump_timer)
        }),
        thread::spawn({
            let machine = Arc::clone(machine);
            move || timer_loop(machine, "reagent-valve", Machine::reagent_timer)
        }),
        thread::spawn({
            let machine = Arc::clone(machine);
            move || timer_loop(machine, "column-valve", Machine::column_timer)
        }),
    ]
}

/// Spawns the persistence sweep: roughly once a second, flushes dirty
/// state to disk while no program is executing.
pub fn spawn_persistence<E, PB, RB, RS, CB, CS>(
    machine: Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
    paths: StoragePaths,
) -> thread::JoinHandle<()>
where
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E> + Send + 'static,
    RB: StepperBackend<Error = E> + Send + 'static,
    RS: HomeSwitch<Error = E> + Send + 'static,
    CB: StepperBackend<Error = E> + Send + 'static,
    CS: HomeSwitch<Error = E> + Send + 'static,
{
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(1));

        let mut snapshot = None;
        {
            let mut m = machine.lock();
            if !m.executor.is_running() && m.take_program_dirty() {
                snapshot = Some((
                    m.program.to_persist_bytes(),
                    m.take_names_dirty().then(|| {
                        (m.reagent_names.to_wire(), m.column_names.to_wire())
                    }),
                ));
            } else if m.take_names_dirty() {
                snapshot = Some((
                    Vec::new(),
                    Some((m.reagent_names.to_wire(), m.column_names.to_wire())),
                ));
            }
        }

        let Some((program_bytes, names)) = snapshot else {
            continue;
        };
        if !program_bytes.is_empty() {
            if let Err(e) = std::fs::write(&paths.program, &program_bytes) {
                warn!(%e, "could not persist program");
            }
        }
        if let Some((reagents, columns)) = names {
            if let Err(e) = std::fs::write(&paths.reagents, reagents) {
                warn!(%e, "could not persist reagent names");
            }
            if let Err(e) = std::fs::write(&paths.columns, columns) {
                warn!(%e, "could not persist column names");
            }
        }
    })
}

/// Serves command-link sessions on a Unix socket, one client at a time.
/// This is the emulator transport; on the device the same session loop
/// runs over the UART.
pub fn serve_unix<E, PB, RB, RS, CB, CS>(
    socket_path: &std::path::Path,
    machine: Arc<Mutex<Machine<PB, RB, RS, CB, CS>>>,
    clock: BootClock,
) -> io::Result<()>
where
    E: core::fmt::Debug,
    PB: StepperBackend<Error = E>,
    RB: StepperBackend<Error = E>,
    RS: HomeSwitch<Error = E>,
    CB: StepperBackend<Error = E>,
    CS: HomeSwitch<Error = E>,
{
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "command link listening");

    loop {
        let (stream, _) = listener.accept()?;
        stream.set_read_timeout(Some(session::READ_TIMEOUT))?;
        info!("client connected");
        match session::run_session(stream, &machine, &|| clock.now_ms()) {
            Ok(()) => info!("client disconnected"),
            Err(e) => warn!(%e, "session ended with transport error"),
        }
    }
}
