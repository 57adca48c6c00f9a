//! Persistence of the program and name tables.
//!
//! Load failures are never fatal: a missing or corrupt file logs a warning
//! and the caller continues with an empty program or default names.

use crate::names::NameTable;
use fluidics::Program;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Loads the persisted program, or an empty one.
pub fn load_program(path: &Path) -> Program {
    match std::fs::read(path) {
        Ok(bytes) => match Program::from_persist_bytes(&bytes) {
            Ok(program) => {
                info!(path = %path.display(), steps = program.len(), "loaded program");
                program
            }
            Err(e) => {
                warn!(path = %path.display(), ?e, "stored program invalid, starting empty");
                Program::new()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Program::new(),
        Err(e) => {
            warn!(path = %path.display(), %e, "could not read program, starting empty");
            Program::new()
        }
    }
}

pub fn save_program(path: &Path, program: &Program) -> io::Result<()> {
    std::fs::write(path, program.to_persist_bytes())
}

/// Loads a persisted name table, or the given defaults.
pub fn load_names(path: &Path, defaults: NameTable) -> NameTable {
    match std::fs::read(path) {
        Ok(bytes) => match NameTable::from_wire(&bytes) {
            Some(table) => table,
            None => {
                warn!(path = %path.display(), "stored name table invalid, using defaults");
                defaults
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => defaults,
        Err(e) => {
            warn!(path = %path.display(), %e, "could not read names, using defaults");
            defaults
        }
    }
}

pub fn save_names(path: &Path, names: &NameTable) -> io::Result<()> {
    std::fs::write(path, names.to_wire())
}
