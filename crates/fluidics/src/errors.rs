//! Error types for the fluidic control core.

/// Represents errors that can occur while mutating or loading a program.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProgramError {
    /// A block of step bytes was empty or not a whole number of steps.
    BlockNotAligned,
    /// The append or load would exceed the program capacity.
    CapacityExceeded,
}

/// Represents errors decoding a device snapshot from its wire form.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SnapshotError {
    /// Fewer bytes than a full snapshot.
    Truncated,
}
