//! Operator-visible reagent and column names.
//!
//! Six fixed 40-byte ASCII slots per table, NUL-padded, transferred and
//! persisted in raw form.

/// Bytes per name slot.
pub const NAME_LEN: usize = 40;
/// Slots per table, one per valve port.
pub const NAME_COUNT: usize = 6;
/// Serialized size of a table.
pub const NAME_TABLE_WIRE_LEN: usize = NAME_LEN * NAME_COUNT;

/// A table of six port names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable {
    entries: [[u8; NAME_LEN]; NAME_COUNT],
}

impl NameTable {
    /// Builds `<prefix>_1` … `<prefix>_6`. Long prefixes are truncated to
    /// fit the slot.
    pub fn with_prefix(prefix: &str) -> Self {
        let mut entries = [[0u8; NAME_LEN]; NAME_COUNT];
        for (i, slot) in entries.iter_mut().enumerate() {
            let name = format!("{}_{}", prefix, i + 1);
            let bytes = name.as_bytes();
            let n = bytes.len().min(NAME_LEN);
            slot[..n].copy_from_slice(&bytes[..n]);
        }
        Self { entries }
    }

    pub fn reagents() -> Self {
        Self::with_prefix("Reagent")
    }

    pub fn columns() -> Self {
        Self::with_prefix("Column")
    }

    pub fn to_wire(&self) -> [u8; NAME_TABLE_WIRE_LEN] {
        let mut out = [0u8; NAME_TABLE_WIRE_LEN];
        for (i, slot) in self.entries.iter().enumerate() {
            out[i * NAME_LEN..(i + 1) * NAME_LEN].copy_from_slice(slot);
        }
        out
    }

    /// Parses a raw table; anything but exactly 240 bytes is rejected.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        if data.len() != NAME_TABLE_WIRE_LEN {
            return None;
        }
        let mut entries = [[0u8; NAME_LEN]; NAME_COUNT];
        for (i, slot) in entries.iter_mut().enumerate() {
            slot.copy_from_slice(&data[i * NAME_LEN..(i + 1) * NAME_LEN]);
        }
        Some(Self { entries })
    }

    /// The name in slot `idx`, trimmed of NUL padding. Non-UTF-8 content
    /// reads as empty.
    pub fn name(&self, idx: usize) -> &str {
        let slot = &self.entries[idx];
        let end = slot.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        core::str::from_utf8(&slot[..end]).unwrap_or("")
    }
}
