use thiserror::Error;

/// Fault reported to the embedding CPU when an instruction cannot complete.
///
/// A `MathFault` is only delivered for unmasked exceptions on models that
/// support it and with CR0.NE set; the instruction's architectural commits
/// are suppressed in that case, but the status-word updates that led to the
/// fault remain visible.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// #MF x87 floating-point error.
    #[error("#MF x87 floating-point error")]
    MathFault,

    /// #UD: the modrm byte selects no instruction in this escape group.
    #[error("invalid x87 opcode {escape:#04x} /{modrm:#04x}")]
    InvalidOpcode { escape: u8, modrm: u8 },

    /// Memory access failed; raised by the bus before any commit.
    #[error("memory access fault at {addr:#010x}")]
    Memory { addr: u32 },
}
