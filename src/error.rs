use std::io;

use crate::memory::TypeAddr;

/// Everything that can go wrong while loading or running a program.
#[derive(Debug, thiserror::Error)]
pub enum EmuError {
    #[error("unknown opcode: {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },

    #[error("bad address: {address:#05X}")]
    AddressOutOfRange { address: TypeAddr },

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack is empty")]
    StackUnderflow,

    #[error("program is too big ({size} bytes), max size is {max_size} bytes")]
    ProgramTooLarge { size: usize, max_size: usize },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl EmuError {
    /// Errors raised while executing a single instruction; the run loop skips
    /// past these instead of stopping.
    pub fn is_instruction_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownOpcode { .. }
                | Self::AddressOutOfRange { .. }
                | Self::StackOverflow
                | Self::StackUnderflow
        )
    }
}
