use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory(#[from] TryReserveError),
    #[error("failed to disassemble module: {0}")]
    Disassemble(anyhow::Error),
    #[error("failed to decode local entries: {0}")]
    Decode(#[from] wasmparser::BinaryReaderError),
    #[error("function declares {0} locals, more than the supported maximum")]
    TooManyLocals(u64),
    #[error("no breakpoint trap at bytecode offset {0:#x}")]
    NoBreakpointTrap(u32),
    #[error(transparent)]
    Code(#[from] wasmdebug_code::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
