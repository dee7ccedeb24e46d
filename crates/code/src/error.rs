use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("range {begin:#x}..{end:#x} is outside of the {len:#x} byte code segment")]
    OutOfBounds { begin: usize, end: usize, len: usize },
    #[error("code segment exceeds 4GiB")]
    SegmentTooLarge,
    #[error("function {0} is still open")]
    FunctionStillOpen(u32),
    #[error("no function is open")]
    NoOpenFunction,
    #[error("debug traps were emitted but no far-jump thunk exists")]
    MissingFarJumpThunk,
    #[error("out of memory")]
    OutOfMemory(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, Error>;
