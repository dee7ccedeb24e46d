//! Compiled code container for debuggable WebAssembly modules.
//!
//! A [`Code`] pairs a machine code segment with the [`Metadata`] describing
//! its function ranges, call sites and far-jump thunks. Debug trap slots in
//! the segment can only be rewritten through a [`WritableCode`] scope, which
//! flushes the instruction cache when it is dropped.

mod arch;
mod builder;
mod code;
mod error;
pub mod layout;
mod metadata;
mod segment;

pub use self::arch::Architecture;
pub use self::builder::CodeBuilder;
pub use self::code::{Code, SharedCode};
pub use self::error::{Error, Result};
pub use self::metadata::{
    val_type_name, CallSite, CallSiteKind, CodeRange, CodeRangeKind, ExprType, Metadata,
    ModuleHash, ModuleKind, MODULE_HASH_LENGTH,
};
pub use self::segment::{CodeSegment, FlushStats, Protection, WritableCode};
pub use wasmparser::ValType;
