mod accessors;
mod breakpoint;
mod config;
mod counter;
mod error;
mod sourcemap;
mod state;
pub mod text;
mod traps;

pub use accessors::{display_url, encode_uri, MAX_LOCALS};
pub use breakpoint::{
    Breakpoint, BreakpointId, DebuggerId, DefaultFreeOp, FreeOp, HandlerId, InstanceId,
    WasmBreakpointSite,
};
pub use config::Config;
pub use counter::{TrapCounter, Transition};
pub use error::{Error, Result};
pub use sourcemap::{ExprLoc, GeneratedSourceMap};
pub use state::DebugState;
pub use text::{BinaryToText, WatPrinter};
pub use traps::{nearest_far_jump, toggle_debug_trap};
