use crate::breakpoint::WasmBreakpointSite;
use crate::config::Config;
use crate::counter::TrapCounter;
use crate::error::{Error, Result};
use crate::sourcemap::GeneratedSourceMap;
use crate::text::{BinaryToText, WatPrinter, ENABLED_MESSAGE, TOO_BIG_MESSAGE};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use wasmdebug_code::{Metadata, SharedCode};

/// Debugger-facing state of one compiled wasm module.
///
/// All operations assume a single writer: the owner serializes debugger
/// requests against execution of the module. The type holds `Rc`s and is
/// neither `Send` nor `Sync`.
pub struct DebugState {
    pub(crate) code: SharedCode,
    pub(crate) metadata: Rc<Metadata>,
    pub(crate) maybe_bytecode: Option<Rc<[u8]>>,
    pub(crate) maybe_source_map: Option<GeneratedSourceMap>,
    pub(crate) step_mode_counters: HashMap<u32, TrapCounter>,
    pub(crate) breakpoint_sites: HashMap<u32, WasmBreakpointSite>,
    pub(crate) enter_and_leave_frame_traps: TrapCounter,
    pub(crate) next_breakpoint_id: u32,
    config: Config,
    printer: Box<dyn BinaryToText>,
}

impl DebugState {
    /// Panics if the code was compiled with debugging enabled but no
    /// bytecode is supplied.
    pub fn new(code: SharedCode, maybe_bytecode: Option<Rc<[u8]>>) -> Self {
        Self::with_config(code, maybe_bytecode, Config::default())
    }

    pub fn with_config(code: SharedCode, maybe_bytecode: Option<Rc<[u8]>>, config: Config) -> Self {
        let metadata = Rc::clone(code.metadata());
        assert!(
            !metadata.debug_enabled || maybe_bytecode.is_some(),
            "debug-enabled code requires the module bytecode"
        );
        Self {
            code,
            metadata,
            maybe_bytecode,
            maybe_source_map: None,
            step_mode_counters: HashMap::new(),
            breakpoint_sites: HashMap::new(),
            enter_and_leave_frame_traps: TrapCounter::new(),
            next_breakpoint_id: 0,
            config,
            printer: Box::new(WatPrinter::new()),
        }
    }

    /// Replaces the disassembler used by [`DebugState::create_text`].
    pub fn with_disassembler(mut self, printer: Box<dyn BinaryToText>) -> Self {
        self.printer = printer;
        self
    }

    pub fn code(&self) -> &SharedCode {
        &self.code
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn debug_enabled(&self) -> bool {
        self.metadata.debug_enabled
    }

    pub fn maybe_bytecode(&self) -> Option<&[u8]> {
        self.maybe_bytecode.as_deref()
    }

    pub fn source_map(&self) -> Option<&GeneratedSourceMap> {
        self.maybe_source_map.as_ref()
    }

    /// Text of the module. Disassembling caches the source map as a side
    /// effect; without bytecode, or with too much of it, a placeholder is
    /// returned and no source map is built.
    pub fn create_text(&mut self) -> Result<String> {
        let bytes = match &self.maybe_bytecode {
            None => {
                debug_assert!(self.maybe_source_map.is_none());
                return Ok(ENABLED_MESSAGE.to_string());
            }
            Some(bytes) if bytes.len() > self.config.text_size_limit => {
                debug_assert!(self.maybe_source_map.is_none());
                return Ok(TOO_BIG_MESSAGE.to_string());
            }
            Some(bytes) => Rc::clone(bytes),
        };

        let mut text = String::new();
        let mut map = GeneratedSourceMap::new();
        self.printer
            .binary_to_text(&bytes, &mut text, &mut map)
            .map_err(Error::Disassemble)?;
        debug_assert!(
            map.is_sorted_by_line(),
            "expression locations must be sorted by line"
        );
        debug!(
            "disassembled {} bytes into {} lines with {} expressions",
            bytes.len(),
            map.total_lines(),
            map.exprlocs().len()
        );
        self.maybe_source_map = Some(map);
        Ok(text)
    }

    pub fn ensure_source_map(&mut self) -> Result<()> {
        if self.maybe_source_map.is_some() || self.maybe_bytecode.is_none() {
            return Ok(());
        }
        self.create_text().map(|_| ())
    }

    /// Bytecode offsets of every expression printed on `lineno`.
    pub fn get_line_offsets(&mut self, lineno: u32) -> Result<Vec<u32>> {
        if !self.metadata.debug_enabled {
            return Ok(Vec::new());
        }
        self.ensure_source_map()?;
        match &self.maybe_source_map {
            Some(map) => map.line_offsets(lineno),
            None => Ok(Vec::new()),
        }
    }

    /// Line and column of the expression closest to `offset`.
    pub fn get_offset_location(&mut self, offset: u32) -> Result<Option<(u32, u32)>> {
        if !self.metadata.debug_enabled {
            return Ok(None);
        }
        self.ensure_source_map()?;
        let map = match &mut self.maybe_source_map {
            Some(map) if !map.exprlocs().is_empty() => map,
            _ => return Ok(None),
        };
        let found = map.search_line_by_offset(offset)?;
        let loc = map.exprlocs()[found];
        Ok(Some((loc.lineno, loc.column)))
    }

    pub fn total_source_lines(&mut self) -> Result<u32> {
        if !self.metadata.debug_enabled {
            return Ok(0);
        }
        self.ensure_source_map()?;
        Ok(self
            .maybe_source_map
            .as_ref()
            .map_or(0, GeneratedSourceMap::total_lines))
    }
}
