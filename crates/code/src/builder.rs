use crate::arch::Architecture;
use crate::code::{Code, SharedCode};
use crate::error::{Error, Result};
use crate::metadata::{
    CallSite, CallSiteKind, CodeRange, CodeRangeKind, ExprType, Metadata, ModuleHash, ModuleKind,
};
use crate::segment::CodeSegment;
use std::convert::TryFrom;
use wasmparser::ValType;

struct OpenFunction {
    func_index: u32,
    func_line_or_bytecode: u32,
    begin: u32,
}

/// Lays out a code segment made of functions with debug trap slots,
/// import stubs and far-jump thunks.
pub struct CodeBuilder {
    arch: Architecture,
    bytes: Vec<u8>,
    metadata: Metadata,
    open: Option<OpenFunction>,
}

impl CodeBuilder {
    pub fn new(arch: Architecture) -> Self {
        let mut metadata = Metadata::new(ModuleKind::Wasm);
        metadata.debug_enabled = true;
        Self {
            arch,
            bytes: Vec::new(),
            metadata,
            open: None,
        }
    }

    pub fn debug_enabled(mut self, enabled: bool) -> Self {
        self.metadata.debug_enabled = enabled;
        self
    }

    pub fn filename(mut self, filename: impl Into<Vec<u8>>) -> Self {
        self.metadata.filename = Some(filename.into());
        self
    }

    pub fn hash(mut self, hash: ModuleHash) -> Self {
        self.metadata.hash = hash;
        self
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn offset(&self) -> Result<u32> {
        u32::try_from(self.bytes.len()).map_err(|_| Error::SegmentTooLarge)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<u32> {
        self.bytes.try_reserve(bytes.len())?;
        self.bytes.extend_from_slice(bytes);
        self.offset()
    }

    fn align(&mut self) -> Result<()> {
        while self.bytes.len() % self.arch.alignment() != 0 {
            self.emit(&[0])?;
        }
        Ok(())
    }

    fn next_func_index(&self) -> u32 {
        self.metadata.debug_func_to_code_range.len() as u32
    }

    fn push_range(&mut self, range: CodeRange) -> u32 {
        let index = self.metadata.code_ranges.len() as u32;
        self.metadata.code_ranges.push(range);
        index
    }

    /// Declares an imported function, represented by a small exit stub.
    pub fn declare_import(&mut self, params: Vec<ValType>, result: ExprType) -> Result<u32> {
        if let Some(open) = &self.open {
            return Err(Error::FunctionStillOpen(open.func_index));
        }
        let func_index = self.next_func_index();
        let begin = self.offset()?;
        let filler = self.arch.filler();
        let end = self.emit(filler)?;
        let range = self.push_range(CodeRange::new(CodeRangeKind::ImportExit, func_index, begin, end));
        self.metadata.debug_func_to_code_range.push(range);
        self.metadata.debug_func_arg_types.push(params);
        self.metadata.debug_func_return_types.push(result);
        Ok(func_index)
    }

    /// Starts the function whose body begins at `func_line_or_bytecode` in
    /// the module bytecode, returning its function index.
    pub fn begin_function(
        &mut self,
        func_line_or_bytecode: u32,
        params: Vec<ValType>,
        result: ExprType,
    ) -> Result<u32> {
        if let Some(open) = &self.open {
            return Err(Error::FunctionStillOpen(open.func_index));
        }
        let func_index = self.next_func_index();
        let begin = self.offset()?;
        // prologue
        let filler = self.arch.filler();
        self.emit(filler)?;
        self.metadata.debug_func_arg_types.push(params);
        self.metadata.debug_func_return_types.push(result);
        self.open = Some(OpenFunction {
            func_index,
            func_line_or_bytecode,
            begin,
        });
        Ok(func_index)
    }

    /// Emits `count` instructions of ordinary code into the open function.
    pub fn emit_body(&mut self, count: usize) -> Result<()> {
        if self.open.is_none() {
            return Err(Error::NoOpenFunction);
        }
        let filler = self.arch.filler();
        for _ in 0..count {
            self.emit(filler)?;
        }
        Ok(())
    }

    /// Emits a disarmed debug trap slot and records its call site. Returns
    /// the return address offset of the slot.
    pub fn emit_debug_trap(&mut self, kind: CallSiteKind, line_or_bytecode: u32) -> Result<u32> {
        if self.open.is_none() {
            return Err(Error::NoOpenFunction);
        }
        let nop = self.arch.nop();
        let return_address = self.emit(nop)?;
        self.metadata
            .call_sites
            .push(CallSite::new(kind, line_or_bytecode, return_address));
        Ok(return_address)
    }

    pub fn end_function(&mut self) -> Result<CodeRange> {
        let open = self.open.take().ok_or(Error::NoOpenFunction)?;
        // epilogue
        let filler = self.arch.filler();
        let end = self.emit(filler)?;
        let range = CodeRange::new_function(open.func_index, open.func_line_or_bytecode, open.begin, end);
        let index = self.push_range(range.clone());
        self.metadata.debug_func_to_code_range.push(index);
        Ok(range)
    }

    /// Emits a far-jump thunk between functions. Its target is filled in by
    /// the host once the debug trap handler is known.
    pub fn emit_far_jump_thunk(&mut self) -> Result<u32> {
        if let Some(open) = &self.open {
            return Err(Error::FunctionStillOpen(open.func_index));
        }
        self.align()?;
        let begin = self.offset()?;
        let thunk = self.arch.far_jump_thunk();
        let end = self.emit(thunk)?;
        self.push_range(CodeRange::new(CodeRangeKind::FarJumpIsland, 0, begin, end));
        self.metadata.debug_trap_far_jump_offsets.push(begin);
        Ok(begin)
    }

    pub fn finish(self) -> Result<SharedCode> {
        if let Some(open) = &self.open {
            return Err(Error::FunctionStillOpen(open.func_index));
        }
        let has_debug_traps = self.metadata.call_sites.iter().any(|site| {
            matches!(
                site.kind(),
                CallSiteKind::Breakpoint | CallSiteKind::EnterFrame | CallSiteKind::LeaveFrame
            )
        });
        if has_debug_traps && self.metadata.debug_trap_far_jump_offsets.is_empty() {
            return Err(Error::MissingFarJumpThunk);
        }
        Ok(Code::new(CodeSegment::new(self.arch, self.bytes), self.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lays_out_functions_and_thunks() -> Result<()> {
        let mut builder = CodeBuilder::new(Architecture::X64);
        let import = builder.declare_import(vec![ValType::I32], ExprType::Void)?;
        let func = builder.begin_function(40, vec![], ExprType::Value(ValType::I32))?;
        let enter = builder.emit_debug_trap(CallSiteKind::EnterFrame, 40)?;
        builder.emit_body(3)?;
        let brk = builder.emit_debug_trap(CallSiteKind::Breakpoint, 42)?;
        let range = builder.end_function()?;
        let thunk = builder.emit_far_jump_thunk()?;
        let code = builder.finish()?;

        assert_eq!((import, func), (0, 1));
        assert!(range.begin() < enter && brk < range.end());
        assert_eq!(code.metadata().debug_trap_far_jump_offsets, vec![thunk]);
        assert_eq!(code.metadata().function_code_range(1), &range);
        assert_eq!(code.lookup_range(brk).map(|r| r.func_index()), Some(1));
        assert!(!code.segment().is_trap_armed(brk as usize));
        Ok(())
    }

    #[test]
    fn debug_traps_need_a_thunk() -> Result<()> {
        let mut builder = CodeBuilder::new(Architecture::Arm64);
        builder.begin_function(0, vec![], ExprType::Void)?;
        builder.emit_debug_trap(CallSiteKind::Breakpoint, 1)?;
        builder.end_function()?;
        assert!(matches!(builder.finish(), Err(Error::MissingFarJumpThunk)));
        Ok(())
    }

    #[test]
    fn traps_require_an_open_function() {
        let mut builder = CodeBuilder::new(Architecture::X64);
        assert!(matches!(
            builder.emit_debug_trap(CallSiteKind::Breakpoint, 1),
            Err(Error::NoOpenFunction)
        ));
    }
}
