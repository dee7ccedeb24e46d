use std::fmt;
use wasmparser::ValType;

pub const MODULE_HASH_LENGTH: usize = 16;

/// Digest of the module bytecode, used to identify a module in display URLs.
pub type ModuleHash = [u8; MODULE_HASH_LENGTH];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Wasm,
    AsmJs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeRangeKind {
    Function,
    ImportExit,
    FarJumpIsland,
}

/// A contiguous region `[begin, end)` of the code segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeRange {
    begin: u32,
    end: u32,
    func_index: u32,
    func_line_or_bytecode: u32,
    kind: CodeRangeKind,
}

impl CodeRange {
    pub fn new_function(func_index: u32, func_line_or_bytecode: u32, begin: u32, end: u32) -> Self {
        Self {
            begin,
            end,
            func_index,
            func_line_or_bytecode,
            kind: CodeRangeKind::Function,
        }
    }

    pub fn new(kind: CodeRangeKind, func_index: u32, begin: u32, end: u32) -> Self {
        Self {
            begin,
            end,
            func_index,
            func_line_or_bytecode: 0,
            kind,
        }
    }

    pub fn begin(&self) -> u32 {
        self.begin
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn func_index(&self) -> u32 {
        self.func_index
    }

    /// Bytecode offset of the function body this range was compiled from.
    pub fn func_line_or_bytecode(&self) -> u32 {
        self.func_line_or_bytecode
    }

    pub fn kind(&self) -> CodeRangeKind {
        self.kind
    }

    pub fn is_function(&self) -> bool {
        self.kind == CodeRangeKind::Function
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.begin <= offset && offset < self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallSiteKind {
    Func,
    Dynamic,
    Symbolic,
    Breakpoint,
    EnterFrame,
    LeaveFrame,
}

impl CallSiteKind {
    pub fn is_frame_trap(self) -> bool {
        matches!(self, CallSiteKind::EnterFrame | CallSiteKind::LeaveFrame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    return_address_offset: u32,
    line_or_bytecode: u32,
    kind: CallSiteKind,
}

impl CallSite {
    pub fn new(kind: CallSiteKind, line_or_bytecode: u32, return_address_offset: u32) -> Self {
        Self {
            return_address_offset,
            line_or_bytecode,
            kind,
        }
    }

    pub fn return_address_offset(&self) -> u32 {
        self.return_address_offset
    }

    pub fn line_or_bytecode(&self) -> u32 {
        self.line_or_bytecode
    }

    pub fn kind(&self) -> CallSiteKind {
        self.kind
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprType {
    Void,
    Value(ValType),
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "void"),
            Self::Value(ty) => write!(f, "{}", val_type_name(*ty)),
        }
    }
}

pub fn val_type_name(ty: ValType) -> String {
    format!("{:?}", ty).to_lowercase()
}

/// Compile-time description of a code segment.
#[derive(Clone, Debug)]
pub struct Metadata {
    pub kind: ModuleKind,
    pub debug_enabled: bool,
    /// Sorted by `begin`, non-overlapping.
    pub code_ranges: Vec<CodeRange>,
    pub call_sites: Vec<CallSite>,
    pub debug_func_to_code_range: Vec<u32>,
    pub debug_func_arg_types: Vec<Vec<ValType>>,
    pub debug_func_return_types: Vec<ExprType>,
    /// Ascending.
    pub debug_trap_far_jump_offsets: Vec<u32>,
    pub filename: Option<Vec<u8>>,
    pub hash: ModuleHash,
}

impl Metadata {
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            kind,
            debug_enabled: false,
            code_ranges: Vec::new(),
            call_sites: Vec::new(),
            debug_func_to_code_range: Vec::new(),
            debug_func_arg_types: Vec::new(),
            debug_func_return_types: Vec::new(),
            debug_trap_far_jump_offsets: Vec::new(),
            filename: None,
            hash: [0; MODULE_HASH_LENGTH],
        }
    }

    pub fn is_asm_js(&self) -> bool {
        self.kind == ModuleKind::AsmJs
    }

    pub fn function_code_range(&self, func_index: u32) -> &CodeRange {
        let range_index = self.debug_func_to_code_range[func_index as usize];
        &self.code_ranges[range_index as usize]
    }

    /// Finds the code range containing `offset`.
    pub fn lookup_range(&self, offset: u32) -> Option<&CodeRange> {
        let index = self
            .code_ranges
            .partition_point(|range| range.end() <= offset);
        self.code_ranges
            .get(index)
            .filter(|range| range.contains(offset))
    }

    pub fn function_count(&self) -> u32 {
        self.debug_func_to_code_range.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_with_ranges() -> Metadata {
        let mut metadata = Metadata::new(ModuleKind::Wasm);
        metadata.code_ranges = vec![
            CodeRange::new_function(0, 10, 0, 16),
            CodeRange::new(CodeRangeKind::FarJumpIsland, 0, 16, 30),
            CodeRange::new_function(1, 40, 32, 64),
        ];
        metadata.debug_func_to_code_range = vec![0, 2];
        metadata
    }

    #[test]
    fn lookup_range_respects_half_open_bounds() {
        let metadata = metadata_with_ranges();
        assert_eq!(metadata.lookup_range(0).map(|r| r.func_index()), Some(0));
        assert_eq!(metadata.lookup_range(15).map(|r| r.func_index()), Some(0));
        assert_eq!(
            metadata.lookup_range(16).map(|r| r.kind()),
            Some(CodeRangeKind::FarJumpIsland)
        );
        assert!(metadata.lookup_range(30).is_none());
        assert_eq!(metadata.lookup_range(63).map(|r| r.func_index()), Some(1));
        assert!(metadata.lookup_range(64).is_none());
    }

    #[test]
    fn function_code_range_follows_debug_mapping() {
        let metadata = metadata_with_ranges();
        assert_eq!(metadata.function_code_range(1).begin(), 32);
        assert_eq!(metadata.function_code_range(1).func_line_or_bytecode(), 40);
    }

    #[test]
    fn expr_type_display() {
        assert_eq!(ExprType::Void.to_string(), "void");
        assert_eq!(ExprType::Value(ValType::I64).to_string(), "i64");
    }
}
