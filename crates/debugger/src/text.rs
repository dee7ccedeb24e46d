use crate::sourcemap::{ExprLoc, GeneratedSourceMap};
use anyhow::Result;
use std::fmt::Write;
use wasmdebug_code::val_type_name;
use wasmparser::{
    BlockType, FuncType, FunctionBody, MemArg, Operator, Parser, Payload, Type, TypeRef,
};

pub const ENABLED_MESSAGE: &str = "Restart with developer tools open to view WebAssembly source";

pub const TOO_BIG_MESSAGE: &str = "Unfortunately, this WebAssembly module is too big to view as text.\n\
     We are working hard to remove this limitation.";

/// Modules with more bytecode than this are not disassembled.
pub const TOO_BIG: usize = 1_000_000;

/// Disassembler that records where each expression ends up in the text.
///
/// Implementations append the text to `out` and push one [`ExprLoc`] per
/// expression into `map` in non-decreasing line order, then set the map's
/// total line count.
pub trait BinaryToText {
    fn binary_to_text(&self, bytes: &[u8], out: &mut String, map: &mut GeneratedSourceMap)
        -> Result<()>;
}

/// Prints a module as indented text, one operator per line.
#[derive(Default)]
pub struct WatPrinter {}

impl WatPrinter {
    pub fn new() -> Self {
        Self {}
    }
}

const FUNC_INDENT: usize = 2;
const BODY_INDENT: usize = 4;

struct Lines<'a> {
    out: &'a mut String,
    lineno: u32,
}

impl<'a> Lines<'a> {
    /// Writes one line and returns its number and the column of its text.
    fn line(&mut self, indent: usize, text: &str) -> (u32, u32) {
        self.lineno += 1;
        for _ in 0..indent {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
        (self.lineno, indent as u32)
    }
}

fn signature_text(ty: &FuncType) -> String {
    let mut text = String::new();
    if !ty.params().is_empty() {
        text.push_str(" (param");
        for param in ty.params() {
            let _ = write!(text, " {}", val_type_name(*param));
        }
        text.push(')');
    }
    if !ty.results().is_empty() {
        text.push_str(" (result");
        for result in ty.results() {
            let _ = write!(text, " {}", val_type_name(*result));
        }
        text.push(')');
    }
    text
}

/// `LocalGet` -> `local.get`, `I32TruncF32S` -> `i32.trunc_f32_s`, `BrIf` -> `br_if`.
fn mnemonic(op: &Operator) -> String {
    const NAMESPACES: &[&str] = &[
        "i32", "i64", "f32", "f64", "v128", "i8x16", "i16x8", "i32x4", "i64x2", "f32x4", "f64x2",
        "local", "global", "memory", "table", "ref", "data", "elem", "atomic",
    ];
    let debug = format!("{:?}", op);
    let name = debug
        .split(|c: char| c == ' ' || c == '{' || c == '(')
        .next()
        .unwrap_or("");
    let mut words = Vec::new();
    let mut word = String::new();
    for c in name.chars() {
        if c.is_ascii_uppercase() && !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
        word.push(c.to_ascii_lowercase());
    }
    if !word.is_empty() {
        words.push(word);
    }
    let mut text = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 1 {
            text.push(if NAMESPACES.contains(&words[0].as_str()) { '.' } else { '_' });
        } else if i > 1 {
            text.push('_');
        }
        text.push_str(word);
    }
    text
}

fn block_type_text(ty: &BlockType) -> String {
    match ty {
        BlockType::Empty => String::new(),
        BlockType::Type(ty) => format!(" (result {})", val_type_name(*ty)),
        BlockType::FuncType(index) => format!(" (type {})", index),
    }
}

/// Immediates of a load or store; the natural alignment and a zero offset
/// are left out.
fn memarg_text(memarg: &MemArg) -> String {
    let mut text = String::new();
    if memarg.memory != 0 {
        let _ = write!(text, " {}", memarg.memory);
    }
    if memarg.offset != 0 {
        let _ = write!(text, " offset={}", memarg.offset);
    }
    if memarg.align != memarg.max_align {
        let _ = write!(text, " align={}", 1u64 << memarg.align);
    }
    text
}

fn memarg<'a>(op: &'a Operator<'_>) -> Option<&'a MemArg> {
    match op {
        Operator::I32Load { memarg }
        | Operator::I64Load { memarg }
        | Operator::F32Load { memarg }
        | Operator::F64Load { memarg }
        | Operator::I32Load8S { memarg }
        | Operator::I32Load8U { memarg }
        | Operator::I32Load16S { memarg }
        | Operator::I32Load16U { memarg }
        | Operator::I64Load8S { memarg }
        | Operator::I64Load8U { memarg }
        | Operator::I64Load16S { memarg }
        | Operator::I64Load16U { memarg }
        | Operator::I64Load32S { memarg }
        | Operator::I64Load32U { memarg }
        | Operator::I32Store { memarg }
        | Operator::I64Store { memarg }
        | Operator::F32Store { memarg }
        | Operator::F64Store { memarg }
        | Operator::I32Store8 { memarg }
        | Operator::I32Store16 { memarg }
        | Operator::I64Store8 { memarg }
        | Operator::I64Store16 { memarg }
        | Operator::I64Store32 { memarg }
        | Operator::V128Load { memarg }
        | Operator::V128Store { memarg } => Some(memarg),
        _ => None,
    }
}

fn call_indirect_text(name: &str, type_index: u32, table_index: u32) -> String {
    if table_index == 0 {
        format!("{} (type {})", name, type_index)
    } else {
        format!("{} {} (type {})", name, table_index, type_index)
    }
}

fn operator_text(op: &Operator) -> Result<String> {
    let name = mnemonic(op);
    if let Some(memarg) = memarg(op) {
        return Ok(format!("{}{}", name, memarg_text(memarg)));
    }
    let text = match op {
        Operator::Block { blockty }
        | Operator::Loop { blockty }
        | Operator::If { blockty }
        | Operator::Try { blockty } => format!("{}{}", name, block_type_text(blockty)),
        Operator::LocalGet { local_index }
        | Operator::LocalSet { local_index }
        | Operator::LocalTee { local_index } => format!("{} {}", name, local_index),
        Operator::GlobalGet { global_index } | Operator::GlobalSet { global_index } => {
            format!("{} {}", name, global_index)
        }
        Operator::Call { function_index } | Operator::ReturnCall { function_index } => {
            format!("{} {}", name, function_index)
        }
        Operator::CallIndirect {
            type_index,
            table_index,
            ..
        }
        | Operator::ReturnCallIndirect {
            type_index,
            table_index,
        } => call_indirect_text(&name, *type_index, *table_index),
        Operator::Br { relative_depth }
        | Operator::BrIf { relative_depth }
        | Operator::Rethrow { relative_depth }
        | Operator::Delegate { relative_depth } => format!("{} {}", name, relative_depth),
        Operator::BrTable { targets } => {
            let mut text = name;
            for target in targets.targets() {
                let _ = write!(text, " {}", target?);
            }
            let _ = write!(text, " {}", targets.default());
            text
        }
        Operator::Throw { tag_index } | Operator::Catch { tag_index } => {
            format!("{} {}", name, tag_index)
        }
        Operator::I32Const { value } => format!("{} {}", name, value),
        Operator::I64Const { value } => format!("{} {}", name, value),
        Operator::F32Const { value } => format!("{} {}", name, f32::from_bits(value.bits())),
        Operator::F64Const { value } => format!("{} {}", name, f64::from_bits(value.bits())),
        _ => name,
    };
    Ok(text)
}

fn print_function(
    lines: &mut Lines,
    map: &mut GeneratedSourceMap,
    func_index: u32,
    ty: Option<&FuncType>,
    body: &FunctionBody,
) -> Result<()> {
    let header = match ty {
        Some(ty) => format!("(func (;{};){}", func_index, signature_text(ty)),
        None => format!("(func (;{};)", func_index),
    };
    lines.line(FUNC_INDENT, &header);

    let mut locals = String::new();
    for local in body.get_locals_reader()? {
        let (count, ty) = local?;
        for _ in 0..count {
            let _ = write!(locals, " {}", val_type_name(ty));
        }
    }
    if !locals.is_empty() {
        lines.line(BODY_INDENT, &format!("(local{})", locals));
    }

    let mut reader = body.get_operators_reader()?;
    let mut depth = 0usize;
    while !reader.eof() {
        let (op, offset) = reader.read_with_offset()?;
        let (lineno, column) = match op {
            Operator::End if depth == 0 => lines.line(FUNC_INDENT, ")"),
            Operator::End | Operator::Delegate { .. } => {
                depth = depth.saturating_sub(1);
                lines.line(BODY_INDENT + 2 * depth, &operator_text(&op)?)
            }
            Operator::Else | Operator::Catch { .. } | Operator::CatchAll => lines.line(
                BODY_INDENT + 2 * depth.saturating_sub(1),
                &operator_text(&op)?,
            ),
            Operator::Block { .. }
            | Operator::Loop { .. }
            | Operator::If { .. }
            | Operator::Try { .. } => {
                let position = lines.line(BODY_INDENT + 2 * depth, &operator_text(&op)?);
                depth += 1;
                position
            }
            _ => lines.line(BODY_INDENT + 2 * depth, &operator_text(&op)?),
        };
        map.push(ExprLoc::new(offset as u32, lineno, column))?;
    }
    Ok(())
}

impl BinaryToText for WatPrinter {
    fn binary_to_text(
        &self,
        bytes: &[u8],
        out: &mut String,
        map: &mut GeneratedSourceMap,
    ) -> Result<()> {
        let mut lines = Lines { out, lineno: 0 };
        lines.line(0, "(module");

        let mut types = Vec::new();
        let mut func_types = Vec::new();
        let mut imported_funcs = 0;
        let mut defined_funcs = 0;
        for payload in Parser::new(0).parse_all(bytes) {
            match payload? {
                Payload::TypeSection(reader) => {
                    for ty in reader {
                        let Type::Func(func_type) = ty?;
                        types.push(func_type);
                    }
                }
                Payload::ImportSection(reader) => {
                    for import in reader {
                        if let TypeRef::Func(_) = import?.ty {
                            imported_funcs += 1;
                        }
                    }
                }
                Payload::FunctionSection(reader) => {
                    for type_index in reader {
                        func_types.push(type_index?);
                    }
                }
                Payload::CodeSectionEntry(body) => {
                    let ty = func_types
                        .get(defined_funcs as usize)
                        .and_then(|&index| types.get(index as usize));
                    print_function(&mut lines, map, imported_funcs + defined_funcs, ty, &body)?;
                    defined_funcs += 1;
                }
                _ => continue,
            }
        }

        lines.line(0, ")");
        map.set_total_lines(lines.lineno);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_follow_text_format_names() {
        assert_eq!(mnemonic(&Operator::LocalGet { local_index: 0 }), "local.get");
        assert_eq!(mnemonic(&Operator::I32Add), "i32.add");
        assert_eq!(mnemonic(&Operator::BrIf { relative_depth: 0 }), "br_if");
        assert_eq!(mnemonic(&Operator::I32TruncF32S), "i32.trunc_f32_s");
        assert_eq!(mnemonic(&Operator::Nop), "nop");
    }

    fn print_body(body: &[u8]) -> String {
        let mut out = String::new();
        let mut map = GeneratedSourceMap::new();
        let mut lines = Lines {
            out: &mut out,
            lineno: 0,
        };
        print_function(&mut lines, &mut map, 0, None, &FunctionBody::new(0, body)).unwrap();
        out
    }

    #[test]
    fn immediates_are_printed() {
        let body = [
            0x00, // no locals
            0x02, 0x7f, // block (result i32)
            0x41, 0x00, // i32.const 0
            0x0e, 0x02, 0x00, 0x01, 0x00, // br_table 0 1 0
            0x0b, // end
            0x28, 0x00, 0x08, // i32.load offset=8 align=1
            0x36, 0x02, 0x00, // i32.store
            0x11, 0x01, 0x00, // call_indirect (type 1)
            0x03, 0x00, // loop (type 0)
            0x0b, // end
            0x0b,
        ];
        assert_eq!(
            print_body(&body),
            "  (func (;0;)
    block (result i32)
      i32.const 0
      br_table 0 1 0
    end
    i32.load offset=8 align=1
    i32.store
    call_indirect (type 1)
    loop (type 0)
    end
  )
"
        );
    }

    #[test]
    fn try_blocks_nest_like_if() {
        let body = [
            0x00, // no locals
            0x06, 0x40, // try
            0x01, // nop
            0x07, 0x00, // catch 0
            0x19, // catch_all
            0x0b, // end
            0x06, 0x7f, // try (result i32)
            0x41, 0x00, // i32.const 0
            0x18, 0x00, // delegate 0
            0x1a, // drop
            0x0b,
        ];
        assert_eq!(
            print_body(&body),
            "  (func (;0;)
    try
      nop
    catch 0
    catch_all
    end
    try (result i32)
      i32.const 0
    delegate 0
    drop
  )
"
        );
    }

    #[test]
    fn empty_module_prints_two_lines() {
        // magic + version only
        let bytes = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];
        let mut out = String::new();
        let mut map = GeneratedSourceMap::new();
        WatPrinter::new()
            .binary_to_text(&bytes, &mut out, &mut map)
            .unwrap();
        assert_eq!(out, "(module\n)\n");
        assert_eq!(map.total_lines(), 2);
        assert!(map.exprlocs().is_empty());
    }
}
