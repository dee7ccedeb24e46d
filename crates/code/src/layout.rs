//! Debug layout of a wasm module.
//!
//! Produces a code segment with the trap slots a debug-enabled compilation
//! would contain: an `EnterFrame` slot at function entry, a `Breakpoint` slot
//! in front of every operator, and a `LeaveFrame` slot in front of the final
//! `end`. Far-jump islands are placed between groups of functions.

use crate::arch::Architecture;
use crate::builder::CodeBuilder;
use crate::code::SharedCode;
use crate::metadata::{CallSiteKind, ExprType, ModuleHash, MODULE_HASH_LENGTH};
use anyhow::{anyhow, Context, Result};
use log::debug;
use sha2::{Digest, Sha256};
use wasmparser::{FuncType, FunctionBody, Parser, Payload, Type, TypeRef, ValType};

#[derive(Clone, Debug)]
pub struct LayoutOptions {
    pub arch: Architecture,
    pub filename: Option<String>,
    pub functions_per_island: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            arch: Architecture::host(),
            filename: None,
            functions_per_island: 16,
        }
    }
}

pub fn module_hash(bytes: &[u8]) -> ModuleHash {
    let digest = Sha256::digest(bytes);
    let mut hash = [0; MODULE_HASH_LENGTH];
    hash.copy_from_slice(&digest[..MODULE_HASH_LENGTH]);
    hash
}

fn signature(types: &[FuncType], type_index: u32) -> Result<(Vec<ValType>, ExprType)> {
    let ty = types
        .get(type_index as usize)
        .ok_or_else(|| anyhow!("type index {} out of bounds", type_index))?;
    let result = match ty.results() {
        [] => ExprType::Void,
        [ty] => ExprType::Value(*ty),
        _ => return Err(anyhow!("multi-value results are not supported")),
    };
    Ok((ty.params().to_vec(), result))
}

fn lay_out_function(
    builder: &mut CodeBuilder,
    body: &FunctionBody,
    params: Vec<ValType>,
    result: ExprType,
) -> Result<()> {
    let func_begin = body.range().start as u32;
    let func_index = builder.begin_function(func_begin, params, result)?;
    builder.emit_debug_trap(CallSiteKind::EnterFrame, func_begin)?;

    let mut reader = body.get_operators_reader()?;
    let mut operators = 0;
    while !reader.eof() {
        let (_, offset) = reader.read_with_offset()?;
        let kind = if reader.eof() {
            CallSiteKind::LeaveFrame
        } else {
            CallSiteKind::Breakpoint
        };
        builder.emit_debug_trap(kind, offset as u32)?;
        builder.emit_body(1)?;
        operators += 1;
    }
    let range = builder.end_function()?;
    debug!(
        "function {} laid out at {:#x}..{:#x} with {} operators",
        func_index,
        range.begin(),
        range.end(),
        operators
    );
    Ok(())
}

pub fn lay_out_module(bytes: &[u8], options: &LayoutOptions) -> Result<SharedCode> {
    let per_island = options.functions_per_island.max(1);
    let mut builder = CodeBuilder::new(options.arch).hash(module_hash(bytes));
    if let Some(filename) = &options.filename {
        builder = builder.filename(filename.as_bytes().to_vec());
    }

    let mut types = Vec::new();
    let mut func_types = Vec::new();
    let mut laid_out = 0;
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
                    if let TypeRef::Func(type_index) = import?.ty {
                        let (params, result) = signature(&types, type_index)?;
                        builder.declare_import(params, result)?;
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    func_types.push(type_index?);
                }
            }
            Payload::CodeSectionEntry(body) => {
                let type_index = *func_types
                    .get(laid_out)
                    .ok_or_else(|| anyhow!("code entry {} has no function declaration", laid_out))?;
                let (params, result) = signature(&types, type_index)?;
                lay_out_function(&mut builder, &body, params, result)
                    .with_context(|| format!("failed to lay out code entry {}", laid_out))?;
                laid_out += 1;
                if laid_out % per_island == 0 {
                    builder.emit_far_jump_thunk()?;
                }
            }
            _ => continue,
        }
    }
    if laid_out == 0 || laid_out % per_island != 0 {
        builder.emit_far_jump_thunk()?;
    }
    Ok(builder.finish()?)
}
