use crate::error::{Error, Result};
use crate::state::DebugState;
use log::{debug, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::str;
use wasmdebug_code::{ExprType, ModuleHash, ValType};
use wasmparser::FunctionBody;

/// Upper bound on the locals a function body may declare.
pub const MAX_LOCALS: u64 = 50_000;

/// Characters left alone by `encodeURI`.
const URI_UNESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Percent-encodes `filename` as `encodeURI` would. `None` if it is not
/// valid UTF-8.
pub fn encode_uri(filename: &[u8]) -> Option<String> {
    let filename = str::from_utf8(filename).ok()?;
    Some(utf8_percent_encode(filename, URI_UNESCAPED).to_string())
}

pub fn display_url(filename: Option<&[u8]>, hash: &ModuleHash) -> String {
    let mut url = String::from("wasm:");
    if let Some(filename) = filename {
        match encode_uri(filename) {
            Some(encoded) => {
                url.push_str(&encoded);
                url.push(':');
            }
            None => warn!("dropping filename that cannot be URI encoded from display URL"),
        }
    }
    url.push_str(&hex::encode(hash));
    url
}

impl DebugState {
    /// Types of the arguments followed by the declared locals of a function,
    /// together with the number of arguments.
    pub fn debug_get_local_types(&self, func_index: u32) -> Result<(Vec<ValType>, usize)> {
        assert!(self.metadata.debug_enabled);
        let args = &self.metadata.debug_func_arg_types[func_index as usize];
        let mut locals = Vec::new();
        locals.try_reserve(args.len())?;
        locals.extend_from_slice(args);

        let range = self.metadata.function_code_range(func_index);
        if !range.is_function() {
            return Ok((locals, args.len()));
        }
        assert!(!self.metadata.is_asm_js());
        let bytecode = match &self.maybe_bytecode {
            Some(bytecode) => bytecode,
            None => unreachable!("debug-enabled code without bytecode"),
        };
        let body_offset = range.func_line_or_bytecode() as usize;
        let body = FunctionBody::new(body_offset, bytecode.get(body_offset..).unwrap_or(&[]));

        let mut declared = 0u64;
        for entry in body.get_locals_reader()? {
            let (count, ty) = entry?;
            declared += u64::from(count);
            if declared > MAX_LOCALS {
                return Err(Error::TooManyLocals(declared));
            }
            locals.try_reserve(count as usize)?;
            locals.extend(std::iter::repeat(ty).take(count as usize));
        }
        debug!(
            "function {} has {} arguments and {} locals",
            func_index,
            args.len(),
            declared
        );
        Ok((locals, args.len()))
    }

    pub fn debug_get_result_type(&self, func_index: u32) -> ExprType {
        assert!(self.metadata.debug_enabled);
        self.metadata.debug_func_return_types[func_index as usize]
    }

    /// `wasm:` URL naming the module: the URI encoded filename, if any, and
    /// the hex module hash.
    pub fn debug_display_url(&self) -> String {
        display_url(self.metadata.filename.as_deref(), &self.metadata.hash)
    }
}
