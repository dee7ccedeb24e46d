use std::rc::Rc;
use wasmdebug_code::layout::{lay_out_module, module_hash, LayoutOptions};
use wasmdebug_code::{Architecture, CallSiteKind, ExprType, ValType};
use wasmdebug_debugger::text::{TOO_BIG, TOO_BIG_MESSAGE};
use wasmdebug_debugger::*;

const MODULE: &str = r#"
(module
  (import "env" "log" (func (param i64)))
  (func (param i32) (result i32) (local i64 f32)
    local.get 0
    if (result i32)
      i32.const 1
    else
      i32.const 2
    end))
"#;

const MODULE_TEXT: &str = "(module
  (func (;1;) (param i32) (result i32)
    (local i64 f32)
    local.get 0
    if (result i32)
      i32.const 1
    else
      i32.const 2
    end
  )
)
";

fn load(text: &str, arch: Architecture) -> anyhow::Result<(DebugState, Vec<u8>)> {
    let bytes = wat::parse_str(text)?;
    let options = LayoutOptions {
        arch,
        filename: Some("calc v1.wasm".to_string()),
        ..LayoutOptions::default()
    };
    let code = lay_out_module(&bytes, &options)?;
    let state = DebugState::new(code, Some(Rc::from(bytes.clone())));
    Ok((state, bytes))
}

#[test]
fn prints_module_as_text() -> anyhow::Result<()> {
    let (mut state, _) = load(MODULE, Architecture::X64)?;
    assert_eq!(state.create_text()?, MODULE_TEXT);
    assert_eq!(state.total_source_lines()?, 11);
    let map = state.source_map().unwrap();
    assert!(map.is_sorted_by_line());
    assert_eq!(map.exprlocs().len(), 7);
    Ok(())
}

#[test]
fn lines_and_offsets_agree() -> anyhow::Result<()> {
    let (mut state, _) = load(MODULE, Architecture::X64)?;
    for lineno in 4..=10 {
        let offsets = state.get_line_offsets(lineno)?;
        assert_eq!(offsets.len(), 1, "line {}", lineno);
        let (found_line, _) = state.get_offset_location(offsets[0])?.unwrap();
        assert_eq!(found_line, lineno);
    }
    assert!(state.get_line_offsets(2)?.is_empty());

    let then_offset = state.get_line_offsets(6)?[0];
    assert_eq!(state.get_offset_location(then_offset)?, Some((6, 6)));
    // past the last expression
    assert_eq!(state.get_offset_location(u32::max_value())?, Some((10, 2)));
    Ok(())
}

#[test]
fn breakpoints_follow_source_lines() -> anyhow::Result<()> {
    let (mut state, _) = load(MODULE, Architecture::X64)?;
    let offset = state.get_line_offsets(6)?[0];
    assert!(state.has_breakpoint_trap_at_offset(offset));
    state.set_breakpoint(offset, DebuggerId(0), InstanceId(0), HandlerId(0))?;

    let trap = state
        .metadata()
        .call_sites
        .iter()
        .find(|site| site.kind() == CallSiteKind::Breakpoint && site.line_or_bytecode() == offset)
        .map(|site| site.return_address_offset())
        .unwrap();
    assert!(state.code().segment().is_trap_armed(trap as usize));

    // the function's final `end` only has a leave-frame trap
    let end_offset = state.get_line_offsets(10)?[0];
    assert!(!state.has_breakpoint_trap_at_offset(end_offset));
    assert!(state
        .set_breakpoint(end_offset, DebuggerId(0), InstanceId(0), HandlerId(0))
        .is_err());
    Ok(())
}

#[test]
fn arm64_traps_call_the_nearest_thunk() -> anyhow::Result<()> {
    let (mut state, _) = load(MODULE, Architecture::Arm64)?;
    state.increment_step_mode_count(1)?;
    let far_jumps = state.metadata().debug_trap_far_jump_offsets.clone();
    let segment = state.code().segment();
    for site in &state.metadata().call_sites {
        let trap = site.return_address_offset();
        let target = segment.call_target(trap as usize);
        match site.kind() {
            CallSiteKind::Breakpoint => {
                assert_eq!(target, Some(nearest_far_jump(&far_jumps, trap) as usize))
            }
            _ => assert_eq!(target, None),
        }
    }
    Ok(())
}

#[test]
fn local_types_include_arguments() -> anyhow::Result<()> {
    let (state, _) = load(MODULE, Architecture::X64)?;
    assert_eq!(
        state.debug_get_local_types(1)?,
        (vec![ValType::I32, ValType::I64, ValType::F32], 1)
    );
    assert_eq!(state.debug_get_local_types(0)?, (vec![ValType::I64], 1));
    assert_eq!(state.debug_get_result_type(0), ExprType::Void);
    assert_eq!(state.debug_get_result_type(1), ExprType::Value(ValType::I32));
    Ok(())
}

#[test]
fn too_many_locals_are_rejected() -> anyhow::Result<()> {
    let (state, _) = load(
        "(module (func (local i32 i32) (local i64) nop))",
        Architecture::X64,
    )?;
    assert_eq!(
        state.debug_get_local_types(0)?,
        (vec![ValType::I32, ValType::I32, ValType::I64], 0)
    );

    let many = format!(
        "(module (func {} nop))",
        "(local i32) ".repeat(MAX_LOCALS as usize + 1)
    );
    let (state, _) = load(&many, Architecture::X64)?;
    match state.debug_get_local_types(0) {
        Err(Error::TooManyLocals(count)) => assert_eq!(count, MAX_LOCALS + 1),
        other => panic!("unexpected result: {:?}", other),
    }
    Ok(())
}

#[test]
fn display_url_hashes_module_bytes() -> anyhow::Result<()> {
    let (state, bytes) = load(MODULE, Architecture::X64)?;
    let hash: String = module_hash(&bytes)
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    assert_eq!(hash.len(), 32);
    assert_eq!(
        state.debug_display_url(),
        format!("wasm:calc%20v1.wasm:{}", hash)
    );
    Ok(())
}

#[test]
fn empty_module_has_no_locations() -> anyhow::Result<()> {
    let (mut state, _) = load("(module)", Architecture::X64)?;
    assert_eq!(state.create_text()?, "(module\n)\n");
    assert_eq!(state.get_offset_location(0)?, None);
    assert!(state.get_line_offsets(1)?.is_empty());
    assert_eq!(state.total_source_lines()?, 2);
    Ok(())
}

struct CountingPrinter(Rc<std::cell::Cell<usize>>);

impl BinaryToText for CountingPrinter {
    fn binary_to_text(
        &self,
        _bytes: &[u8],
        out: &mut String,
        map: &mut GeneratedSourceMap,
    ) -> anyhow::Result<()> {
        self.0.set(self.0.get() + 1);
        out.push_str("(module)\n");
        map.push(ExprLoc::new(0, 1, 0))?;
        map.set_total_lines(1);
        Ok(())
    }
}

#[test]
fn default_text_limit_boundary() -> anyhow::Result<()> {
    for &(len, disassembled) in &[(TOO_BIG, true), (TOO_BIG + 1, false)] {
        let bytes = wat::parse_str("(module (func nop))")?;
        let code = lay_out_module(&bytes, &LayoutOptions::default())?;
        let calls = Rc::new(std::cell::Cell::new(0));
        let mut state = DebugState::new(code, Some(Rc::from(vec![0u8; len])))
            .with_disassembler(Box::new(CountingPrinter(Rc::clone(&calls))));
        let text = state.create_text()?;
        assert_eq!(calls.get() == 1, disassembled);
        assert_eq!(state.source_map().is_some(), disassembled);
        if !disassembled {
            assert_eq!(text, TOO_BIG_MESSAGE);
            assert_eq!(state.get_offset_location(0)?, None);
        }
    }
    Ok(())
}
