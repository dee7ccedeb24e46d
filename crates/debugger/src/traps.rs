use crate::counter::Transition;
use crate::error::Result;
use crate::state::DebugState;
use log::{debug, trace, warn};
use std::rc::Rc;
use wasmdebug_code::{CallSite, CallSiteKind, Metadata, WritableCode};

/// Far-jump thunk closest to `offset`. On a tie the lower thunk wins.
///
/// Panics if `far_jumps` is empty.
pub fn nearest_far_jump(far_jumps: &[u32], offset: u32) -> u32 {
    assert!(!far_jumps.is_empty(), "no far-jump thunks to call through");
    let above = far_jumps.partition_point(|&far_jump| far_jump < offset);
    match (above.checked_sub(1).map(|i| far_jumps[i]), far_jumps.get(above)) {
        (Some(low), Some(&high)) if high - offset < offset - low => high,
        (Some(low), _) => low,
        (None, Some(&high)) => high,
        (None, None) => unreachable!(),
    }
}

/// Arms or disarms the trap slot whose return address is at `offset`.
/// `code` must cover the slot.
pub fn toggle_debug_trap(code: &mut WritableCode, metadata: &Metadata, offset: u32, enabled: bool) {
    assert!(offset != 0, "a debug trap cannot return to the start of the segment");
    if enabled {
        let far_jump = nearest_far_jump(&metadata.debug_trap_far_jump_offsets, offset);
        trace!("arm trap at {:#x} through thunk at {:#x}", offset, far_jump);
        code.patch_nop_to_call(offset as usize, far_jump as usize);
    } else {
        trace!("disarm trap at {:#x}", offset);
        code.patch_call_to_nop(offset as usize);
    }
}

fn find_breakpoint_call_site(metadata: &Metadata, offset: u32) -> Option<&CallSite> {
    metadata
        .call_sites
        .iter()
        .find(|site| site.kind() == CallSiteKind::Breakpoint && site.line_or_bytecode() == offset)
}

impl DebugState {
    pub fn step_mode_enabled(&self, func_index: u32) -> bool {
        self.step_mode_counters.contains_key(&func_index)
    }

    /// Enters step mode for a function. The first request arms every
    /// breakpoint trap of the function.
    pub fn increment_step_mode_count(&mut self, func_index: u32) -> Result<()> {
        assert!(self.metadata.debug_enabled);
        let metadata = Rc::clone(&self.metadata);
        let range = metadata.function_code_range(func_index);
        assert!(range.is_function());

        if let Some(counter) = self.step_mode_counters.get_mut(&func_index) {
            counter.increment();
            return Ok(());
        }
        self.step_mode_counters.try_reserve(1)?;

        // The scope is opened before the counter is inserted so a failure
        // leaves the function out of step mode.
        let code = Rc::clone(&self.code);
        let mut segment = code.segment_mut();
        let mut writable = segment.writable(
            range.begin() as usize..range.end() as usize,
            "DebugState::increment_step_mode_count",
        )?;
        let transition = self
            .step_mode_counters
            .entry(func_index)
            .or_default()
            .increment();
        debug_assert_eq!(transition, Transition::Armed);
        debug!("function {} entered step mode", func_index);

        for call_site in &metadata.call_sites {
            if call_site.kind() != CallSiteKind::Breakpoint {
                continue;
            }
            let offset = call_site.return_address_offset();
            if range.begin() <= offset && offset <= range.end() {
                toggle_debug_trap(&mut writable, &metadata, offset, true);
            }
        }
        Ok(())
    }

    /// Leaves step mode for a function. The last release disarms the
    /// function's breakpoint traps, except those that still have a
    /// breakpoint site.
    pub fn decrement_step_mode_count(&mut self, func_index: u32) -> Result<()> {
        assert!(self.metadata.debug_enabled);
        let metadata = Rc::clone(&self.metadata);
        let range = metadata.function_code_range(func_index);
        assert!(range.is_function());

        match self.step_mode_counters.get_mut(&func_index) {
            Some(counter) if counter.count() > 1 => {
                counter.decrement();
                return Ok(());
            }
            Some(_) => {}
            None => {
                warn!("function {} is not in step mode", func_index);
                return Ok(());
            }
        }

        let code = Rc::clone(&self.code);
        let mut segment = code.segment_mut();
        let mut writable = segment.writable(
            range.begin() as usize..range.end() as usize,
            "DebugState::decrement_step_mode_count",
        )?;
        self.step_mode_counters.remove(&func_index);
        debug!("function {} left step mode", func_index);

        for call_site in &metadata.call_sites {
            if call_site.kind() != CallSiteKind::Breakpoint {
                continue;
            }
            let offset = call_site.return_address_offset();
            if range.begin() <= offset && offset <= range.end() {
                let enabled = self
                    .breakpoint_sites
                    .contains_key(&call_site.line_or_bytecode());
                toggle_debug_trap(&mut writable, &metadata, offset, enabled);
            }
        }
        Ok(())
    }

    /// Whether a breakpoint trap was compiled for bytecode `offset`.
    pub fn has_breakpoint_trap_at_offset(&self, offset: u32) -> bool {
        if !self.metadata.debug_enabled {
            return false;
        }
        find_breakpoint_call_site(&self.metadata, offset).is_some()
    }

    /// Arms or disarms the breakpoint trap for bytecode `offset`. Does nothing
    /// for offsets without a trap, or while the enclosing function is in step
    /// mode.
    pub fn toggle_breakpoint_trap(&mut self, offset: u32, enabled: bool) {
        assert!(self.metadata.debug_enabled);
        let metadata = Rc::clone(&self.metadata);
        let call_site = match find_breakpoint_call_site(&metadata, offset) {
            Some(call_site) => call_site,
            None => return,
        };
        let trap = call_site.return_address_offset();

        let func_index = match self.code.lookup_range(trap) {
            Some(range) if range.is_function() => range.func_index(),
            _ => panic!("breakpoint trap at {:#x} is outside of a function", trap),
        };
        if self.step_mode_enabled(func_index) {
            return;
        }

        let mut segment = self.code.segment_mut();
        let mut writable = segment.writable_all("DebugState::toggle_breakpoint_trap");
        toggle_debug_trap(&mut writable, &metadata, trap, enabled);
    }

    /// Counts requests for frame traps. The first request arms every
    /// `EnterFrame` and `LeaveFrame` trap, the last release disarms them.
    pub fn adjust_enter_and_leave_frame_traps_state(&mut self, enabled: bool) {
        assert!(self.metadata.debug_enabled);
        let transition = if enabled {
            self.enter_and_leave_frame_traps.increment()
        } else {
            self.enter_and_leave_frame_traps.decrement()
        };
        if transition == Transition::Unchanged {
            return;
        }
        let still_enabled = self.enter_and_leave_frame_traps.is_active();
        debug!(
            "frame traps {}",
            if still_enabled { "armed" } else { "disarmed" }
        );

        let metadata = Rc::clone(&self.metadata);
        let mut segment = self.code.segment_mut();
        let mut writable = segment.writable_all("DebugState::adjust_enter_and_leave_frame_traps_state");
        for call_site in &metadata.call_sites {
            if call_site.kind().is_frame_trap() {
                toggle_debug_trap(
                    &mut writable,
                    &metadata,
                    call_site.return_address_offset(),
                    still_enabled,
                );
            }
        }
    }

    pub fn enter_frame_traps_enabled(&self) -> bool {
        self.enter_and_leave_frame_traps.is_active()
    }
}
