use crate::error::{Error, Result};
use crate::state::DebugState;
use log::debug;
use std::collections::hash_map::Entry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DebuggerId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

/// A breakpoint set by a debugger. The ids refer to host objects that the
/// breakpoint does not own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub debugger: DebuggerId,
    pub instance: InstanceId,
    pub handler: HandlerId,
}

/// All breakpoints set at one bytecode offset.
#[derive(Debug)]
pub struct WasmBreakpointSite {
    offset: u32,
    breakpoints: Vec<Breakpoint>,
}

impl WasmBreakpointSite {
    fn new(offset: u32) -> Self {
        Self {
            offset,
            breakpoints: Vec::new(),
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

/// Releases breakpoint records and sites on behalf of the host.
pub trait FreeOp {
    fn free_breakpoint(&mut self, _breakpoint: Breakpoint) {}
    fn free_site(&mut self, _site: WasmBreakpointSite) {}
}

#[derive(Default)]
pub struct DefaultFreeOp;

impl FreeOp for DefaultFreeOp {}

impl DebugState {
    pub fn get_or_create_breakpoint_site(&mut self, offset: u32) -> Result<&mut WasmBreakpointSite> {
        self.reserve_breakpoints(offset, 0)
    }

    /// Site at `offset` with room for `additional` more breakpoints. A new
    /// site is only inserted once its room is reserved.
    fn reserve_breakpoints(
        &mut self,
        offset: u32,
        additional: usize,
    ) -> Result<&mut WasmBreakpointSite> {
        debug_assert!(self.has_breakpoint_trap_at_offset(offset));
        if !self.breakpoint_sites.contains_key(&offset) {
            self.breakpoint_sites.try_reserve(1)?;
        }
        match self.breakpoint_sites.entry(offset) {
            Entry::Occupied(entry) => {
                let site = entry.into_mut();
                site.breakpoints.try_reserve(additional)?;
                Ok(site)
            }
            Entry::Vacant(entry) => {
                let mut site = WasmBreakpointSite::new(offset);
                site.breakpoints.try_reserve(additional)?;
                debug!("create breakpoint site at {:#x}", offset);
                Ok(entry.insert(site))
            }
        }
    }

    pub fn has_breakpoint_site(&self, offset: u32) -> bool {
        self.breakpoint_sites.contains_key(&offset)
    }

    pub fn breakpoint_site(&self, offset: u32) -> Option<&WasmBreakpointSite> {
        self.breakpoint_sites.get(&offset)
    }

    /// Removes the site at `offset` and hands it to `free_op`. The trap is
    /// left as it is.
    ///
    /// Panics if there is no site at `offset`.
    pub fn destroy_breakpoint_site(&mut self, free_op: &mut dyn FreeOp, offset: u32) {
        let site = match self.breakpoint_sites.remove(&offset) {
            Some(site) => site,
            None => panic!("no breakpoint site at {:#x}", offset),
        };
        debug!("destroy breakpoint site at {:#x}", offset);
        free_op.free_site(site);
    }

    /// Sets a breakpoint at bytecode `offset`, arming its trap if the site
    /// had no breakpoint yet.
    pub fn set_breakpoint(
        &mut self,
        offset: u32,
        debugger: DebuggerId,
        instance: InstanceId,
        handler: HandlerId,
    ) -> Result<BreakpointId> {
        if !self.has_breakpoint_trap_at_offset(offset) {
            return Err(Error::NoBreakpointTrap(offset));
        }
        let id = BreakpointId(self.next_breakpoint_id);
        let site = self.reserve_breakpoints(offset, 1)?;
        site.breakpoints.push(Breakpoint {
            id,
            debugger,
            instance,
            handler,
        });
        let first = site.breakpoints.len() == 1;
        self.next_breakpoint_id += 1;
        if first {
            self.toggle_breakpoint_trap(offset, true);
        }
        Ok(id)
    }

    /// Destroys one breakpoint. When its site becomes empty the trap is
    /// disarmed and the site destroyed. Returns false if there is no such
    /// breakpoint.
    pub fn destroy_breakpoint(
        &mut self,
        free_op: &mut dyn FreeOp,
        offset: u32,
        id: BreakpointId,
    ) -> bool {
        let site = match self.breakpoint_sites.get_mut(&offset) {
            Some(site) => site,
            None => return false,
        };
        let position = match site.breakpoints.iter().position(|bp| bp.id == id) {
            Some(position) => position,
            None => return false,
        };
        let breakpoint = site.breakpoints.remove(position);
        let now_empty = site.is_empty();
        free_op.free_breakpoint(breakpoint);
        if now_empty {
            self.toggle_breakpoint_trap(offset, false);
            self.destroy_breakpoint_site(free_op, offset);
        }
        true
    }

    /// Destroys every breakpoint of `instance`, optionally restricted to one
    /// debugger and one handler.
    pub fn clear_breakpoints_in(
        &mut self,
        free_op: &mut dyn FreeOp,
        instance: InstanceId,
        debugger: Option<DebuggerId>,
        handler: Option<HandlerId>,
    ) -> Result<()> {
        // Destroying breakpoints removes sites, so walk a copy of the offsets.
        let mut offsets = Vec::new();
        offsets.try_reserve_exact(self.breakpoint_sites.len())?;
        offsets.extend(self.breakpoint_sites.keys().copied());
        offsets.sort_unstable();

        let mut doomed = Vec::new();
        for offset in offsets {
            doomed.clear();
            if let Some(site) = self.breakpoint_sites.get(&offset) {
                for bp in &site.breakpoints {
                    if bp.instance == instance
                        && debugger.map_or(true, |debugger| bp.debugger == debugger)
                        && handler.map_or(true, |handler| bp.handler == handler)
                    {
                        doomed.try_reserve(1)?;
                        doomed.push(bp.id);
                    }
                }
            }
            for &id in &doomed {
                self.destroy_breakpoint(free_op, offset, id);
            }
        }
        Ok(())
    }
}
