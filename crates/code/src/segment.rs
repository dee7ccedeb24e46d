use crate::arch::Architecture;
use crate::error::{Error, Result};
use log::{trace, warn};
use std::ffi::c_void;
use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    ReadExecute,
    ReadWrite,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub flushes: usize,
    pub last: Option<Range<usize>>,
}

/// Machine code of one module.
///
/// The bytes are executable outside of a [`WritableCode`] scope and may only be
/// mutated through one.
pub struct CodeSegment {
    bytes: Vec<u8>,
    arch: Architecture,
    protection: Protection,
    stats: FlushStats,
}

impl CodeSegment {
    pub fn new(arch: Architecture, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            arch,
            protection: Protection::ReadExecute,
            stats: FlushStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn flush_stats(&self) -> &FlushStats {
        &self.stats
    }

    fn slot_range(&self, return_address: usize) -> Range<usize> {
        let size = self.arch.trap_size();
        assert!(
            size <= return_address && return_address <= self.bytes.len(),
            "trap slot ending at {:#x} is outside of the code segment",
            return_address
        );
        (return_address - size)..return_address
    }

    /// Target of the call patched into the trap slot ending at
    /// `return_address`, if the slot is armed.
    pub fn call_target(&self, return_address: usize) -> Option<usize> {
        let slot = self.slot_range(return_address);
        self.arch.decode_call(&self.bytes[slot], return_address)
    }

    pub fn is_trap_armed(&self, return_address: usize) -> bool {
        self.call_target(return_address).is_some()
    }

    /// Opens a scope in which `range` may be patched.
    pub fn writable(&mut self, range: Range<usize>, reason: &'static str) -> Result<WritableCode<'_>> {
        if range.start > range.end || range.end > self.bytes.len() {
            return Err(Error::OutOfBounds {
                begin: range.start,
                end: range.end,
                len: self.bytes.len(),
            });
        }
        trace!("{}: writable {:#x}..{:#x}", reason, range.start, range.end);
        self.protection = Protection::ReadWrite;
        Ok(WritableCode {
            segment: self,
            range,
            dirty: None,
            reason,
        })
    }

    pub fn writable_all(&mut self, reason: &'static str) -> WritableCode<'_> {
        let len = self.bytes.len();
        trace!("{}: writable 0x0..{:#x}", reason, len);
        self.protection = Protection::ReadWrite;
        WritableCode {
            segment: self,
            range: 0..len,
            dirty: None,
            reason,
        }
    }

    fn flush_icache(&mut self, range: Range<usize>, reason: &'static str) {
        let bytes = &self.bytes[range.clone()];
        // SAFETY: the pointer and length describe a live, initialized slice.
        let cleared = unsafe {
            wasmtime_jit_icache_coherence::clear_cache(bytes.as_ptr() as *const c_void, bytes.len())
        };
        if cleared.is_err() || wasmtime_jit_icache_coherence::pipeline_flush_mt().is_err() {
            warn!("{}: failed to flush instruction cache", reason);
        }
        trace!("{}: flushed {:#x}..{:#x}", reason, range.start, range.end);
        self.stats.flushes += 1;
        self.stats.last = Some(range);
    }
}

/// Write access to part of a [`CodeSegment`].
///
/// Dropping the scope flushes the instruction cache over every byte patched
/// through it and then makes the segment executable again.
pub struct WritableCode<'a> {
    segment: &'a mut CodeSegment,
    range: Range<usize>,
    dirty: Option<Range<usize>>,
    reason: &'static str,
}

impl<'a> WritableCode<'a> {
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn arch(&self) -> Architecture {
        self.segment.arch
    }

    fn slot(&mut self, return_address: usize) -> Range<usize> {
        let slot = self.segment.slot_range(return_address);
        assert!(
            self.range.start <= slot.start && slot.end <= self.range.end,
            "{}: trap slot {:#x}..{:#x} is outside of the writable range {:#x}..{:#x}",
            self.reason,
            slot.start,
            slot.end,
            self.range.start,
            self.range.end
        );
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(slot.start)..dirty.end.max(slot.end),
            None => slot.clone(),
        });
        slot
    }

    /// Turns the NOP ending at `return_address` into a call to `target`.
    pub fn patch_nop_to_call(&mut self, return_address: usize, target: usize) {
        let slot = self.slot(return_address);
        let arch = self.segment.arch;
        let bytes = &mut self.segment.bytes[slot];
        debug_assert!(
            arch.is_nop(bytes) || arch.decode_call(bytes, return_address).is_some(),
            "not a debug trap slot at {:#x}",
            return_address
        );
        arch.write_call(bytes, return_address, target);
    }

    /// Turns the call ending at `return_address` back into a NOP.
    pub fn patch_call_to_nop(&mut self, return_address: usize) {
        let slot = self.slot(return_address);
        let arch = self.segment.arch;
        let bytes = &mut self.segment.bytes[slot];
        debug_assert!(
            arch.is_nop(bytes) || arch.decode_call(bytes, return_address).is_some(),
            "not a debug trap slot at {:#x}",
            return_address
        );
        arch.write_nop(bytes);
    }
}

impl<'a> Drop for WritableCode<'a> {
    fn drop(&mut self) {
        if let Some(dirty) = self.dirty.take() {
            self.segment.flush_icache(dirty, self.reason);
        }
        self.segment.protection = Protection::ReadExecute;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_with_slot() -> CodeSegment {
        let mut bytes = vec![0x90; 32];
        bytes[10..15].copy_from_slice(Architecture::X64.nop());
        CodeSegment::new(Architecture::X64, bytes)
    }

    #[test]
    fn scope_flushes_only_when_dirty() {
        let mut segment = segment_with_slot();
        {
            let _scope = segment.writable(0..32, "test").unwrap();
        }
        assert_eq!(segment.flush_stats().flushes, 0);
        {
            let mut scope = segment.writable(8..20, "test").unwrap();
            scope.patch_nop_to_call(15, 0);
        }
        assert_eq!(segment.flush_stats().flushes, 1);
        assert_eq!(segment.flush_stats().last, Some(10..15));
        assert_eq!(segment.protection(), Protection::ReadExecute);
        assert_eq!(segment.call_target(15), Some(0));
    }

    #[test]
    fn toggling_back_restores_bytes() {
        let mut segment = segment_with_slot();
        let before = segment.bytes().to_vec();
        {
            let mut scope = segment.writable_all("test");
            scope.patch_nop_to_call(15, 30);
            scope.patch_call_to_nop(15);
        }
        assert_eq!(segment.bytes(), &before[..]);
        assert!(!segment.is_trap_armed(15));
    }

    #[test]
    fn writable_rejects_out_of_bounds_range() {
        let mut segment = segment_with_slot();
        assert!(segment.writable(0..33, "test").is_err());
    }

    #[test]
    #[should_panic]
    fn patch_outside_scope_range_panics() {
        let mut segment = segment_with_slot();
        let mut scope = segment.writable(0..12, "test").unwrap();
        scope.patch_nop_to_call(15, 0);
    }
}
