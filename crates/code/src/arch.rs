use std::convert::TryInto;

/// Instruction set a code segment was generated for.
///
/// A debug trap slot is a single instruction that is either a NOP or a direct
/// call into a far-jump thunk. Both encodings have the same size, so a slot
/// can be toggled in place. The slot always ends at the call site's return
/// address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    X64,
    Arm64,
}

// nopl 0x0(%rax,%rax,1)
const X64_NOP5: [u8; 5] = [0x0f, 0x1f, 0x44, 0x00, 0x00];
const X64_CALL_REL32: u8 = 0xe8;
const X64_FILLER: [u8; 1] = [0x90];
// jmp *0(%rip) followed by the absolute target
const X64_FAR_JUMP: [u8; 14] = [
    0xff, 0x25, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const ARM64_NOP: [u8; 4] = [0x1f, 0x20, 0x03, 0xd5];
const ARM64_BL: u32 = 0x9400_0000;
const ARM64_BL_MASK: u32 = 0xfc00_0000;
// ldr x16, #8; br x16; followed by the absolute target
const ARM64_FAR_JUMP: [u8; 16] = [
    0x50, 0x00, 0x00, 0x58, 0x00, 0x02, 0x1f, 0xd6, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
const ARM64_BL_RANGE: i64 = 128 * 1024 * 1024;

impl Architecture {
    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Architecture::Arm64
        } else {
            Architecture::X64
        }
    }

    pub fn trap_size(self) -> usize {
        self.nop().len()
    }

    pub fn nop(self) -> &'static [u8] {
        match self {
            Architecture::X64 => &X64_NOP5,
            Architecture::Arm64 => &ARM64_NOP,
        }
    }

    pub fn alignment(self) -> usize {
        match self {
            Architecture::X64 => 1,
            Architecture::Arm64 => 4,
        }
    }

    /// One instruction of ordinary, non-patchable code.
    pub(crate) fn filler(self) -> &'static [u8] {
        match self {
            Architecture::X64 => &X64_FILLER,
            Architecture::Arm64 => &ARM64_NOP,
        }
    }

    pub(crate) fn far_jump_thunk(self) -> &'static [u8] {
        match self {
            Architecture::X64 => &X64_FAR_JUMP,
            Architecture::Arm64 => &ARM64_FAR_JUMP,
        }
    }

    pub(crate) fn write_nop(self, slot: &mut [u8]) {
        slot.copy_from_slice(self.nop());
    }

    pub(crate) fn write_call(self, slot: &mut [u8], return_address: usize, target: usize) {
        match self {
            Architecture::X64 => {
                let rel = target as i64 - return_address as i64;
                let rel: i32 = rel
                    .try_into()
                    .unwrap_or_else(|_| panic!("call target {:#x} out of rel32 range", target));
                slot[0] = X64_CALL_REL32;
                slot[1..].copy_from_slice(&rel.to_le_bytes());
            }
            Architecture::Arm64 => {
                let inst = return_address - slot.len();
                let delta = target as i64 - inst as i64;
                assert!(delta % 4 == 0, "misaligned call target {:#x}", target);
                assert!(
                    -ARM64_BL_RANGE <= delta && delta < ARM64_BL_RANGE,
                    "call target {:#x} out of bl range",
                    target
                );
                let word = ARM64_BL | (((delta >> 2) as u32) & !ARM64_BL_MASK);
                slot.copy_from_slice(&word.to_le_bytes());
            }
        }
    }

    /// Returns the call target encoded in `slot`, or `None` for a NOP.
    pub(crate) fn decode_call(self, slot: &[u8], return_address: usize) -> Option<usize> {
        match self {
            Architecture::X64 => {
                if slot[0] != X64_CALL_REL32 {
                    return None;
                }
                let rel = i32::from_le_bytes(slot[1..5].try_into().ok()?);
                Some((return_address as i64 + rel as i64) as usize)
            }
            Architecture::Arm64 => {
                let word = u32::from_le_bytes(slot.try_into().ok()?);
                if word & ARM64_BL_MASK != ARM64_BL {
                    return None;
                }
                let imm = ((word << 6) as i32) >> 6;
                let inst = return_address - slot.len();
                Some((inst as i64 + imm as i64 * 4) as usize)
            }
        }
    }

    pub(crate) fn is_nop(self, slot: &[u8]) -> bool {
        slot == self.nop()
    }
}
