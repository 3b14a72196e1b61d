//! aarch64 context switching implementation (AAPCS64)

use core::mem::offset_of;
use std::arch::naked_asm;

use strand_core::constants::STACK_ALIGN;

use super::EntryFn;

/// Callee-saved state of a suspended context
///
/// x19-x28, the frame pointer, the link register, sp and the low halves
/// of v8-v15.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub sp: u64,
    pub lr: u64,
    pub x19_x28: [u64; 10],
    pub fp: u64,
    pub d8_d15: [u64; 8],
}

const _: () = {
    assert!(offset_of!(Registers, sp) == 0x00);
    assert!(offset_of!(Registers, lr) == 0x08);
    assert!(offset_of!(Registers, x19_x28) == 0x10);
    assert!(offset_of!(Registers, fp) == 0x60);
    assert!(offset_of!(Registers, d8_d15) == 0x68);
};

/// Initialize a new context
///
/// The first switch "returns" into the trampoline, which branches to
/// `entry_fn(entry_arg)`.
///
/// # Safety
///
/// `stack_top` must be the upper end of a writable stack that outlives
/// the context.
#[inline]
pub unsafe fn init_context(regs: &mut Registers, stack_top: *mut u8, entry_fn: EntryFn, entry_arg: usize) {
    let aligned_sp = (stack_top as usize) & !(STACK_ALIGN - 1);

    let mut x19_x28 = [0u64; 10];
    x19_x28[0] = entry_fn as usize as u64;
    x19_x28[1] = entry_arg as u64;

    *regs = Registers {
        sp: aligned_sp as u64,
        lr: entry_trampoline as usize as u64,
        x19_x28,
        ..Registers::default()
    };
}

#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov x0, x20",
        "mov x29, xzr",
        "mov x30, xzr",
        "blr x19",
        "brk #1",
    );
}

/// Perform a context switch
///
/// Saves callee-saved registers to `old` and loads them from `new`.
///
/// # Safety
///
/// `new` must hold a context produced by `init_context` or a previous
/// save, whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // Save to old (x0); lr is where this context resumes
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "str x30, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "str x29, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Load from new (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x30, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldr x29, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ret",
    );
}
