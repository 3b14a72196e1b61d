//! x86_64 context switching implementation (System V AMD64)

use core::mem::offset_of;
use std::arch::naked_asm;

use strand_core::constants::STACK_ALIGN;

use super::EntryFn;

/// Callee-saved state of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

// Offsets hard-coded in the assembly below
const _: () = {
    assert!(offset_of!(Registers, rsp) == 0x00);
    assert!(offset_of!(Registers, rip) == 0x08);
    assert!(offset_of!(Registers, rbx) == 0x10);
    assert!(offset_of!(Registers, rbp) == 0x18);
    assert!(offset_of!(Registers, r12) == 0x20);
    assert!(offset_of!(Registers, r13) == 0x28);
    assert!(offset_of!(Registers, r14) == 0x30);
    assert!(offset_of!(Registers, r15) == 0x38);
};

/// Initialize a new context
///
/// Sets up the registers so that when switched to, execution begins in
/// the trampoline, which calls `entry_fn(entry_arg)`.
///
/// # Safety
///
/// `stack_top` must be the upper end of a writable stack that outlives
/// the context.
#[inline]
pub unsafe fn init_context(regs: &mut Registers, stack_top: *mut u8, entry_fn: EntryFn, entry_arg: usize) {
    // The trampoline `call`s the entry, which then sees rsp % 16 == 8
    // exactly as after any ABI-conforming call
    let aligned_sp = (stack_top as usize) & !(STACK_ALIGN - 1);

    *regs = Registers {
        rsp: aligned_sp as u64,
        rip: entry_trampoline as usize as u64,
        r12: entry_fn as usize as u64,
        r13: entry_arg as u64,
        ..Registers::default()
    };
}

/// First code run on a fresh stack
#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        // Terminate frame-pointer walks here
        "xor ebp, ebp",
        "call r12",
        "ud2",
    );
}

/// Perform a context switch
///
/// Saves callee-saved registers to `old` and loads them from `new`.
/// Returns when some other context switches back to `old`.
///
/// # Safety
///
/// `new` must hold a context produced by `init_context` or a previous
/// save, whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut Registers, _new: *const Registers) {
    naked_asm!(
        // Save callee-saved registers to old (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load callee-saved registers from new (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        // Jump to new RIP
        "jmp rax",
        // Resume point of a saved context
        "1:",
        "ret",
    );
}
