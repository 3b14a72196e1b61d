//! Architecture-specific context switching
//!
//! Each architecture provides the same three items:
//!
//! - `Registers` - the callee-saved register file of a suspended context
//! - `init_context` - prepare a fresh stack so the first switch enters
//!   `entry_fn(entry_arg)` through a trampoline
//! - `context_switch` - save the current context, load another

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::{context_switch, init_context, Registers};
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::{context_switch, init_context, Registers};
    } else {
        compile_error!("strand-runtime supports x86_64 and aarch64 only");
    }
}

/// Entry point a fresh context starts in; must never return
pub type EntryFn = extern "C" fn(usize) -> !;
