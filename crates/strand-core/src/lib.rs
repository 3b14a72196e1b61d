//! # strand-core
//!
//! Core types for the strand fiber scheduler.
//!
//! This crate is platform-agnostic and contains no context-switching or
//! reactor code; those live in `strand-runtime` and `strand-reactor`.
//!
//! ## Modules
//!
//! - `list` - Intrusive doubly-linked ring (the run queue)
//! - `id` - Fiber identifier type
//! - `state` - Fiber lifecycle state
//! - `error` - Error types
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable helpers

pub mod list;
pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use list::{Linked, Links, List};
pub use id::FiberId;
pub use state::FiberState;
pub use error::{MemoryError, SchedError, SchedResult};
pub use env::{env_get, env_get_bool, env_get_ms, env_get_opt, env_get_str, env_is_set};

/// Constants for fiber memory layout
pub mod constants {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "aarch64", target_vendor = "apple"))] {
            /// Page size assumed for guard pages
            pub const PAGE_SIZE: usize = 16 * 1024;
        } else {
            /// Page size assumed for guard pages
            pub const PAGE_SIZE: usize = 4096;
        }
    }

    /// Smallest usable fiber stack (excluding the guard)
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Required stack pointer alignment at a call boundary
    pub const STACK_ALIGN: usize = 16;
}
