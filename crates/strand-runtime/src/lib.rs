//! # strand-runtime
//!
//! Fibers and the cooperative scheduler for strand.
//!
//! This crate provides:
//! - Fiber stacks (mmap with a guard page)
//! - Context switching (architecture-specific assembly)
//! - The scheduler and its run queue
//! - The completion bridge that suspends a fiber on a reactor operation

pub mod config;
pub mod stack;
mod arch;
pub mod fiber;
pub mod completion;
pub mod scheduler;

// Re-exports
pub use completion::Completion;
pub use config::{ConfigError, SchedulerConfig};
pub use fiber::Fiber;
pub use scheduler::{Listener, SchedStats, Scheduler};
pub use stack::Stack;
