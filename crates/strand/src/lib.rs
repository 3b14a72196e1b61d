//! # strand - cooperative fibers over a reactor
//!
//! Stackful fibers that run on a single thread and suspend on timers,
//! handle closes and TCP operations instead of blocking it.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use strand::{Scheduler, SchedulerConfig};
//!
//! fn main() -> strand::SchedResult<()> {
//!     let sched = Scheduler::new(SchedulerConfig::from_env())?;
//!
//!     sched.create_fiber(|s| {
//!         println!("hello from fiber {}", s.current_id());
//!         s.sleep(Duration::from_millis(100));
//!         println!("woke up");
//!     })?;
//!
//!     sched.run()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User fibers                            │
//! │        yield_now(), sleep(), accept(), connect()            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ Completion (suspend / wake)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scheduler                              │
//! │     FIFO run queue, main fiber, context switch, reaping     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ idle tick
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Reactor                                │
//! │        timers, idle watchers, epoll sockets, closes         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use strand_core::{FiberId, FiberState, MemoryError, SchedError, SchedResult};

// Re-export kprint macros for debug logging
pub use strand_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use strand_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};

// Re-export env utilities
pub use strand_core::env::{env_get, env_get_bool, env_get_ms, env_get_opt, env_get_str, env_is_set};

// Reactor
pub use strand_reactor::{
    describe, HandleId, IdleHandle, Reactor, ReactorError, RunMode, Status, TcpHandle, TimerHandle,
};

// Runtime
pub use strand_runtime::{
    Completion, ConfigError, Fiber, Listener, SchedStats, Scheduler, SchedulerConfig,
};

/// Build a scheduler, run `entry` as its first fiber, and drive it to completion
///
/// Returns the scheduler's counters once every fiber has finished.
pub fn block_on<F>(config: SchedulerConfig, entry: F) -> SchedResult<SchedStats>
where
    F: FnOnce(&Scheduler) + 'static,
{
    let sched = Scheduler::new(config)?;
    sched.create_fiber(entry)?;
    sched.run()?;
    Ok(sched.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn test_block_on_runs_nested_fibers() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let stats = block_on(SchedulerConfig::new(), move |s| {
            for _ in 0..4 {
                let c = c.clone();
                s.create_fiber(move |s| {
                    s.sleep(Duration::from_millis(5));
                    c.set(c.get() + 1);
                })
                .unwrap();
            }
        })
        .unwrap();

        assert_eq!(count.get(), 4);
        assert_eq!(stats.created, 5);
        assert_eq!(stats.finished, 5);
    }

    #[test]
    fn test_block_on_rejects_bad_config() {
        let err = block_on(SchedulerConfig::new().listen_backlog(0), |_| {}).unwrap_err();
        assert!(matches!(err, SchedError::InvalidConfig(_)));
    }
}
