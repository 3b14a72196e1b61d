//! # strand-reactor
//!
//! Single-threaded, callback-driven event loop in the style of libuv:
//! idle watchers, timers, handle close, and TCP listen/accept/connect,
//! driven by Linux epoll.
//!
//! Every asynchronous outcome is reported to a callback as a status:
//! `0` on success or a negative errno. Synchronous refusals are returned
//! as [`ReactorError`].
//!
//! ## Modules
//!
//! - `reactor` - The loop and all handle operations
//! - `handle` - Generational handle ids and per-handle state
//! - `timer` - Deadline-ordered timer queue
//! - `poll` - epoll backend
//! - `net` - Non-blocking socket helpers
//! - `error` - Error type and status codes

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod poll;
        mod net;
    } else {
        compile_error!("strand-reactor currently supports Linux (epoll) only");
    }
}

pub mod error;
pub mod handle;
pub mod reactor;
mod timer;

pub use error::{describe, errno_status, ReactorError, ReactorResult, Status};
pub use handle::{HandleId, IdleHandle, TcpHandle, TimerHandle};
pub use reactor::{Reactor, RunMode, DEFAULT_MAX_EVENTS};
