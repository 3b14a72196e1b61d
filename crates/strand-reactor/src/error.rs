//! Reactor error type and libuv-style status codes

use core::fmt;

use nix::errno::Errno;
use strand_core::error::SchedError;

/// Completion status handed to callbacks: `0` on success, a negative errno on failure
pub type Status = i32;

/// Result type for reactor operations
pub type ReactorResult<T> = Result<T, ReactorError>;

/// Synchronous reactor failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorError {
    /// Handle was never issued by this reactor or has already been released
    InvalidHandle,

    /// Operation does not apply to this kind of handle
    WrongKind {
        expected: &'static str,
    },

    /// Handle is closing; only the close callback remains
    Closing,

    /// A conflicting operation is already in flight on this handle
    AlreadyActive,

    /// Nothing to take right now (e.g. `accept` without a pending connection)
    WouldBlock,

    /// `run` was re-entered from inside a callback
    AlreadyRunning,

    /// The operating system refused the call
    Os(Errno),
}

impl ReactorError {
    /// Convert to a libuv-style negative status code
    pub fn status(&self) -> Status {
        let errno = match self {
            ReactorError::InvalidHandle => Errno::EBADF,
            ReactorError::WrongKind { .. } => Errno::EINVAL,
            ReactorError::Closing => Errno::EINVAL,
            ReactorError::AlreadyActive => Errno::EALREADY,
            ReactorError::WouldBlock => Errno::EAGAIN,
            ReactorError::AlreadyRunning => Errno::EBUSY,
            ReactorError::Os(e) => *e,
        };
        -(errno as i32)
    }
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::InvalidHandle => write!(f, "invalid or released handle"),
            ReactorError::WrongKind { expected } => write!(f, "handle is not a {} handle", expected),
            ReactorError::Closing => write!(f, "handle is closing"),
            ReactorError::AlreadyActive => write!(f, "operation already in progress"),
            ReactorError::WouldBlock => write!(f, "operation would block"),
            ReactorError::AlreadyRunning => write!(f, "reactor loop already running"),
            ReactorError::Os(e) => write!(f, "os error: {}", e),
        }
    }
}

impl std::error::Error for ReactorError {}

impl From<Errno> for ReactorError {
    fn from(e: Errno) -> Self {
        ReactorError::Os(e)
    }
}

impl From<ReactorError> for SchedError {
    fn from(e: ReactorError) -> Self {
        SchedError::Reactor(e.status())
    }
}

/// Status for an errno value
#[inline]
pub fn errno_status(e: Errno) -> Status {
    -(e as i32)
}

/// Human-readable rendering of a status code
pub fn describe(status: Status) -> String {
    if status == 0 {
        return "ok".to_string();
    }
    format!("{}", Errno::from_raw(status.saturating_neg()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_negative_errno() {
        assert_eq!(ReactorError::WouldBlock.status(), -libc::EAGAIN);
        assert_eq!(ReactorError::InvalidHandle.status(), -libc::EBADF);
        assert_eq!(ReactorError::Os(Errno::ECONNREFUSED).status(), -libc::ECONNREFUSED);
        assert_eq!(errno_status(Errno::ECANCELED), -libc::ECANCELED);
    }

    #[test]
    fn test_into_sched_error_keeps_status() {
        let e: SchedError = ReactorError::Closing.into();
        assert_eq!(e, SchedError::Reactor(-libc::EINVAL));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(0), "ok");
        assert!(describe(-libc::ECONNREFUSED).contains("ECONNREFUSED"));
    }
}
