//! Error types for the strand scheduler

use core::fmt;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in scheduler operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// A suspend point was reached outside of any fiber
    NotInFiber,

    /// `run()` was entered while the loop is already being driven
    AlreadyRunning,

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Stack allocation/protection failed
    MemoryError(MemoryError),

    /// The reactor refused an operation synchronously (negative errno)
    Reactor(i32),

    /// An asynchronous operation completed with a failure status (negative errno)
    Io(i32),

    /// The reactor ran out of work while fibers were still blocked
    Stalled {
        /// Number of fibers that can never be resumed
        fibers: usize,
    },
}

/// Render a libuv-style status (`0` or a negative errno)
fn describe_status(f: &mut fmt::Formatter<'_>, status: i32) -> fmt::Result {
    let err = std::io::Error::from_raw_os_error(status.saturating_neg());
    write!(f, "{} ({})", err, status)
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::NotInFiber => write!(f, "not running inside a fiber"),
            SchedError::AlreadyRunning => write!(f, "scheduler loop already running"),
            SchedError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            SchedError::MemoryError(e) => write!(f, "memory error: {}", e),
            SchedError::Reactor(status) => {
                write!(f, "reactor error: ")?;
                describe_status(f, *status)
            }
            SchedError::Io(status) => {
                write!(f, "I/O error: ")?;
                describe_status(f, *status)
            }
            SchedError::Stalled { fibers } => {
                write!(f, "{} fiber(s) blocked with no pending reactor work", fibers)
            }
        }
    }
}

impl std::error::Error for SchedError {}

impl SchedError {
    /// Status code carried by reactor/I/O errors, if any
    pub fn status(&self) -> Option<i32> {
        match self {
            SchedError::Reactor(s) | SchedError::Io(s) => Some(*s),
            _ => None,
        }
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,

    /// munmap failed
    UnmapFailed,

    /// Requested stack size is zero or overflows
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::UnmapFailed => write!(f, "stack unmap failed"),
            MemoryError::InvalidSize => write!(f, "invalid stack size"),
        }
    }
}

impl From<MemoryError> for SchedError {
    fn from(e: MemoryError) -> Self {
        SchedError::MemoryError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SchedError::NotInFiber;
        assert_eq!(format!("{}", e), "not running inside a fiber");

        let e = SchedError::MemoryError(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: stack allocation failed");

        let e = SchedError::Stalled { fibers: 2 };
        assert_eq!(format!("{}", e), "2 fiber(s) blocked with no pending reactor work");
    }

    #[test]
    fn test_status_display_mentions_code() {
        let e = SchedError::Io(-111);
        let text = format!("{}", e);
        assert!(text.starts_with("I/O error: "));
        assert!(text.ends_with("(-111)"));
        assert_eq!(e.status(), Some(-111));
        assert_eq!(SchedError::NotInFiber.status(), None);
    }

    #[test]
    fn test_error_conversion() {
        let mem_err = MemoryError::InvalidSize;
        let sched_err: SchedError = mem_err.into();
        assert!(matches!(sched_err, SchedError::MemoryError(MemoryError::InvalidSize)));
    }
}
