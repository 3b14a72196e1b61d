//! Fiber lifecycle state

use core::fmt;

/// State of a fiber
///
/// ```text
/// Ready ──pop──▶ Running ──sched(last)──▶ Blocked
///   ▲               │                        │
///   └──yield_now────┘                        │
///   └──────────── completion callback ───────┘
///                   Running ──entry returns──▶ Finished
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FiberState {
    /// In the run queue, waiting for a switch
    Ready = 0,

    /// Currently executing (exactly one fiber per scheduler)
    Running = 1,

    /// Suspended on an asynchronous operation, not queued
    Blocked = 2,

    /// Entry action returned; awaiting reclamation
    Finished = 3,
}

impl FiberState {
    /// Check if this state allows the fiber to be switched into
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, FiberState::Ready)
    }

    /// Check if this fiber has terminated
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, FiberState::Finished)
    }
}

impl From<u8> for FiberState {
    fn from(v: u8) -> Self {
        match v {
            0 => FiberState::Ready,
            1 => FiberState::Running,
            2 => FiberState::Blocked,
            _ => FiberState::Finished,
        }
    }
}

impl From<FiberState> for u8 {
    fn from(state: FiberState) -> u8 {
        state as u8
    }
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberState::Ready => write!(f, "READY"),
            FiberState::Running => write!(f, "RUNNING"),
            FiberState::Blocked => write!(f, "BLOCKED"),
            FiberState::Finished => write!(f, "FINISHED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(FiberState::Ready.is_runnable());
        assert!(!FiberState::Running.is_runnable());
        assert!(!FiberState::Blocked.is_runnable());

        assert!(FiberState::Finished.is_terminated());
        assert!(!FiberState::Blocked.is_terminated());
    }

    #[test]
    fn test_state_roundtrip_u8() {
        for state in [
            FiberState::Ready,
            FiberState::Running,
            FiberState::Blocked,
            FiberState::Finished,
        ] {
            assert_eq!(FiberState::from(u8::from(state)), state);
        }
    }
}
