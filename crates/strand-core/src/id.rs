//! Fiber identifier type

use core::fmt;

/// Unique identifier for a fiber within one scheduler
///
/// Ids are handed out sequentially by the scheduler and never reused.
/// `0` is reserved for the main fiber (the thread that built the scheduler).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FiberId(u64);

impl FiberId {
    /// The main fiber
    pub const MAIN: FiberId = FiberId(0);

    /// Create a new FiberId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        FiberId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the main fiber
    #[inline]
    pub const fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for FiberId {
    #[inline]
    fn from(id: u64) -> Self {
        FiberId(id)
    }
}

impl From<FiberId> for u64 {
    #[inline]
    fn from(id: FiberId) -> Self {
        id.0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            write!(f, "FiberId(MAIN)")
        } else {
            write!(f, "FiberId({})", self.0)
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            write!(f, "main")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiber_id_basics() {
        let id = FiberId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert!(!id.is_main());
        assert!(FiberId::MAIN.is_main());
    }

    #[test]
    fn test_fiber_id_display() {
        assert_eq!(format!("{}", FiberId::MAIN), "main");
        assert_eq!(format!("{}", FiberId::new(3)), "3");
        assert_eq!(format!("{:?}", FiberId::new(3)), "FiberId(3)");
    }

    #[test]
    fn test_fiber_id_conversions() {
        let id: FiberId = 100u64.into();
        let raw: u64 = id.into();
        assert_eq!(raw, 100);
    }
}
