//! Guarded fiber stacks
//!
//! Platform-specific implementations handle the mapping itself.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
    } else {
        compile_error!("fiber stacks are only implemented for unix targets");
    }
}

use core::ptr::NonNull;

use strand_core::constants::PAGE_SIZE;

/// A mapped stack with an inaccessible guard region at its low end
///
/// ```text
///   base                base + guard                  base + len
///    | guard (PROT_NONE) |   usable stack (RW)  <- grows |  top
/// ```
///
/// Unmapped on drop.
pub struct Stack {
    base: NonNull<u8>,
    len: usize,
    guard: usize,
}

impl Stack {
    /// Upper end of the stack (stacks grow down)
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // SAFETY: base + len is the one-past-the-end address of the mapping
        unsafe { self.base.as_ptr().add(self.len) }
    }

    /// Lowest usable address
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    /// Usable bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.len - self.guard
    }

    #[inline]
    pub fn guard_size(&self) -> usize {
        self.guard
    }
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("guard", &self.guard)
            .finish()
    }
}

/// Round up to a whole number of pages
#[inline]
pub(crate) fn page_round(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1).map(|s| s & !(PAGE_SIZE - 1))
}
