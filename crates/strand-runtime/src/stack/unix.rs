//! Unix stack implementation using mmap

use core::ptr::{self, NonNull};

use nix::errno::Errno;
use strand_core::error::{MemoryError, SchedResult};
use strand_core::{kerror, ktrace};

use super::{page_round, Stack};

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        const MAP_FLAGS: libc::c_int =
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK;
    } else {
        const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    }
}

impl Stack {
    /// Map `stack_size` usable bytes (rounded up to pages) plus a
    /// `guard_size` PROT_NONE region below them
    pub fn new(stack_size: usize, guard_size: usize) -> SchedResult<Stack> {
        if stack_size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let usable = page_round(stack_size).ok_or(MemoryError::InvalidSize)?;
        let guard = page_round(guard_size).ok_or(MemoryError::InvalidSize)?;
        let len = usable.checked_add(guard).ok_or(MemoryError::InvalidSize)?;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_FLAGS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            kerror!("stack mmap of {} bytes failed: {}", len, Errno::last());
            return Err(MemoryError::AllocationFailed.into());
        }

        if guard > 0 {
            // Guard at the low end: overflow faults instead of corrupting memory
            let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
            if ret != 0 {
                kerror!("stack guard mprotect failed: {}", Errno::last());
                unsafe { libc::munmap(base, len) };
                return Err(MemoryError::ProtectionFailed.into());
            }
        }

        let base = NonNull::new(base as *mut u8).ok_or(MemoryError::AllocationFailed)?;
        ktrace!("stack mapped at {:p} ({} + {} guard)", base, usable, guard);
        Ok(Stack { base, len, guard })
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len) };
        if ret != 0 {
            kerror!("stack munmap failed: {}", Errno::last());
        }
    }
}
