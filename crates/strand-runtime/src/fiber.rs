//! Fibers: stackful execution contexts
//!
//! A fiber is heap-allocated and addressed by raw pointer for its whole
//! life: the run queue links it intrusively, completion bridges point at
//! it, and its saved registers are written by the context switch. The
//! main fiber wraps the thread that created the scheduler and owns no
//! stack of its own.

use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::ptr::{self, NonNull};
use std::panic::{self, AssertUnwindSafe};

use strand_core::error::SchedResult;
use strand_core::list::Links;
use strand_core::{kerror, ktrace, FiberId, FiberState};

use crate::arch::{self, Registers};
use crate::scheduler::Scheduler;
use crate::stack::Stack;

/// Deferred body of a fiber, run once on its own stack
pub(crate) type Entry = Box<dyn FnOnce(&Scheduler)>;

/// A stackful execution context
#[repr(C)]
pub struct Fiber {
    pub(crate) links: Links,
    regs: UnsafeCell<Registers>,
    stack: Option<Stack>,
    entry: Cell<Option<Entry>>,
    owner: Cell<*const Scheduler>,
    id: FiberId,
    state: Cell<FiberState>,
}

strand_core::linked!(Fiber, links);

impl Fiber {
    /// Adopt the calling thread of control as the main fiber
    ///
    /// Its registers are only written when it is first switched away from.
    pub(crate) fn main() -> Fiber {
        Fiber {
            links: Links::new(),
            regs: UnsafeCell::new(Registers::default()),
            stack: None,
            entry: Cell::new(None),
            owner: Cell::new(ptr::null()),
            id: FiberId::MAIN,
            state: Cell::new(FiberState::Running),
        }
    }

    /// Allocate a fiber whose first switch runs `entry` on a fresh stack
    ///
    /// Nothing is returned unless the stack was mapped and the context
    /// prepared.
    pub(crate) fn create(
        owner: &Scheduler,
        id: FiberId,
        entry: Entry,
        stack_size: usize,
        guard_size: usize,
    ) -> SchedResult<Box<Fiber>> {
        let stack = Stack::new(stack_size, guard_size)?;
        let top = stack.top();

        let fiber = Box::new(Fiber {
            links: Links::new(),
            regs: UnsafeCell::new(Registers::default()),
            stack: Some(stack),
            entry: Cell::new(Some(entry)),
            owner: Cell::new(owner as *const Scheduler),
            id,
            state: Cell::new(FiberState::Ready),
        });

        // The trampoline receives the fiber's (now stable) heap address
        let arg = &*fiber as *const Fiber as usize;
        // SAFETY: the stack is owned by the fiber and lives as long as the context
        unsafe { arch::init_context(&mut *fiber.regs.get(), top, fiber_entry, arg) };
        ktrace!("fiber {} prepared, stack top {:p}", id, top);
        Ok(fiber)
    }

    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> FiberState {
        self.state.get()
    }

    #[inline]
    pub(crate) fn set_state(&self, state: FiberState) {
        self.state.set(state);
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.id.is_main()
    }

    /// Whether this fiber currently sits in a run queue
    #[inline]
    pub fn is_queued(&self) -> bool {
        self.links.is_linked()
    }

    #[inline]
    pub(crate) fn set_owner(&self, owner: *const Scheduler) {
        self.owner.set(owner);
    }

    /// Usable stack bytes (0 for the main fiber)
    pub fn stack_size(&self) -> usize {
        self.stack.as_ref().map_or(0, Stack::size)
    }

    #[inline]
    pub(crate) fn regs(&self) -> *mut Registers {
        self.regs.get()
    }

    /// Switch from `self` to `to`; returns when `self` is resumed
    ///
    /// # Safety
    ///
    /// `self` must be the context currently executing and `to` a
    /// suspended or never-started context whose stack is still mapped.
    #[inline]
    pub(crate) unsafe fn switch_to(&self, to: &Fiber) {
        arch::context_switch(self.regs(), to.regs());
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("queued", &self.links.is_linked())
            .field("stack", &self.stack)
            .finish()
    }
}

/// First Rust code on every fiber stack
///
/// Runs the entry under `catch_unwind`, then retires the fiber. Never
/// returns: the retired fiber's stack is released by whichever context
/// runs next.
extern "C" fn fiber_entry(arg: usize) -> ! {
    // SAFETY: `arg` is the address handed to init_context by Fiber::create,
    // and the fiber is not freed before it retires
    let fiber = unsafe { &*(arg as *const Fiber) };
    let sched = unsafe { &*fiber.owner.get() };

    // Landed here from a switch; the previous context may have just retired
    sched.reap();

    if let Some(entry) = fiber.entry.take() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry(sched))) {
            kerror!("fiber {} panicked", fiber.id);
            sched.stash_panic(payload);
        }
    }

    sched.retire(NonNull::from(fiber))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use strand_core::constants::PAGE_SIZE;

    #[test]
    fn test_main_fiber() {
        let main = Fiber::main();
        assert!(main.is_main());
        assert_eq!(main.state(), FiberState::Running);
        assert_eq!(main.stack_size(), 0);
        assert!(!main.is_queued());
    }

    #[test]
    fn test_create_prepares_context() {
        let sched = Scheduler::new(SchedulerConfig::new()).unwrap();
        let fiber = Fiber::create(&sched, FiberId::new(42), Box::new(|_| {}), 64 * 1024, PAGE_SIZE)
            .unwrap();

        assert_eq!(fiber.id(), FiberId::new(42));
        assert_eq!(fiber.state(), FiberState::Ready);
        assert_eq!(fiber.stack_size(), 64 * 1024);
        assert!(!fiber.is_queued());
        let regs = unsafe { *fiber.regs() };
        assert_ne!(regs, Registers::default());
    }

    #[test]
    fn test_create_rejects_bad_stack() {
        let sched = Scheduler::new(SchedulerConfig::new()).unwrap();
        let err = Fiber::create(&sched, FiberId::new(1), Box::new(|_| {}), 0, PAGE_SIZE).unwrap_err();
        assert!(matches!(err, strand_core::SchedError::MemoryError(_)));
    }
}
