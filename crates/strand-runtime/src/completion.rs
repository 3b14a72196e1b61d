//! Completion bridge: suspend a fiber until a reactor callback fires
//!
//! The protocol:
//!
//! 1. A fiber builds a `Completion` on its own stack and lends a callback
//!    referencing it to the reactor.
//! 2. `wait()` arms the bridge and gives up the CPU (`sched(true)`).
//! 3. The reactor calls `complete(status)`. The first call records the
//!    status and, if the bridge is armed and the fiber is neither queued
//!    nor running, puts the fiber at the tail of the run queue. Later calls
//!    from other sources are ignored, so the fiber is enqueued and resumed
//!    exactly once and sees the first result.
//! 4. Resumed, the fiber disarms and reads the status.
//!
//! The bridge must outlive every invocation of the lent callback. One-shot
//! operations guarantee that by waiting for the callback; repeating ones
//! must be stopped before the bridge goes out of scope.

use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

use strand_core::{ktrace, FiberId, FiberState};
use strand_reactor::Status;

use crate::fiber::Fiber;
use crate::scheduler::Scheduler;

/// Bridge between one suspended fiber and one asynchronous result
pub struct Completion {
    owner: NonNull<Scheduler>,
    fiber: NonNull<Fiber>,
    status: Cell<Status>,
    armed: Cell<bool>,
    fired: Cell<bool>,
}

impl Completion {
    /// Bind a bridge to the calling fiber
    ///
    /// # Panics
    ///
    /// On the main fiber: the main context cannot suspend.
    pub fn new(sched: &Scheduler) -> Completion {
        assert!(
            sched.in_fiber(),
            "suspend point reached on the main fiber; only fibers may block"
        );
        Completion {
            owner: NonNull::from(sched),
            fiber: sched.current_ptr(),
            status: Cell::new(0),
            armed: Cell::new(false),
            fired: Cell::new(false),
        }
    }

    /// Suspend until `complete` is called; returns the recorded status
    ///
    /// Returns at once if the result already arrived.
    pub fn wait(&self) -> Status {
        // SAFETY: the scheduler outlives every fiber it runs
        let sched = unsafe { self.owner.as_ref() };
        assert!(
            sched.current_ptr() == self.fiber,
            "completion waited on by a fiber other than its owner"
        );

        if !self.fired.get() {
            self.armed.set(true);
            unsafe { self.fiber.as_ref() }.set_state(FiberState::Blocked);
            sched.sched(true);
            self.armed.set(false);
        }
        self.status.get()
    }

    /// Record `status` and make the waiting fiber runnable
    ///
    /// Returns whether this call enqueued the fiber.
    pub fn complete(&self, status: Status) -> bool {
        if self.fired.replace(true) {
            ktrace!("completion for fiber {}: late status {} ignored", self.fiber_id(), status);
            return false;
        }
        self.status.set(status);
        if !self.armed.get() {
            return false;
        }
        let sched = unsafe { self.owner.as_ref() };
        let woke = sched.wake(self.fiber);
        ktrace!("completion for fiber {}: status={} woke={}", self.fiber_id(), status, woke);
        woke
    }

    /// Last recorded status (0 until completed)
    #[inline]
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Whether `complete` has been called at least once
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.fired.get()
    }

    pub fn fiber_id(&self) -> FiberId {
        unsafe { self.fiber.as_ref() }.id()
    }

    /// Callback forwarding a status to this bridge
    ///
    /// # Safety
    ///
    /// The bridge must outlive every invocation of the returned callback.
    pub unsafe fn callback(&self) -> impl Fn(Status) + Copy + 'static {
        let this = NonNull::from(self);
        move |status| {
            // SAFETY: guaranteed by the caller of `callback`
            unsafe { this.as_ref() }.complete(status);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("fiber", &self.fiber_id())
            .field("status", &self.status.get())
            .field("armed", &self.armed.get())
            .field("fired", &self.fired.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn scheduler() -> std::pin::Pin<Box<Scheduler>> {
        Scheduler::new(SchedulerConfig::new()).unwrap()
    }

    #[test]
    #[should_panic(expected = "main fiber")]
    fn test_new_on_main_panics() {
        let sched = scheduler();
        let _ = Completion::new(&sched);
    }

    #[test]
    #[should_panic(expected = "other than its owner")]
    fn test_wait_from_foreign_fiber_panics() {
        let sched = scheduler();
        let slot: Rc<Cell<Option<NonNull<Completion>>>> = Rc::new(Cell::new(None));

        let s1 = slot.clone();
        sched
            .create_fiber(move |s| {
                let completion = Completion::new(s);
                s1.set(Some(NonNull::from(&completion)));
                s.yield_now();
                s1.set(None);
            })
            .unwrap();
        let s2 = slot.clone();
        sched
            .create_fiber(move |_| {
                // Owner is suspended in yield_now, so the bridge is still alive
                let completion = s2.get().unwrap();
                unsafe { completion.as_ref() }.wait();
            })
            .unwrap();

        // The fiber's panic is re-raised here
        let _ = sched.run();
    }

    #[test]
    fn test_two_sources_wake_once() {
        let sched = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();

        sched
            .create_fiber(move |s| {
                let reactor = s.reactor();
                let timer = reactor.timer_init();
                let idle = reactor.idle_init();
                let fires = Rc::new(Cell::new(0u32));
                let completion = Completion::new(s);
                let wakeups = s.stats().wakeups;

                // Both sources fire before the fiber gets to run again:
                // the close in this tick's close phase, the timer at the
                // start of the next tick
                let cb = unsafe { completion.callback() };
                let f = fires.clone();
                reactor
                    .timer_start(timer, Duration::ZERO, Duration::ZERO, move || {
                        f.set(f.get() + 1);
                        cb(1);
                    })
                    .unwrap();
                let f = fires.clone();
                reactor
                    .close(idle, move || {
                        f.set(f.get() + 1);
                        cb(2);
                    })
                    .unwrap();

                let status = completion.wait();
                l.borrow_mut().push(format!("resumed:{}", status));
                l.borrow_mut().push(format!("fires:{}", fires.get()));
                l.borrow_mut().push(format!("wakeups:{}", s.stats().wakeups - wakeups));
                assert_eq!(completion.status(), 2);

                s.close(timer).unwrap();
            })
            .unwrap();

        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["resumed:2", "fires:2", "wakeups:1"]);
    }

    #[test]
    fn test_complete_before_wait_returns_immediately() {
        let sched = scheduler();
        let seen = Rc::new(Cell::new(None));
        let s2 = seen.clone();
        sched
            .create_fiber(move |s| {
                let completion = Completion::new(s);
                assert!(!completion.complete(-7));
                assert!(completion.is_complete());
                let switches = s.stats().switches;
                s2.set(Some(completion.wait()));
                assert_eq!(s.stats().switches, switches);
            })
            .unwrap();
        sched.run().unwrap();
        assert_eq!(seen.get(), Some(-7));
    }

    #[test]
    fn test_stalled_fiber_resumed_by_late_completion() {
        let sched = scheduler();
        let slot: Rc<Cell<Option<NonNull<Completion>>>> = Rc::new(Cell::new(None));
        let done = Rc::new(Cell::new(false));

        let (s2, d2) = (slot.clone(), done.clone());
        sched
            .create_fiber(move |s| {
                let completion = Completion::new(s);
                s2.set(Some(NonNull::from(&completion)));
                assert_eq!(completion.wait(), 5);
                s2.set(None);
                d2.set(true);
            })
            .unwrap();

        assert_eq!(
            sched.run(),
            Err(strand_core::SchedError::Stalled { fibers: 1 })
        );
        assert!(!done.get());

        // The fiber is parked on its bridge; complete it from outside
        let completion = slot.get().unwrap();
        assert!(unsafe { completion.as_ref() }.complete(5));
        assert_eq!(sched.run_queue_len(), 1);
        sched.run().unwrap();
        assert!(done.get());
        assert_eq!(sched.live_fibers(), 0);
    }
}
