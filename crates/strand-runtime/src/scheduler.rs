//! The cooperative scheduler
//!
//! One scheduler drives one thread. It owns the run queue (FIFO of Ready
//! fibers, linked intrusively), the main fiber, and the reactor. Fibers
//! run from inside the reactor's idle callback: each idle tick drains the
//! run queue, switching from fiber to fiber until every one of them has
//! blocked or finished, then control falls back to main and the reactor
//! goes on polling.
//!
//! ```text
//!   reactor.run ── idle tick ── sched(true) ──> fiber A ── wait ──> fiber B
//!        ^                                                            │
//!        └──────────── main (run queue empty) <──── finished ─────────┘
//! ```
//!
//! The idle watcher is only active while fibers are Ready, so a loop with
//! nothing runnable blocks in the poller instead of spinning.

use core::cell::{Cell, RefCell};
use core::marker::PhantomPinned;
use core::pin::Pin;
use core::ptr::NonNull;
use std::any::Any;
use std::net::SocketAddr;
use std::panic;
use std::rc::Rc;
use std::time::Duration;

use strand_core::error::{SchedError, SchedResult};
use strand_core::kprint::{self, LogLevel};
use strand_core::list::List;
use strand_core::{kdebug, kerror, ktrace, kwarn, FiberId, FiberState};
use strand_reactor::{
    HandleId, IdleHandle, Reactor, ReactorError, RunMode, Status, TcpHandle, TimerHandle,
};

use crate::completion::Completion;
use crate::config::SchedulerConfig;
use crate::fiber::Fiber;

/// Scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Fibers created
    pub created: u64,
    /// Fibers whose entry returned (or panicked)
    pub finished: u64,
    /// Context switches performed
    pub switches: u64,
    /// Explicit `yield_now` calls
    pub yields: u64,
    /// Blocked fibers made Ready by a completion
    pub wakeups: u64,
}

/// Single-threaded cooperative fiber scheduler
pub struct Scheduler {
    main: Box<Fiber>,
    run_queue: RefCell<List<Fiber>>,
    current: Cell<NonNull<Fiber>>,
    reactor: Reactor,
    idle: IdleHandle,
    idle_armed: Cell<bool>,
    /// Fiber that retired and still needs its stack released
    graveyard: Cell<Option<NonNull<Fiber>>>,
    live: Cell<usize>,
    next_id: Cell<u64>,
    panic: Cell<Option<Box<dyn Any + Send>>>,
    stats: Cell<SchedStats>,
    config: SchedulerConfig,
    /// Fibers, bridges and the idle callback hold this address
    _pinned: PhantomPinned,
}

impl Scheduler {
    /// Wrap the calling thread as the main fiber and bind a fresh reactor
    ///
    /// Pinned: fibers and reactor callbacks hold its address.
    pub fn new(config: SchedulerConfig) -> SchedResult<Pin<Box<Scheduler>>> {
        config.validate()?;
        kprint::init();
        if config.debug_logging && !kprint::level_enabled(LogLevel::Debug) {
            kprint::set_log_level(LogLevel::Debug);
        }

        let reactor = Reactor::with_max_events(config.max_events)?;
        let idle = reactor.idle_init();
        let main = Box::new(Fiber::main());
        let main_ptr = NonNull::from(&*main);

        let sched = Box::new(Scheduler {
            main,
            run_queue: RefCell::new(List::new()),
            current: Cell::new(main_ptr),
            reactor,
            idle,
            idle_armed: Cell::new(false),
            graveyard: Cell::new(None),
            live: Cell::new(0),
            next_id: Cell::new(1),
            panic: Cell::new(None),
            stats: Cell::new(SchedStats::default()),
            config,
            _pinned: PhantomPinned,
        });
        sched.main.set_owner(&*sched);
        kprint::set_fiber_id(FiberId::MAIN.as_u64());
        kdebug!(
            "scheduler created (stack={} guard={})",
            sched.config.stack_size,
            sched.config.guard_size
        );
        Ok(Box::into_pin(sched))
    }

    /// `new` with compile-time defaults and environment overrides
    pub fn from_env() -> SchedResult<Pin<Box<Scheduler>>> {
        Self::new(SchedulerConfig::from_env())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn current_ptr(&self) -> NonNull<Fiber> {
        self.current.get()
    }

    #[inline]
    fn current(&self) -> &Fiber {
        // SAFETY: `current` always points at main or a live fiber
        unsafe { self.current.get().as_ref() }
    }

    /// Id of the running fiber (`FiberId::MAIN` outside any fiber)
    pub fn current_id(&self) -> FiberId {
        self.current().id()
    }

    /// Whether the caller runs on a fiber rather than the main context
    pub fn in_fiber(&self) -> bool {
        !self.current().is_main()
    }

    pub fn run_queue_len(&self) -> usize {
        self.run_queue.borrow().len()
    }

    /// Fibers created and not yet finished
    pub fn live_fibers(&self) -> usize {
        self.live.get()
    }

    pub fn stats(&self) -> SchedStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut SchedStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    // ------------------------------------------------------------------
    // Fiber lifecycle
    // ------------------------------------------------------------------

    /// Create a fiber running `entry` and make it Ready
    ///
    /// Fails only if its stack cannot be mapped.
    pub fn create_fiber<F>(&self, entry: F) -> SchedResult<FiberId>
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        let id = FiberId::new(self.next_id.get());
        let fiber = Fiber::create(
            self,
            id,
            Box::new(entry),
            self.config.stack_size,
            self.config.guard_size,
        )?;
        self.next_id.set(self.next_id.get() + 1);
        self.live.set(self.live.get() + 1);
        self.bump(|s| s.created += 1);
        kdebug!("created fiber {}", id);

        self.push_ready(NonNull::from(Box::leak(fiber)));
        Ok(id)
    }

    /// Final switch of a fiber whose entry has returned
    pub(crate) fn retire(&self, fiber: NonNull<Fiber>) -> ! {
        let f = unsafe { fiber.as_ref() };
        debug_assert_eq!(fiber, self.current.get());
        f.set_state(FiberState::Finished);
        self.live.set(self.live.get() - 1);
        self.bump(|s| s.finished += 1);
        kdebug!("fiber {} finished", f.id());

        // The stack we are running on is released by the next context
        self.reap();
        self.graveyard.set(Some(fiber));
        self.sched(true);

        kerror!("retired fiber {} was resumed", f.id());
        std::process::abort();
    }

    /// Release the stack of a fiber that retired on the previous switch
    pub(crate) fn reap(&self) {
        if let Some(dead) = self.graveyard.take() {
            // SAFETY: a retired fiber is parked once, is not linked anywhere,
            // and never runs again
            let fiber = unsafe { Box::from_raw(dead.as_ptr()) };
            debug_assert!(!fiber.is_queued());
            ktrace!("reclaimed fiber {}", fiber.id());
            drop(fiber);
        }
    }

    pub(crate) fn stash_panic(&self, payload: Box<dyn Any + Send>) {
        // Keep the first panic; later ones are already logged
        let first = self.panic.take().unwrap_or(payload);
        self.panic.set(Some(first));
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn push_ready(&self, fiber: NonNull<Fiber>) {
        // SAFETY: callers pass live, unlinked fibers
        unsafe {
            fiber.as_ref().set_state(FiberState::Ready);
            self.run_queue.borrow_mut().push_back(fiber);
        }
        self.arm_idle();
    }

    /// Make a blocked fiber Ready unless it is already queued or running
    ///
    /// Returns whether it was enqueued.
    pub(crate) fn wake(&self, fiber: NonNull<Fiber>) -> bool {
        let f = unsafe { fiber.as_ref() };
        if f.is_queued() || fiber == self.current.get() {
            return false;
        }
        debug_assert_eq!(f.state(), FiberState::Blocked);
        self.bump(|s| s.wakeups += 1);
        self.push_ready(fiber);
        true
    }

    /// Switch to the next Ready fiber, or to main if there is none
    ///
    /// With `last == false` the caller goes to the tail of the run queue;
    /// with `last == true` it is blocked or finished and is not requeued.
    /// Returns once the caller is switched back to (never, for a
    /// finished fiber).
    pub fn sched(&self, last: bool) {
        let current = self.current.get();
        let next = self
            .run_queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| NonNull::from(&*self.main));
        if next == current {
            return;
        }
        if !last {
            // SAFETY: the running fiber is never linked
            unsafe {
                current.as_ref().set_state(FiberState::Ready);
                self.run_queue.borrow_mut().push_back(current);
            }
        }

        let (from, to) = unsafe { (current.as_ref(), next.as_ref()) };
        to.set_state(FiberState::Running);
        self.current.set(next);
        self.bump(|s| s.switches += 1);
        ktrace!("switch fiber {} -> {}", from.id(), to.id());
        kprint::set_fiber_id(to.id().as_u64());

        // SAFETY: `from` is executing, `to` is suspended or fresh
        unsafe { from.switch_to(to) };

        // Resumed: `current` is `from` again
        self.reap();
        if from.is_main() {
            if let Some(payload) = self.panic.take() {
                self.rethrow(payload);
            }
        }
    }

    /// Give other Ready fibers a turn
    pub fn yield_now(&self) {
        self.bump(|s| s.yields += 1);
        self.sched(false);
    }

    /// Start the idle watcher if it is parked
    fn arm_idle(&self) {
        if self.idle_armed.replace(true) {
            return;
        }
        let this = self as *const Scheduler;
        // SAFETY: the watcher is stopped and closed before the scheduler drops
        let result = self.reactor.idle_start(self.idle, move || unsafe { (*this).on_idle() });
        if let Err(e) = result {
            kerror!("arming idle watcher failed: {}", e);
            self.idle_armed.set(false);
        }
    }

    fn park_idle(&self) {
        if self.idle_armed.replace(false) {
            if let Err(e) = self.reactor.idle_stop(self.idle) {
                kwarn!("parking idle watcher failed: {}", e);
            }
        }
    }

    /// Idle tick: run fibers until none is Ready
    fn on_idle(&self) {
        self.sched(true);
        if self.run_queue.borrow().is_empty() {
            self.park_idle();
        }
    }

    /// Re-raise a fiber panic on main
    fn rethrow(&self, payload: Box<dyn Any + Send>) -> ! {
        // The idle callback may be unwound through; install a fresh one
        self.park_idle();
        if !self.run_queue.borrow().is_empty() {
            self.arm_idle();
        }
        panic::resume_unwind(payload)
    }

    /// Drive the reactor until nothing is left to do
    ///
    /// Fibers still alive when the reactor runs dry are blocked on
    /// operations that can no longer complete; they are reported as
    /// `SchedError::Stalled` rather than waited on forever.
    pub fn run(&self) -> SchedResult<()> {
        if self.in_fiber() {
            return Err(SchedError::AlreadyRunning);
        }
        match self.reactor.run(RunMode::Default) {
            Ok(_) => {}
            Err(ReactorError::AlreadyRunning) => return Err(SchedError::AlreadyRunning),
            Err(e) => return Err(e.into()),
        }
        self.reap();

        let live = self.live.get();
        if live > 0 {
            kwarn!("reactor drained with {} fiber(s) still blocked", live);
            return Err(SchedError::Stalled { fibers: live });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Suspend points
    // ------------------------------------------------------------------

    /// Start `handle` and wait for its first fire
    ///
    /// Returns the reactor status; a failed start returns at once. A
    /// repeating timer is stopped once the fiber resumes.
    ///
    /// # Panics
    ///
    /// On the main fiber.
    pub fn timer_start(&self, handle: TimerHandle, timeout: Duration, repeat: Duration) -> Status {
        let completion = Completion::new(self);
        // SAFETY: the timer is one-shot (fires once, before `wait` returns)
        // or is stopped below before `completion` goes out of scope
        let cb = unsafe { completion.callback() };
        if let Err(e) = self.reactor.timer_start(handle, timeout, repeat, move || cb(0)) {
            return e.status();
        }
        let status = completion.wait();
        if !repeat.is_zero() {
            if let Err(e) = self.reactor.timer_stop(handle) {
                kwarn!("stopping repeating timer {:?} failed: {}", handle, e);
            }
        }
        status
    }

    /// Close `handle` and wait until the reactor has released it
    ///
    /// # Panics
    ///
    /// On the main fiber.
    pub fn close(&self, handle: impl Into<HandleId>) -> SchedResult<()> {
        let completion = Completion::new(self);
        // SAFETY: the close callback runs exactly once, before `wait` returns
        let cb = unsafe { completion.callback() };
        self.reactor.close(handle, move || cb(0))?;
        completion.wait();
        Ok(())
    }

    /// Suspend the calling fiber for at least `duration`
    ///
    /// # Panics
    ///
    /// On the main fiber.
    pub fn sleep(&self, duration: Duration) {
        let timer = self.reactor.timer_init();
        let status = self.timer_start(timer, duration, Duration::ZERO);
        if status != 0 {
            kwarn!("sleep timer failed: {}", strand_reactor::describe(status));
        }
        if let Err(e) = self.close(timer) {
            kwarn!("closing sleep timer failed: {}", e);
        }
    }

    #[inline]
    pub fn sleep_ms(&self, ms: u64) {
        self.sleep(Duration::from_millis(ms));
    }

    /// Connect to `addr`, suspending until the attempt resolves
    ///
    /// A refused or failed attempt closes the socket and returns
    /// `SchedError::Io(status)`.
    pub fn connect(&self, addr: SocketAddr) -> SchedResult<TcpHandle> {
        let completion = Completion::new(self);
        let handle = self.reactor.tcp_init();
        // SAFETY: the connect callback runs exactly once (result or
        // cancellation), before `wait` returns
        let cb = unsafe { completion.callback() };
        if let Err(e) = self.reactor.connect(handle, addr, cb) {
            self.close(handle)?;
            return Err(e.into());
        }
        let status = completion.wait();
        if status != 0 {
            self.close(handle)?;
            return Err(SchedError::Io(status));
        }
        ktrace!("connected to {}", addr);
        Ok(handle)
    }

    /// Bind and listen on `addr` with the configured backlog
    ///
    /// Does not suspend; use [`Listener::accept`] from a fiber.
    pub fn listen(&self, addr: SocketAddr) -> SchedResult<Listener<'_>> {
        let handle = self.reactor.tcp_init();
        let bridge = Rc::new(ListenBridge::default());
        let on_connection = {
            let bridge = bridge.clone();
            move |status| bridge.on_connection(status)
        };

        let started = self
            .reactor
            .tcp_bind(handle, addr)
            .and_then(|()| self.reactor.listen(handle, self.config.listen_backlog, on_connection));
        if let Err(e) = started {
            if let Err(close_err) = self.reactor.close(handle, || {}) {
                kwarn!("releasing failed listener: {}", close_err);
            }
            return Err(e.into());
        }
        kdebug!("listening on {}", addr);
        Ok(Listener {
            sched: self,
            handle,
            bridge,
            open: true,
        })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.park_idle();
        if let Err(e) = self.reactor.close(self.idle, || {}) {
            kwarn!("releasing idle watcher failed: {}", e);
        }
        self.reap();

        if !std::thread::panicking() {
            let queued = self.run_queue.get_mut().len();
            assert!(
                queued == 0,
                "scheduler dropped with {} runnable fiber(s) in its run queue",
                queued
            );
            let live = self.live.get();
            assert!(live == 0, "scheduler dropped with {} unfinished fiber(s)", live);
        }
        kprint::clear_fiber_id();
    }
}

/// Connection notifications shared between a listener and its reactor callback
#[derive(Default)]
struct ListenBridge {
    /// Status of the connection waiting to be accepted
    ready: Cell<Option<Status>>,
    /// Bridge of the fiber blocked in `accept`
    waiter: Cell<Option<NonNull<Completion>>>,
}

impl ListenBridge {
    fn on_connection(&self, status: Status) {
        self.ready.set(Some(status));
        if let Some(waiter) = self.waiter.get() {
            // SAFETY: `accept` clears the waiter before its bridge goes away
            unsafe { waiter.as_ref() }.complete(status);
        }
    }
}

/// Listening socket whose `accept` suspends the calling fiber
pub struct Listener<'s> {
    sched: &'s Scheduler,
    handle: TcpHandle,
    bridge: Rc<ListenBridge>,
    open: bool,
}

impl<'s> Listener<'s> {
    #[inline]
    pub fn handle(&self) -> TcpHandle {
        self.handle
    }

    pub fn local_addr(&self) -> SchedResult<SocketAddr> {
        Ok(self.sched.reactor.local_addr(self.handle)?)
    }

    /// Wait for the next connection and return a handle that owns it
    ///
    /// # Panics
    ///
    /// On the main fiber.
    pub fn accept(&self) -> SchedResult<TcpHandle> {
        loop {
            if let Some(status) = self.bridge.ready.take() {
                if status != 0 {
                    return Err(SchedError::Io(status));
                }
                let conn = self.sched.reactor.tcp_init();
                if let Err(e) = self.sched.reactor.accept(self.handle, conn) {
                    self.sched.close(conn)?;
                    return Err(e.into());
                }
                return Ok(conn);
            }

            if self.bridge.waiter.get().is_some() {
                return Err(ReactorError::AlreadyActive.into());
            }
            let completion = Completion::new(self.sched);
            self.bridge.waiter.set(Some(NonNull::from(&completion)));
            completion.wait();
            self.bridge.waiter.set(None);
        }
    }

    /// Stop listening and wait until the socket is released
    pub fn close(mut self) -> SchedResult<()> {
        self.open = false;
        self.sched.close(self.handle)
    }
}

impl Drop for Listener<'_> {
    fn drop(&mut self) {
        if self.open {
            // Cannot suspend here; release without waiting
            if let Err(e) = self.sched.reactor.close(self.handle, || {}) {
                kwarn!("closing listener {:?} failed: {}", self.handle, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn scheduler() -> Pin<Box<Scheduler>> {
        Scheduler::new(SchedulerConfig::new()).unwrap()
    }

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_new_scheduler_state() {
        let sched = scheduler();
        assert_eq!(sched.current_id(), FiberId::MAIN);
        assert!(!sched.in_fiber());
        assert_eq!(sched.run_queue_len(), 0);
        assert_eq!(sched.live_fibers(), 0);
        assert_eq!(sched.stats(), SchedStats::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Scheduler::new(SchedulerConfig::new().stack_size(1)).err();
        assert!(matches!(err, Some(SchedError::InvalidConfig(_))));
    }

    #[test]
    fn test_sched_on_empty_queue_stays_on_main() {
        let sched = scheduler();
        sched.sched(true);
        sched.sched(false);
        sched.yield_now();
        assert_eq!(sched.current_id(), FiberId::MAIN);
        assert_eq!(sched.stats().switches, 0);
        assert_eq!(sched.run_queue_len(), 0);
    }

    #[test]
    fn test_run_without_fibers() {
        let sched = scheduler();
        assert_eq!(sched.run(), Ok(()));
    }

    #[test]
    fn test_round_robin_fifo() {
        let sched = scheduler();
        let order = log();
        for name in ["a", "b", "c"] {
            let order = order.clone();
            sched
                .create_fiber(move |s| {
                    for round in 0..3 {
                        order.borrow_mut().push(format!("{}{}", name, round));
                        s.yield_now();
                    }
                })
                .unwrap();
        }
        assert_eq!(sched.run_queue_len(), 3);
        assert_eq!(sched.live_fibers(), 3);

        sched.run().unwrap();
        assert_eq!(
            *order.borrow(),
            vec!["a0", "b0", "c0", "a1", "b1", "c1", "a2", "b2", "c2"]
        );
        assert_eq!(sched.live_fibers(), 0);
        assert_eq!(sched.stats().created, 3);
        assert_eq!(sched.stats().finished, 3);
        assert_eq!(sched.stats().yields, 9);
    }

    #[test]
    fn test_main_yield_runs_ready_fibers() {
        let sched = scheduler();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        sched.create_fiber(move |_| r.set(true)).unwrap();

        sched.yield_now();
        assert!(ran.get());
        assert_eq!(sched.current_id(), FiberId::MAIN);
        assert_eq!(sched.live_fibers(), 0);
        // The idle watcher armed by the create is parked by the first tick
        sched.run().unwrap();
    }

    #[test]
    fn test_fiber_ids_and_current() {
        let sched = scheduler();
        let seen = log();
        for _ in 0..2 {
            let seen = seen.clone();
            sched
                .create_fiber(move |s| {
                    assert!(s.in_fiber());
                    seen.borrow_mut().push(s.current_id().to_string());
                })
                .unwrap();
        }
        sched.run().unwrap();
        assert_eq!(*seen.borrow(), vec!["1", "2"]);
    }

    #[test]
    fn test_sleep_lasts_at_least_duration() {
        let sched = scheduler();
        let elapsed = Rc::new(Cell::new(Duration::ZERO));
        let e = elapsed.clone();
        sched
            .create_fiber(move |s| {
                let start = Instant::now();
                s.sleep(Duration::from_millis(100));
                e.set(start.elapsed());
            })
            .unwrap();

        sched.run().unwrap();
        assert!(elapsed.get() >= Duration::from_millis(100));
        assert_eq!(sched.reactor().handle_count(), 0);
    }

    #[test]
    fn test_sleepers_wake_in_deadline_order() {
        let sched = scheduler();
        let order = log();
        for ms in [30u64, 10, 20] {
            let order = order.clone();
            sched
                .create_fiber(move |s| {
                    s.sleep_ms(ms);
                    order.borrow_mut().push(ms.to_string());
                })
                .unwrap();
        }
        sched.run().unwrap();
        assert_eq!(*order.borrow(), vec!["10", "20", "30"]);
    }

    #[test]
    fn test_nested_create_child_finishes_first() {
        let sched = scheduler();
        let events = log();
        let ev = events.clone();

        sched
            .create_fiber(move |s| {
                let child_events = ev.clone();
                s.create_fiber(move |cs| {
                    child_events.borrow_mut().push("b runs".into());
                    assert_eq!(cs.live_fibers(), 2);
                })
                .unwrap();

                let start = Instant::now();
                s.sleep(Duration::from_millis(50));
                // B retired and was reclaimed while A slept
                ev.borrow_mut().push(format!("a resumes live={}", s.live_fibers()));
                assert!(start.elapsed() >= Duration::from_millis(50));
            })
            .unwrap();

        sched.run().unwrap();
        assert_eq!(*events.borrow(), vec!["b runs", "a resumes live=1"]);
        assert_eq!(sched.run_queue_len(), 0);
        assert_eq!(sched.stats().finished, 2);
    }

    #[test]
    fn test_repeating_timer_stopped_after_first_fire() {
        let sched = scheduler();
        let statuses = log();
        let st = statuses.clone();
        sched
            .create_fiber(move |s| {
                let timer = s.reactor().timer_init();
                let status = s.timer_start(timer, Duration::from_millis(1), Duration::from_millis(1));
                st.borrow_mut().push(status.to_string());
                assert!(!s.reactor().is_active(timer));
                s.close(timer).unwrap();
            })
            .unwrap();
        sched.run().unwrap();
        assert_eq!(*statuses.borrow(), vec!["0"]);
    }

    #[test]
    fn test_timer_start_on_closed_handle_returns_status() {
        let sched = scheduler();
        let status = Rc::new(Cell::new(0));
        let st = status.clone();
        sched
            .create_fiber(move |s| {
                let timer = s.reactor().timer_init();
                s.close(timer).unwrap();
                st.set(s.timer_start(timer, Duration::ZERO, Duration::ZERO));
            })
            .unwrap();
        sched.run().unwrap();
        assert_eq!(status.get(), ReactorError::InvalidHandle.status());
    }

    #[test]
    #[should_panic(expected = "main fiber")]
    fn test_sleep_on_main_panics() {
        let sched = scheduler();
        sched.sleep(Duration::from_millis(1));
    }

    #[test]
    #[should_panic(expected = "runnable fiber")]
    fn test_drop_with_queued_fiber_asserts() {
        let sched = scheduler();
        sched.create_fiber(|_| {}).unwrap();
        drop(sched);
    }

    #[test]
    #[should_panic(expected = "unfinished fiber")]
    fn test_drop_with_blocked_fiber_asserts() {
        let sched = scheduler();
        sched
            .create_fiber(|s| {
                // Nothing will ever complete this
                let completion = Completion::new(s);
                completion.wait();
            })
            .unwrap();
        assert_eq!(sched.run(), Err(SchedError::Stalled { fibers: 1 }));
        assert_eq!(sched.run_queue_len(), 0);
        drop(sched);
    }

    #[test]
    fn test_pinned_scheduler_keeps_address_across_moves() {
        let sched = scheduler();
        let addr = &*sched as *const Scheduler;
        let seen = Rc::new(Cell::new(core::ptr::null::<Scheduler>()));

        // Moving the pinned box moves the pointer, not the scheduler
        let mut holder = vec![sched];
        let sched = holder.pop().unwrap();
        let s2 = seen.clone();
        sched
            .create_fiber(move |s| {
                s.yield_now();
                s2.set(s as *const Scheduler);
            })
            .unwrap();
        sched.run().unwrap();

        assert_eq!(seen.get(), addr);
        assert_eq!(&*sched as *const Scheduler, addr);
    }

    #[test]
    fn test_fiber_panic_reaches_run() {
        let sched = scheduler();
        let after = Rc::new(Cell::new(false));
        sched.create_fiber(|_| panic!("boom in fiber")).unwrap();
        let a = after.clone();
        sched.create_fiber(move |_| a.set(true)).unwrap();

        let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| sched.run()));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom in fiber"));
        assert_eq!(sched.current_id(), FiberId::MAIN);

        // The scheduler stays usable after the panic surfaced
        sched.run().unwrap();
        assert!(after.get());
        assert_eq!(sched.live_fibers(), 0);
    }

    #[test]
    fn test_small_stack_config_runs_recursion() {
        let sched = Scheduler::new(SchedulerConfig::new().stack_size(64 * 1024)).unwrap();
        let depth = Rc::new(Cell::new(0usize));
        let d = depth.clone();
        sched
            .create_fiber(move |_| {
                fn recurse(n: usize) -> usize {
                    let buf = [n as u8; 256];
                    if n == 0 {
                        return buf[0] as usize;
                    }
                    recurse(n - 1) + std::hint::black_box(buf)[1] as usize
                }
                d.set(recurse(64));
            })
            .unwrap();
        sched.run().unwrap();
        assert!(depth.get() > 0);
    }

    #[test]
    fn test_listen_accept_connect() {
        let sched = scheduler();
        let events = log();
        let addr: Rc<Cell<Option<SocketAddr>>> = Rc::new(Cell::new(None));

        let (ev, a) = (events.clone(), addr.clone());
        sched
            .create_fiber(move |s| {
                let listener = s.listen("127.0.0.1:0".parse().unwrap()).unwrap();
                a.set(Some(listener.local_addr().unwrap()));

                for _ in 0..2 {
                    let conn = listener.accept().unwrap();
                    let peer = s.reactor().peer_addr(conn).unwrap();
                    ev.borrow_mut().push(format!("accepted {}", peer.ip()));
                    s.close(conn).unwrap();
                }
                listener.close().unwrap();
            })
            .unwrap();

        for _ in 0..2 {
            let (ev, a) = (events.clone(), addr.clone());
            sched
                .create_fiber(move |s| {
                    s.sleep_ms(10);
                    let conn = s.connect(a.get().unwrap()).unwrap();
                    ev.borrow_mut().push("connected".into());
                    s.close(conn).unwrap();
                })
                .unwrap();
        }

        sched.run().unwrap();
        let mut seen = events.borrow().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec!["accepted 127.0.0.1", "accepted 127.0.0.1", "connected", "connected"]
        );
        assert_eq!(sched.reactor().handle_count(), 0);
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let sched = scheduler();
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        sched
            .create_fiber(move |s| {
                let addr = SocketAddr::from(([127, 0, 0, 1], port));
                *r.borrow_mut() = Some(s.connect(addr));
            })
            .unwrap();
        sched.run().unwrap();
        assert_eq!(
            result.borrow_mut().take(),
            Some(Err(SchedError::Io(-libc::ECONNREFUSED)))
        );
        assert_eq!(sched.reactor().handle_count(), 0);
    }

    #[test]
    fn test_dropped_listener_releases_socket() {
        let sched = scheduler();
        sched
            .create_fiber(|s| {
                let listener = s.listen("127.0.0.1:0".parse().unwrap()).unwrap();
                drop(listener);
                s.sleep_ms(1);
            })
            .unwrap();
        sched.run().unwrap();
        assert_eq!(sched.reactor().handle_count(), 0);
    }
}
