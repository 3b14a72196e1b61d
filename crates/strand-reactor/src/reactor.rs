//! The event loop
//!
//! One iteration runs, in order:
//!
//! 1. update the cached loop time
//! 2. due timers (earliest deadline first, start order on ties)
//! 3. deferred connect results
//! 4. idle watchers
//! 5. poll for I/O; zero timeout when idle watchers, deferred work or
//!    closing handles exist, otherwise until the next timer (or forever)
//! 6. close callbacks
//!
//! Callbacks are taken out of their slot before they run and put back
//! afterwards, so no interior borrow is held while user code executes.
//! A callback may call any reactor method (except `run`) and may switch
//! execution contexts.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use strand_core::{kdebug, ktrace, kwarn};

use crate::error::{errno_status, ReactorError, ReactorResult, Status};
use crate::handle::{
    CloseCallback, ConnectCallback, ConnectionCallback, HandleId, HandleState, HandleTable,
    IdleHandle, IdleState, TcpHandle, TcpMode, TcpState, TickCallback, TimerHandle, TimerState,
};
use crate::net;
use crate::poll::{Event, Poller, READABLE, WRITABLE};
use crate::timer::TimerQueue;

/// Default size of the poller's event buffer
pub const DEFAULT_MAX_EVENTS: usize = 256;

/// How long `run` keeps iterating
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Until no active handles, deferred work or close callbacks remain
    #[default]
    Default,
    /// One iteration, blocking in the poller if there is nothing else to do
    Once,
    /// One iteration without blocking
    NoWait,
}

struct PendingConnect {
    id: HandleId,
    status: Status,
}

struct ClosingHandle {
    id: HandleId,
    /// Connect callback of a socket closed mid-connect
    cancelled: Option<ConnectCallback>,
    on_closed: CloseCallback,
}

struct Inner {
    handles: HandleTable,
    timers: TimerQueue,
    /// Active idle watchers in start order
    idles: Vec<HandleId>,
    pending: VecDeque<PendingConnect>,
    closing: Vec<ClosingHandle>,
    /// Active idle watchers, active timers, listening and connecting sockets
    active: usize,
    now: Instant,
}

/// Resets the `running` flag even if a callback unwinds
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Single-threaded, callback-driven event loop over epoll
pub struct Reactor {
    inner: RefCell<Inner>,
    poller: Poller,
    running: Cell<bool>,
    stop_requested: Cell<bool>,
    iterations: Cell<u64>,
}

impl Reactor {
    pub fn new() -> ReactorResult<Self> {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    /// Create a reactor whose poller returns at most `max_events` per wait
    pub fn with_max_events(max_events: usize) -> ReactorResult<Self> {
        let poller = Poller::new(max_events)?;
        kdebug!("reactor created (max_events={})", max_events);
        Ok(Self {
            inner: RefCell::new(Inner {
                handles: HandleTable::new(),
                timers: TimerQueue::new(),
                idles: Vec::new(),
                pending: VecDeque::new(),
                closing: Vec::new(),
                active: 0,
                now: Instant::now(),
            }),
            poller,
            running: Cell::new(false),
            stop_requested: Cell::new(false),
            iterations: Cell::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Loop control
    // ------------------------------------------------------------------

    /// Cached loop time, refreshed at the start of every iteration
    pub fn now(&self) -> Instant {
        self.inner.borrow().now
    }

    pub fn update_time(&self) {
        self.inner.borrow_mut().now = Instant::now();
    }

    /// Whether another iteration has anything to do
    pub fn is_alive(&self) -> bool {
        let inner = self.inner.borrow();
        inner.active > 0 || !inner.pending.is_empty() || !inner.closing.is_empty()
    }

    /// Make the current `run` return after this iteration
    pub fn stop(&self) {
        self.stop_requested.set(true);
    }

    /// Whether `run` is on the stack
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Completed loop iterations
    pub fn iterations(&self) -> u64 {
        self.iterations.get()
    }

    /// Handles issued and not yet released by the close phase
    pub fn handle_count(&self) -> usize {
        self.inner.borrow().handles.len()
    }

    /// Drive the loop; returns whether it is still alive
    pub fn run(&self, mode: RunMode) -> ReactorResult<bool> {
        if self.running.replace(true) {
            return Err(ReactorError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let mut alive = self.is_alive();
        if !alive {
            self.update_time();
        }

        while alive && !self.stop_requested.get() {
            self.update_time();
            self.run_timers();
            let ran_pending = self.run_pending();
            self.run_idle();

            let timeout = match mode {
                RunMode::Default => self.poll_timeout(),
                RunMode::Once if !ran_pending => self.poll_timeout(),
                _ => Some(Duration::ZERO),
            };
            self.poll_io(timeout)?;
            self.run_closing();

            if mode == RunMode::Once {
                // Timers that came due while blocked count as forward progress
                self.update_time();
                self.run_timers();
            }

            self.iterations.set(self.iterations.get() + 1);
            alive = self.is_alive();
            if mode != RunMode::Default {
                break;
            }
        }

        self.stop_requested.set(false);
        Ok(alive)
    }

    fn poll_timeout(&self) -> Option<Duration> {
        if self.stop_requested.get() {
            return Some(Duration::ZERO);
        }
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.active == 0
            || !inner.idles.is_empty()
            || !inner.pending.is_empty()
            || !inner.closing.is_empty()
        {
            return Some(Duration::ZERO);
        }

        let handles = &inner.handles;
        inner.timers.purge_stale(|e| {
            matches!(handles.get(e.id), Some(HandleState::Timer(t)) if t.active && t.seq == e.seq)
        });
        inner
            .timers
            .peek()
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn run_timers(&self) {
        // Timers (re)started by callbacks in this pass wait for the next one
        let (now, limit) = {
            let inner = self.inner.borrow();
            (inner.now, inner.timers.next_seq())
        };

        loop {
            let fired = {
                let mut guard = self.inner.borrow_mut();
                let inner = &mut *guard;
                let Some(top) = inner.timers.peek() else { break };
                if top.deadline > now || top.seq >= limit {
                    break;
                }
                inner.timers.pop();

                let timer = match inner.handles.get_mut(top.id) {
                    Some(HandleState::Timer(t)) if t.active && t.seq == top.seq => t,
                    _ => continue,
                };
                if timer.repeat.is_zero() {
                    timer.active = false;
                    inner.active -= 1;
                } else {
                    timer.seq = inner.timers.push(top.id, now + timer.repeat);
                }
                timer.cb.take().map(|cb| (top.id, cb))
            };

            if let Some((id, mut cb)) = fired {
                cb();
                self.restore_timer_cb(id, cb);
            }
        }
    }

    fn run_pending(&self) -> bool {
        let batch = mem::take(&mut self.inner.borrow_mut().pending);
        if batch.is_empty() {
            return false;
        }
        for p in batch {
            self.finish_connect(p.id, p.status);
        }
        true
    }

    fn run_idle(&self) {
        let snapshot = self.inner.borrow().idles.clone();
        for id in snapshot {
            let cb = {
                let mut inner = self.inner.borrow_mut();
                match inner.handles.get_mut(id) {
                    Some(HandleState::Idle(idle)) if idle.active => idle.cb.take(),
                    _ => None,
                }
            };
            if let Some(mut cb) = cb {
                cb();
                self.restore_idle_cb(id, cb);
            }
        }
    }

    fn poll_io(&self, timeout: Option<Duration>) -> ReactorResult<()> {
        let events = self.poller.wait(timeout)?;
        if !events.is_empty() {
            self.update_time();
        }
        for ev in events {
            self.dispatch(ev);
        }
        Ok(())
    }

    fn run_closing(&self) {
        let batch = {
            let mut inner = self.inner.borrow_mut();
            let batch = mem::take(&mut inner.closing);
            for c in &batch {
                inner.handles.remove(c.id);
            }
            batch
        };
        for c in batch {
            ktrace!("handle {} released", c.id);
            if let Some(cb) = c.cancelled {
                cb(errno_status(Errno::ECANCELED));
            }
            (c.on_closed)();
        }
    }

    // ------------------------------------------------------------------
    // Callback slots
    // ------------------------------------------------------------------

    // A callback goes back into its slot only if the handle is still
    // alive and nobody installed a replacement while it ran. Anything
    // displaced is dropped after the borrow is released.

    fn restore_idle_cb(&self, id: HandleId, cb: TickCallback) {
        let leftover = {
            let mut inner = self.inner.borrow_mut();
            match inner.handles.get_mut(id) {
                Some(HandleState::Idle(idle)) if idle.cb.is_none() => {
                    idle.cb = Some(cb);
                    None
                }
                _ => Some(cb),
            }
        };
        drop(leftover);
    }

    fn restore_timer_cb(&self, id: HandleId, cb: TickCallback) {
        let leftover = {
            let mut inner = self.inner.borrow_mut();
            match inner.handles.get_mut(id) {
                Some(HandleState::Timer(timer)) if timer.cb.is_none() => {
                    timer.cb = Some(cb);
                    None
                }
                _ => Some(cb),
            }
        };
        drop(leftover);
    }

    fn restore_connection_cb(&self, id: HandleId, cb: ConnectionCallback) {
        let leftover = {
            let mut inner = self.inner.borrow_mut();
            match inner.handles.get_mut(id) {
                Some(HandleState::Tcp(TcpState {
                    mode: TcpMode::Listening { on_connection, .. },
                    ..
                })) if on_connection.is_none() => {
                    *on_connection = Some(cb);
                    None
                }
                _ => Some(cb),
            }
        };
        drop(leftover);
    }

    // ------------------------------------------------------------------
    // Generic handle operations
    // ------------------------------------------------------------------

    /// Whether the handle is started (idle/timer) or has a socket operation in flight
    pub fn is_active(&self, handle: impl Into<HandleId>) -> bool {
        let inner = self.inner.borrow();
        match inner.handles.get(handle.into()) {
            Some(HandleState::Idle(idle)) => idle.active,
            Some(HandleState::Timer(timer)) => timer.active,
            Some(HandleState::Tcp(tcp)) => tcp.is_active(),
            _ => false,
        }
    }

    pub fn is_closing(&self, handle: impl Into<HandleId>) -> bool {
        matches!(
            self.inner.borrow().handles.get(handle.into()),
            Some(HandleState::Closing)
        )
    }

    /// Stop the handle and release it; `on_closed` runs in the close phase
    ///
    /// A socket closed mid-connect has its connect callback run with
    /// `-ECANCELED` just before `on_closed`.
    pub fn close(
        &self,
        handle: impl Into<HandleId>,
        on_closed: impl FnOnce() + 'static,
    ) -> ReactorResult<()> {
        let id = handle.into();
        let old = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let state = inner.handles.state_mut(id)?;
            let mut old = mem::replace(state, HandleState::Closing);
            let mut cancelled = None;

            match &mut old {
                HandleState::Idle(idle) => {
                    if idle.active {
                        inner.idles.retain(|&i| i != id);
                        inner.active -= 1;
                    }
                }
                HandleState::Timer(timer) => {
                    if timer.active {
                        inner.active -= 1;
                    }
                }
                HandleState::Tcp(tcp) => {
                    if tcp.is_active() {
                        inner.active -= 1;
                    }
                    if let (true, Some(fd)) = (tcp.registered, &tcp.fd) {
                        if let Err(e) = self.poller.delete(fd.as_raw_fd()) {
                            kwarn!("handle {}: epoll delete failed: {}", id, e);
                        }
                    }
                    if let TcpMode::Connecting { on_connect } = &mut tcp.mode {
                        cancelled = on_connect.take();
                    }
                }
                HandleState::Closing => {}
            }

            inner.closing.push(ClosingHandle {
                id,
                cancelled,
                on_closed: Box::new(on_closed),
            });
            old
        };
        ktrace!("handle {} closing", id);
        // Releases the fd and any stored callbacks
        drop(old);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Idle watchers
    // ------------------------------------------------------------------

    pub fn idle_init(&self) -> IdleHandle {
        let state = HandleState::Idle(IdleState {
            active: false,
            cb: None,
        });
        IdleHandle(self.inner.borrow_mut().handles.insert(state))
    }

    /// Run `cb` once per iteration until stopped; no-op if already started
    pub fn idle_start(&self, handle: IdleHandle, cb: impl FnMut() + 'static) -> ReactorResult<()> {
        let displaced = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let idle = inner.handles.idle_mut(handle.0)?;
            if idle.active {
                return Ok(());
            }
            idle.active = true;
            let old = idle.cb.replace(Box::new(cb));
            inner.idles.push(handle.0);
            inner.active += 1;
            old
        };
        drop(displaced);
        Ok(())
    }

    pub fn idle_stop(&self, handle: IdleHandle) -> ReactorResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let idle = inner.handles.idle_mut(handle.0)?;
        if idle.active {
            idle.active = false;
            inner.idles.retain(|&i| i != handle.0);
            inner.active -= 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn timer_init(&self) -> TimerHandle {
        let state = HandleState::Timer(TimerState {
            active: false,
            seq: 0,
            repeat: Duration::ZERO,
            cb: None,
        });
        TimerHandle(self.inner.borrow_mut().handles.insert(state))
    }

    /// Fire `cb` after `delay`, then every `repeat` if non-zero
    ///
    /// Restarting an active timer replaces its schedule and callback.
    pub fn timer_start(
        &self,
        handle: TimerHandle,
        delay: Duration,
        repeat: Duration,
        cb: impl FnMut() + 'static,
    ) -> ReactorResult<()> {
        let displaced = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let timer = inner.handles.timer_mut(handle.0)?;
            // Measure from the real start so a wake never lands early
            let now = Instant::now();
            inner.now = now;
            if !timer.active {
                inner.active += 1;
            }
            timer.active = true;
            timer.repeat = repeat;
            timer.seq = inner.timers.push(handle.0, now + delay);
            timer.cb.replace(Box::new(cb))
        };
        drop(displaced);
        Ok(())
    }

    pub fn timer_stop(&self, handle: TimerHandle) -> ReactorResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let timer = inner.handles.timer_mut(handle.0)?;
        if timer.active {
            timer.active = false;
            timer.seq = 0;
            inner.active -= 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // TCP
    // ------------------------------------------------------------------

    pub fn tcp_init(&self) -> TcpHandle {
        TcpHandle(self.inner.borrow_mut().handles.insert(HandleState::Tcp(TcpState::new())))
    }

    /// Create the socket (if needed) and bind it with `SO_REUSEADDR`
    pub fn tcp_bind(&self, handle: TcpHandle, addr: SocketAddr) -> ReactorResult<()> {
        let mut inner = self.inner.borrow_mut();
        let tcp = inner.handles.tcp_mut(handle.0)?;
        if !matches!(tcp.mode, TcpMode::Init) {
            return Err(ReactorError::Os(Errno::EINVAL));
        }
        let fd = match &tcp.fd {
            Some(fd) => fd.as_raw_fd(),
            None => {
                let fd = net::socket_for(&addr)?;
                let raw = fd.as_raw_fd();
                tcp.fd = Some(fd);
                raw
            }
        };
        net::set_reuseaddr(fd)?;
        net::bind(fd, &addr)?;
        tcp.mode = TcpMode::Bound;
        kdebug!("handle {} bound to {}", handle.0, addr);
        Ok(())
    }

    /// Start listening; `on_connection(0)` runs once per connection ready for `accept`
    ///
    /// While an accepted connection waits to be claimed the listener stops
    /// polling, so the backlog queues in the kernel.
    pub fn listen(
        &self,
        handle: TcpHandle,
        backlog: i32,
        on_connection: impl FnMut(Status) + 'static,
    ) -> ReactorResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let tcp = inner.handles.tcp_mut(handle.0)?;
        match tcp.mode {
            TcpMode::Bound => {}
            TcpMode::Listening { .. } | TcpMode::Connecting { .. } => {
                return Err(ReactorError::AlreadyActive)
            }
            TcpMode::Init | TcpMode::Open => return Err(ReactorError::Os(Errno::EINVAL)),
        }
        let fd = match &tcp.fd {
            Some(fd) => fd.as_raw_fd(),
            None => return Err(ReactorError::Os(Errno::EINVAL)),
        };

        net::listen(fd, backlog)?;
        self.poller.add(fd, handle.0.token(), READABLE)?;
        tcp.registered = true;
        tcp.mode = TcpMode::Listening {
            on_connection: Some(Box::new(on_connection)),
            accepted: None,
        };
        inner.active += 1;
        kdebug!("handle {} listening (backlog={})", handle.0, backlog);
        Ok(())
    }

    /// Move the pending connection of `server` into the fresh handle `client`
    pub fn accept(&self, server: TcpHandle, client: TcpHandle) -> ReactorResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        let fresh = inner.handles.tcp_mut(client.0)?;
        if fresh.fd.is_some() || !matches!(fresh.mode, TcpMode::Init) {
            return Err(ReactorError::Os(Errno::EINVAL));
        }

        let listener = inner.handles.tcp_mut(server.0)?;
        let listen_fd = listener.fd.as_ref().map(AsRawFd::as_raw_fd);
        let TcpMode::Listening { accepted, .. } = &mut listener.mode else {
            return Err(ReactorError::Os(Errno::EINVAL));
        };
        let fd = accepted.take().ok_or(ReactorError::WouldBlock)?;

        if let Err(e) = net::set_nodelay(fd.as_raw_fd()) {
            kdebug!("handle {}: TCP_NODELAY failed: {}", client.0, e);
        }
        let fresh = inner.handles.tcp_mut(client.0)?;
        fresh.fd = Some(fd);
        fresh.mode = TcpMode::Open;

        if let Some(lfd) = listen_fd {
            self.poller.modify(lfd, server.0.token(), READABLE)?;
        }
        Ok(())
    }

    /// Start connecting; `on_connect` receives the outcome exactly once
    pub fn connect(
        &self,
        handle: TcpHandle,
        addr: SocketAddr,
        on_connect: impl FnOnce(Status) + 'static,
    ) -> ReactorResult<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let tcp = inner.handles.tcp_mut(handle.0)?;
        match tcp.mode {
            TcpMode::Init | TcpMode::Bound => {}
            TcpMode::Connecting { .. } => return Err(ReactorError::AlreadyActive),
            TcpMode::Open => return Err(ReactorError::Os(Errno::EISCONN)),
            TcpMode::Listening { .. } => return Err(ReactorError::Os(Errno::EINVAL)),
        }
        let fd = match &tcp.fd {
            Some(fd) => fd.as_raw_fd(),
            None => {
                let fd = net::socket_for(&addr)?;
                let raw = fd.as_raw_fd();
                tcp.fd = Some(fd);
                raw
            }
        };

        // Results known right away are still delivered from the loop
        let immediate = match net::connect(fd, &addr) {
            Ok(()) => Some(0),
            Err(Errno::EINPROGRESS) => {
                self.poller.add(fd, handle.0.token(), WRITABLE)?;
                tcp.registered = true;
                None
            }
            Err(e) => Some(errno_status(e)),
        };
        tcp.mode = TcpMode::Connecting {
            on_connect: Some(Box::new(on_connect)),
        };
        inner.active += 1;
        if let Some(status) = immediate {
            inner.pending.push_back(PendingConnect {
                id: handle.0,
                status,
            });
        }
        kdebug!("handle {} connecting to {}", handle.0, addr);
        Ok(())
    }

    pub fn local_addr(&self, handle: TcpHandle) -> ReactorResult<SocketAddr> {
        Ok(net::local_addr(self.fd(handle)?)?)
    }

    pub fn peer_addr(&self, handle: TcpHandle) -> ReactorResult<SocketAddr> {
        Ok(net::peer_addr(self.fd(handle)?)?)
    }

    /// Raw descriptor of a socket handle, for byte I/O done by the caller
    pub fn fd(&self, handle: TcpHandle) -> ReactorResult<RawFd> {
        let inner = self.inner.borrow();
        let tcp = inner.handles.tcp(handle.0)?;
        tcp.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(ReactorError::Os(Errno::ENOTCONN))
    }

    // ------------------------------------------------------------------
    // I/O dispatch
    // ------------------------------------------------------------------

    fn dispatch(&self, ev: Event) {
        let id = HandleId::from_token(ev.token);
        let connecting = {
            let inner = self.inner.borrow();
            match inner.handles.get(id) {
                Some(HandleState::Tcp(tcp)) => match tcp.mode {
                    TcpMode::Listening { .. } => false,
                    TcpMode::Connecting { .. } => true,
                    _ => return,
                },
                // Stale token for a released slot
                _ => return,
            }
        };
        ktrace!("handle {} ready (events={:#x})", id, ev.events);
        if connecting {
            self.on_connect_ready(id);
        } else {
            self.on_listener_ready(id);
        }
    }

    fn on_listener_ready(&self, id: HandleId) {
        let (cb, status) = {
            let mut inner = self.inner.borrow_mut();
            let Ok(tcp) = inner.handles.tcp_mut(id) else { return };
            let Some(lfd) = tcp.fd.as_ref().map(AsRawFd::as_raw_fd) else { return };
            let TcpMode::Listening {
                on_connection,
                accepted,
            } = &mut tcp.mode
            else {
                return;
            };
            if accepted.is_some() {
                return;
            }
            let status = match net::accept(lfd) {
                Ok(fd) => {
                    *accepted = Some(fd);
                    if let Err(e) = self.poller.modify(lfd, id.token(), 0) {
                        kwarn!("handle {}: pausing listener failed: {}", id, e);
                    }
                    0
                }
                Err(Errno::EAGAIN | Errno::EINTR | Errno::ECONNABORTED) => return,
                Err(e) => errno_status(e),
            };
            (on_connection.take(), status)
        };

        if let Some(mut cb) = cb {
            cb(status);
            self.restore_connection_cb(id, cb);
        }
    }

    fn on_connect_ready(&self, id: HandleId) {
        let status = {
            let inner = self.inner.borrow();
            let Ok(tcp) = inner.handles.tcp(id) else { return };
            let Some(fd) = &tcp.fd else { return };
            match net::take_error(fd.as_raw_fd()) {
                Ok(None) => 0,
                Ok(Some(e)) | Err(e) => errno_status(e),
            }
        };
        self.finish_connect(id, status);
    }

    fn finish_connect(&self, id: HandleId, status: Status) {
        let cb = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            // Closed meanwhile: the close phase reports the cancellation
            let Ok(tcp) = inner.handles.tcp_mut(id) else { return };
            let TcpMode::Connecting { on_connect } = &mut tcp.mode else { return };
            let cb = on_connect.take();

            if let (true, Some(fd)) = (tcp.registered, &tcp.fd) {
                if let Err(e) = self.poller.delete(fd.as_raw_fd()) {
                    kwarn!("handle {}: epoll delete failed: {}", id, e);
                }
            }
            tcp.registered = false;
            tcp.mode = TcpMode::Open;
            if status == 0 {
                if let Some(fd) = &tcp.fd {
                    if let Err(e) = net::set_nodelay(fd.as_raw_fd()) {
                        kdebug!("handle {}: TCP_NODELAY failed: {}", id, e);
                    }
                }
            }
            inner.active -= 1;
            cb
        };
        ktrace!("handle {} connect finished: {}", id, status);
        if let Some(cb) = cb {
            cb(status);
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.handles.len() > 0 {
            kdebug!("reactor dropped with {} live handle(s)", inner.handles.len());
        }
    }
}
