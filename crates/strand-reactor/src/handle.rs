//! Handle slab
//!
//! Every reactor resource is a slot in a generational slab. Handles are
//! plain `Copy` ids; a released slot bumps its generation so stale ids
//! (and stale epoll tokens) are rejected instead of aliasing a new handle.

use std::collections::VecDeque;
use std::fmt;
use std::os::fd::OwnedFd;
use std::time::Duration;

use crate::error::{ReactorError, ReactorResult, Status};

/// Callback run on every idle tick or timer fire
pub(crate) type TickCallback = Box<dyn FnMut()>;
/// Callback run once per incoming connection (or listen failure)
pub(crate) type ConnectionCallback = Box<dyn FnMut(Status)>;
/// Callback run once when a connect attempt resolves
pub(crate) type ConnectCallback = Box<dyn FnOnce(Status)>;
/// Callback run once after a handle is released
pub(crate) type CloseCallback = Box<dyn FnOnce()>;

/// Generational slab index identifying a reactor handle
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

impl HandleId {
    /// Slot index
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into an epoll user-data token
    #[inline]
    pub(crate) fn token(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub(crate) fn from_token(token: u64) -> Self {
        Self {
            index: token as u32,
            generation: (token >> 32) as u32,
        }
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.index)
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) HandleId);

        impl $name {
            /// Untyped id of this handle
            #[inline]
            pub fn id(self) -> HandleId {
                self.0
            }
        }

        impl From<$name> for HandleId {
            #[inline]
            fn from(h: $name) -> HandleId {
                h.0
            }
        }
    };
}

typed_handle!(
    /// Watcher that runs its callback once per loop iteration while active
    IdleHandle
);
typed_handle!(
    /// One-shot or repeating timer
    TimerHandle
);
typed_handle!(
    /// TCP socket (listener, client, or accepted connection)
    TcpHandle
);

pub(crate) struct IdleState {
    pub active: bool,
    pub cb: Option<TickCallback>,
}

pub(crate) struct TimerState {
    pub active: bool,
    /// Sequence number of the live heap entry; older entries are stale
    pub seq: u64,
    pub repeat: Duration,
    pub cb: Option<TickCallback>,
}

pub(crate) enum TcpMode {
    /// Socket not created yet, or created but unused
    Init,
    Bound,
    Listening {
        on_connection: Option<ConnectionCallback>,
        /// Connection accepted from the kernel but not yet claimed
        accepted: Option<OwnedFd>,
    },
    Connecting {
        on_connect: Option<ConnectCallback>,
    },
    Open,
}

pub(crate) struct TcpState {
    pub fd: Option<OwnedFd>,
    /// Registered with the poller
    pub registered: bool,
    pub mode: TcpMode,
}

impl TcpState {
    pub fn new() -> Self {
        Self {
            fd: None,
            registered: false,
            mode: TcpMode::Init,
        }
    }

    /// Whether this socket keeps the loop alive
    pub fn is_active(&self) -> bool {
        matches!(self.mode, TcpMode::Listening { .. } | TcpMode::Connecting { .. })
    }
}

pub(crate) enum HandleState {
    Idle(IdleState),
    Timer(TimerState),
    Tcp(TcpState),
    /// `close` was called; the slot is released in the close phase
    Closing,
}

impl HandleState {
    fn kind(&self) -> &'static str {
        match self {
            HandleState::Idle(_) => "idle",
            HandleState::Timer(_) => "timer",
            HandleState::Tcp(_) => "tcp",
            HandleState::Closing => "closing",
        }
    }
}

struct Slot {
    generation: u32,
    state: Option<HandleState>,
}

/// Generational slab of handle states
pub(crate) struct HandleTable {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    live: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            live: 0,
        }
    }

    /// Number of handles not yet released
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn insert(&mut self, state: HandleState) -> HandleId {
        self.live += 1;
        // Reuse the oldest free slot so generations cycle slowly
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.state.is_none());
            slot.state = Some(state);
            return HandleId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            state: Some(state),
        });
        HandleId {
            index,
            generation: 0,
        }
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleState> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.state.as_mut()
    }

    pub fn get(&self, id: HandleId) -> Option<&HandleState> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.state.as_ref()
    }

    /// Release a slot; its id and every copy of it become invalid
    pub fn remove(&mut self, id: HandleId) -> Option<HandleState> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let state = slot.state.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(id.index);
        self.live -= 1;
        Some(state)
    }

    /// Live (non-closing) state of any kind
    pub fn state_mut(&mut self, id: HandleId) -> ReactorResult<&mut HandleState> {
        match self.get_mut(id) {
            None => Err(ReactorError::InvalidHandle),
            Some(HandleState::Closing) => Err(ReactorError::Closing),
            Some(state) => Ok(state),
        }
    }

    pub fn idle_mut(&mut self, id: HandleId) -> ReactorResult<&mut IdleState> {
        match self.state_mut(id)? {
            HandleState::Idle(s) => Ok(s),
            _ => Err(ReactorError::WrongKind { expected: "idle" }),
        }
    }

    pub fn timer_mut(&mut self, id: HandleId) -> ReactorResult<&mut TimerState> {
        match self.state_mut(id)? {
            HandleState::Timer(s) => Ok(s),
            _ => Err(ReactorError::WrongKind { expected: "timer" }),
        }
    }

    pub fn tcp_mut(&mut self, id: HandleId) -> ReactorResult<&mut TcpState> {
        match self.state_mut(id)? {
            HandleState::Tcp(s) => Ok(s),
            _ => Err(ReactorError::WrongKind { expected: "tcp" }),
        }
    }

    pub fn tcp(&self, id: HandleId) -> ReactorResult<&TcpState> {
        match self.get(id) {
            None => Err(ReactorError::InvalidHandle),
            Some(HandleState::Closing) => Err(ReactorError::Closing),
            Some(HandleState::Tcp(s)) => Ok(s),
            Some(_) => Err(ReactorError::WrongKind { expected: "tcp" }),
        }
    }

    /// Kind name for diagnostics
    pub fn kind(&self, id: HandleId) -> Option<&'static str> {
        self.get(id).map(HandleState::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> HandleState {
        HandleState::Idle(IdleState {
            active: false,
            cb: None,
        })
    }

    #[test]
    fn test_token_round_trip() {
        let id = HandleId {
            index: 7,
            generation: 3,
        };
        assert_eq!(HandleId::from_token(id.token()), id);
    }

    #[test]
    fn test_stale_id_rejected_after_reuse() {
        let mut table = HandleTable::new();
        let a = table.insert(idle());
        assert!(table.remove(a).is_some());
        let b = table.insert(idle());

        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());
        assert!(table.remove(a).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_kind_checks() {
        let mut table = HandleTable::new();
        let id = table.insert(idle());
        assert!(table.idle_mut(id).is_ok());
        assert_eq!(
            table.timer_mut(id).err(),
            Some(ReactorError::WrongKind { expected: "timer" })
        );
        assert!(matches!(table.tcp(id), Err(ReactorError::WrongKind { .. })));

        *table.get_mut(id).unwrap() = HandleState::Closing;
        assert_eq!(table.idle_mut(id).err(), Some(ReactorError::Closing));
        assert_eq!(table.kind(id), Some("closing"));
    }
}
