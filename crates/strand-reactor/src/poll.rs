//! epoll backend

use std::cell::RefCell;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;

pub(crate) const READABLE: u32 = libc::EPOLLIN as u32;
pub(crate) const WRITABLE: u32 = libc::EPOLLOUT as u32;

/// One readiness event: the registration token and the ready mask
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    pub token: u64,
    pub events: u32,
}

pub(crate) struct Poller {
    epfd: OwnedFd,
    buf: RefCell<Vec<libc::epoll_event>>,
}

impl Poller {
    pub fn new(max_events: usize) -> Result<Self, Errno> {
        let fd = Errno::result(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // SAFETY: epoll_create1 just returned this descriptor and nothing else owns it
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        let buf = vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)];
        Ok(Self {
            epfd,
            buf: RefCell::new(buf),
        })
    }

    fn ctl(&self, op: i32, fd: RawFd, token: u64, events: u32) -> Result<(), Errno> {
        let mut ev = libc::epoll_event { events, u64: token };
        Errno::result(unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) })?;
        Ok(())
    }

    pub fn add(&self, fd: RawFd, token: u64, events: u32) -> Result<(), Errno> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, events)
    }

    /// Change the interest mask; `0` keeps the registration but silences it
    pub fn modify(&self, fd: RawFd, token: u64, events: u32) -> Result<(), Errno> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, events)
    }

    pub fn delete(&self, fd: RawFd) -> Result<(), Errno> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0)
    }

    /// Wait for readiness. `None` blocks until an event arrives.
    ///
    /// An interrupted wait reports no events.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Event>, Errno> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => {
                // Round up so a wake never lands before the deadline
                let ms = d.as_nanos().div_ceil(1_000_000);
                ms.min(i32::MAX as u128) as i32
            }
        };

        let mut buf = self.buf.borrow_mut();
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                buf.as_mut_ptr(),
                buf.len() as i32,
                timeout_ms,
            )
        };
        match Errno::result(n) {
            Ok(n) => Ok(buf[..n as usize]
                .iter()
                .map(|ev| Event {
                    token: ev.u64,
                    events: ev.events,
                })
                .collect()),
            Err(Errno::EINTR) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_empty_wait_times_out() {
        let poller = Poller::new(8).unwrap();
        let start = Instant::now();
        let events = poller.wait(Some(Duration::from_millis(20))).unwrap();
        assert!(events.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pipe_readiness() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) }, 0);
        let (rd, wr) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        let poller = Poller::new(8).unwrap();
        poller.add(rd.as_raw_fd(), 42, READABLE).unwrap();
        assert!(poller.wait(Some(Duration::ZERO)).unwrap().is_empty());

        let byte = 1u8;
        assert_eq!(unsafe { libc::write(wr.as_raw_fd(), &byte as *const u8 as *const _, 1) }, 1);
        let events = poller.wait(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token, 42);
        assert_ne!(events[0].events & READABLE, 0);

        poller.modify(rd.as_raw_fd(), 42, 0).unwrap();
        assert!(poller.wait(Some(Duration::ZERO)).unwrap().is_empty());
        poller.delete(rd.as_raw_fd()).unwrap();
    }
}
