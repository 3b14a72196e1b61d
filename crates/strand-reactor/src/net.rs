//! Thin libc socket layer
//!
//! All sockets are non-blocking and close-on-exec. Failures are returned
//! as `Errno` so the reactor can turn them into statuses.

use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;

fn family(addr: &SocketAddr) -> libc::c_int {
    match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    }
}

/// Encode a socket address for the kernel
fn to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(a) => {
            let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = a.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(a.ip().octets());
            // SAFETY: sockaddr_storage is large enough and suitably aligned for any sockaddr
            unsafe { (&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in).write(sin) };
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(a) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = a.port().to_be();
            sin6.sin6_flowinfo = a.flowinfo();
            sin6.sin6_addr.s6_addr = a.ip().octets();
            sin6.sin6_scope_id = a.scope_id();
            unsafe { (&mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6).write(sin6) };
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// Decode a kernel socket address
fn from_sockaddr(storage: &libc::sockaddr_storage) -> Result<SocketAddr, Errno> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            // SAFETY: family says the storage holds a sockaddr_in
            let sin = unsafe { *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 => {
            let sin6 = unsafe { *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => Err(Errno::EAFNOSUPPORT),
    }
}

/// New non-blocking stream socket for `addr`'s family
pub(crate) fn socket_for(addr: &SocketAddr) -> Result<OwnedFd, Errno> {
    let fd = Errno::result(unsafe {
        libc::socket(
            family(addr),
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    })?;
    // SAFETY: freshly created descriptor
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn set_int_opt(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> Result<(), Errno> {
    Errno::result(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub(crate) fn set_reuseaddr(fd: RawFd) -> Result<(), Errno> {
    set_int_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)
}

pub(crate) fn set_nodelay(fd: RawFd) -> Result<(), Errno> {
    set_int_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, 1)
}

pub(crate) fn bind(fd: RawFd, addr: &SocketAddr) -> Result<(), Errno> {
    let (storage, len) = to_sockaddr(addr);
    Errno::result(unsafe {
        libc::bind(fd, &storage as *const libc::sockaddr_storage as *const libc::sockaddr, len)
    })?;
    Ok(())
}

pub(crate) fn listen(fd: RawFd, backlog: i32) -> Result<(), Errno> {
    Errno::result(unsafe { libc::listen(fd, backlog) })?;
    Ok(())
}

/// Take one pending connection off a listening socket
pub(crate) fn accept(fd: RawFd) -> Result<OwnedFd, Errno> {
    let client = Errno::result(unsafe {
        libc::accept4(
            fd,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    })?;
    Ok(unsafe { OwnedFd::from_raw_fd(client) })
}

/// Start a connect; `EINPROGRESS` means wait for writability
pub(crate) fn connect(fd: RawFd, addr: &SocketAddr) -> Result<(), Errno> {
    let (storage, len) = to_sockaddr(addr);
    Errno::result(unsafe {
        libc::connect(fd, &storage as *const libc::sockaddr_storage as *const libc::sockaddr, len)
    })?;
    Ok(())
}

/// Pending socket error (`SO_ERROR`), cleared by reading it
pub(crate) fn take_error(fd: RawFd) -> Result<Option<Errno>, Errno> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    Errno::result(unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    })?;
    Ok(if value == 0 { None } else { Some(Errno::from_raw(value)) })
}

pub(crate) fn local_addr(fd: RawFd) -> Result<SocketAddr, Errno> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    Errno::result(unsafe {
        libc::getsockname(fd, &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr, &mut len)
    })?;
    from_sockaddr(&storage)
}

pub(crate) fn peer_addr(fd: RawFd) -> Result<SocketAddr, Errno> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    Errno::result(unsafe {
        libc::getpeername(fd, &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr, &mut len)
    })?;
    from_sockaddr(&storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_sockaddr_v4() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let (storage, len) = to_sockaddr(&addr);
        assert_eq!(len as usize, mem::size_of::<libc::sockaddr_in>());
        assert_eq!(from_sockaddr(&storage).unwrap(), addr);
    }

    #[test]
    fn test_sockaddr_v6() {
        let addr: SocketAddr = "[::1]:9000".parse().unwrap();
        let (storage, _) = to_sockaddr(&addr);
        assert_eq!(from_sockaddr(&storage).unwrap(), addr);
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let fd = socket_for(&addr).unwrap();
        set_reuseaddr(fd.as_raw_fd()).unwrap();
        bind(fd.as_raw_fd(), &addr).unwrap();
        listen(fd.as_raw_fd(), 16).unwrap();

        let bound = local_addr(fd.as_raw_fd()).unwrap();
        assert_eq!(bound.ip(), addr.ip());
        assert_ne!(bound.port(), 0);
        assert_eq!(accept(fd.as_raw_fd()).err(), Some(Errno::EAGAIN));
    }
}
