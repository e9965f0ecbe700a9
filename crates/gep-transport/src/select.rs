//! Readiness selection over raw descriptors.
//!
//! The service loops block in `select(2)` with the endpoint timeout so
//! that Stop is observed within one tick. `EINTR` is surfaced as
//! `ErrorKind::Interrupted`; callers retry.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// A set of descriptors to watch, wrapping `libc::fd_set`.
pub struct FdSet {
    set: libc::fd_set,
    max_fd: RawFd,
}

impl FdSet {
    pub fn new() -> Self {
        // SAFETY: an all-zero fd_set is the state FD_ZERO produces.
        let mut set: libc::fd_set = unsafe { std::mem::zeroed() };
        // SAFETY: `set` is a valid fd_set for the duration of the call.
        unsafe { libc::FD_ZERO(&mut set) };
        Self { set, max_fd: -1 }
    }

    /// Add a descriptor to the set.
    pub fn insert(&mut self, fd: RawFd) {
        debug_assert!(fd >= 0 && fd < libc::FD_SETSIZE as RawFd);
        // SAFETY: fd is a valid descriptor below FD_SETSIZE.
        unsafe { libc::FD_SET(fd, &mut self.set) };
        self.max_fd = self.max_fd.max(fd);
    }

    /// Whether a descriptor is in the set. After [`select_read`]
    /// returns, membership means readiness.
    pub fn contains(&self, fd: RawFd) -> bool {
        if fd < 0 {
            return false;
        }
        // SAFETY: fd is a valid descriptor below FD_SETSIZE.
        unsafe { libc::FD_ISSET(fd, &self.set) }
    }

    pub fn is_empty(&self) -> bool {
        self.max_fd < 0
    }

    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

fn timeval_from(timeout: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    }
}

/// Wait until a descriptor in `fds` is readable or the timeout elapses.
///
/// Returns the number of ready descriptors (0 on timeout). On return,
/// `fds` holds only the ready descriptors.
pub fn select_read(fds: &mut FdSet, timeout: Duration) -> io::Result<usize> {
    let mut tv = timeval_from(timeout);
    // SAFETY: the set and timeval are valid for the duration of the
    // call; nfds is one past the highest descriptor in the set.
    let n = unsafe {
        libc::select(
            fds.max_fd + 1,
            &mut fds.set,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut tv,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Wait until `fd` is writable or the timeout elapses. Returns whether
/// the descriptor became writable.
pub fn select_write(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut fds = FdSet::new();
    fds.insert(fd);
    let mut tv = timeval_from(timeout);
    // SAFETY: as in select_read, with the set in the write position.
    let n = unsafe {
        libc::select(
            fd + 1,
            std::ptr::null_mut(),
            &mut fds.set,
            std::ptr::null_mut(),
            &mut tv,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn empty_set_contains_nothing() {
        let fds = FdSet::new();
        assert!(fds.is_empty());
        assert!(!fds.contains(0));
        assert_eq!(fds.max_fd(), -1);
    }

    #[test]
    fn select_times_out_on_idle_socket() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut fds = FdSet::new();
        fds.insert(left.as_raw_fd());

        let n = select_read(&mut fds, Duration::from_millis(20)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn select_reports_readable_socket() {
        let (left, mut right) = UnixStream::pair().unwrap();
        right.write_all(b"x").unwrap();

        let mut fds = FdSet::new();
        fds.insert(left.as_raw_fd());

        let n = select_read(&mut fds, Duration::from_secs(1)).unwrap();
        assert_eq!(n, 1);
        assert!(fds.contains(left.as_raw_fd()));
    }

    #[test]
    fn select_keeps_only_ready_descriptors() {
        let (ready_rx, mut ready_tx) = UnixStream::pair().unwrap();
        let (idle_rx, _idle_tx) = UnixStream::pair().unwrap();
        ready_tx.write_all(b"x").unwrap();

        let mut fds = FdSet::new();
        fds.insert(ready_rx.as_raw_fd());
        fds.insert(idle_rx.as_raw_fd());

        let n = select_read(&mut fds, Duration::from_secs(1)).unwrap();
        assert_eq!(n, 1);
        assert!(fds.contains(ready_rx.as_raw_fd()));
        assert!(!fds.contains(idle_rx.as_raw_fd()));
    }

    #[test]
    fn fresh_socket_is_writable() {
        let (left, _right) = UnixStream::pair().unwrap();
        let writable = select_write(left.as_raw_fd(), Duration::from_secs(1)).unwrap();
        assert!(writable);
    }
}
