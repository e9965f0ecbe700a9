use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listen backlog for the server socket.
pub const LISTEN_BACKLOG: libc::c_int = 4;

/// `SO_PRIORITY` applied to every connected socket (Linux only).
pub const SOCKET_PRIORITY: libc::c_int = 4;

/// Connect to a GEP server on `127.0.0.1:port` and configure the stream
/// (non-blocking, no-delay, priority).
pub fn connect(port: u16) -> Result<TcpStream> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let stream =
        TcpStream::connect(addr).map_err(|source| TransportError::Connect { port, source })?;
    configure_stream(&stream)?;
    debug!(port, fd = stream.as_raw_fd(), "connected client socket");
    Ok(stream)
}

/// Bind a non-blocking listening socket to `127.0.0.1:port` with
/// `SO_REUSEADDR` set before the bind. `port == 0` requests an
/// OS-assigned port; read it back with [`local_port`].
pub fn bind_listener(port: u16) -> Result<TcpListener> {
    let bind_err = |source| TransportError::Bind { port, source };

    // std::net::TcpListener::bind gives no hook to set SO_REUSEADDR
    // before the bind, so the socket is assembled from libc calls and
    // only then handed to std.
    // SAFETY: plain socket(2); the descriptor is checked before use.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(bind_err(std::io::Error::last_os_error()));
    }

    let close_on_err = |fd: RawFd, source: std::io::Error| {
        // SAFETY: fd is an open socket owned by this function.
        unsafe { libc::close(fd) };
        bind_err(source)
    };

    let one: libc::c_int = 1;
    // SAFETY: fd is a valid socket; `one` outlives the call and its size
    // is passed explicitly.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            (&one as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(close_on_err(fd, std::io::Error::last_os_error()));
    }

    // SAFETY: sockaddr_in is a plain C struct; all-zero is a valid
    // initial state for the fields not set below.
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr.s_addr = u32::from(Ipv4Addr::LOCALHOST).to_be();

    // SAFETY: `addr` is a properly initialized sockaddr_in and the
    // length argument matches its size.
    let rc = unsafe {
        libc::bind(
            fd,
            (&addr as *const libc::sockaddr_in).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(close_on_err(fd, std::io::Error::last_os_error()));
    }

    // SAFETY: fd is a bound socket.
    let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if rc != 0 {
        return Err(close_on_err(fd, std::io::Error::last_os_error()));
    }

    // SAFETY: fd is an open, owned listening socket; from_raw_fd takes
    // ownership of it.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };
    listener.set_nonblocking(true).map_err(bind_err)?;

    info!(
        port = listener.local_addr().map_err(bind_err)?.port(),
        "listening on loopback"
    );
    Ok(listener)
}

/// Accept one pending connection and configure the new stream.
pub fn accept(listener: &TcpListener) -> Result<TcpStream> {
    let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
    configure_stream(&stream)?;
    debug!(%peer, fd = stream.as_raw_fd(), "accepted connection");
    Ok(stream)
}

/// Apply the per-connection socket options: non-blocking, `TCP_NODELAY`,
/// and the GEP socket priority.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nonblocking(true).map_err(TransportError::Io)?;
    stream.set_nodelay(true).map_err(TransportError::Io)?;
    set_priority(stream.as_raw_fd(), SOCKET_PRIORITY);
    Ok(())
}

/// Set `SO_PRIORITY` on a socket. Priority is best-effort: a failure is
/// logged, not propagated.
#[cfg(target_os = "linux")]
pub fn set_priority(fd: RawFd, prio: libc::c_int) {
    use tracing::warn;

    // SAFETY: fd is an open socket; `prio` outlives the call and its
    // size is passed explicitly.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PRIORITY,
            (&prio as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(fd, prio, error = %std::io::Error::last_os_error(), "cannot set socket priority");
    }
}

/// `SO_PRIORITY` does not exist on this platform.
#[cfg(not(target_os = "linux"))]
pub fn set_priority(_fd: RawFd, _prio: libc::c_int) {}

/// The port a listener is actually bound to (meaningful after binding
/// port 0).
pub fn local_port(listener: &TcpListener) -> Result<u16> {
    Ok(listener.local_addr().map_err(TransportError::Io)?.port())
}

/// Peer address for diagnostics; `"unknown"` if the socket cannot say.
pub fn peer_ip(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| String::from("unknown"))
}
