//! A single full-duplex framed connection.

use std::io::Read;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;
use tracing::{debug, error, warn};

use gep_frame::{scan_header, tag_string, write_header, FrameError, HEADER_LEN, MAX_MSG_LEN, MAX_VALUE_LEN};
use gep_transport::full_send;

use crate::codec::Codec;
use crate::config::ProtocolConfig;
use crate::dispatch::DispatchTable;
use crate::error::{ChannelError, Result};

/// Receive buffer: capacity is the maximum frame length, `len` bytes
/// occupied. `buf[..len]` is always unconsumed wire data with completed
/// frames removed from the front.
struct RecvBuf {
    buf: Box<[u8]>,
    len: usize,
}

impl RecvBuf {
    fn new() -> Self {
        Self {
            buf: vec![0u8; MAX_MSG_LEN].into_boxed_slice(),
            len: 0,
        }
    }
}

/// One framed connection between two peers.
///
/// The socket handle lives behind its own mutex: senders hold it for a
/// whole frame so header and value stay adjacent on the wire, the
/// receive path holds it only across the recv syscall so that handlers
/// can send from inside a callback without self-deadlock.
pub struct Channel<C: Codec> {
    name: String,
    id: u32,
    socket: Mutex<Option<TcpStream>>,
    recv: Mutex<RecvBuf>,
    config: Arc<ProtocolConfig>,
    codec: Arc<C>,
    ops: Arc<DispatchTable<C>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

impl<C: Codec> Channel<C> {
    /// A closed channel. It goes live via [`open_client`] or when the
    /// server attaches an accepted socket.
    ///
    /// [`open_client`]: Channel::open_client
    pub fn new(
        id: u32,
        name: impl Into<String>,
        config: Arc<ProtocolConfig>,
        codec: Arc<C>,
        ops: Arc<DispatchTable<C>>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            socket: Mutex::new(None),
            recv: Mutex::new(RecvBuf::new()),
            config,
            codec,
            ops,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        lock(&self.socket).is_some()
    }

    /// A clone of the socket handle, if the channel is open. Intended
    /// for diagnostics and tests; bytes written through the clone
    /// bypass framing.
    pub fn socket(&self) -> Option<TcpStream> {
        lock(&self.socket)
            .as_ref()
            .and_then(|stream| stream.try_clone().ok())
    }

    /// Bytes currently buffered ahead of a complete frame.
    pub fn buffered_len(&self) -> usize {
        lock(&self.recv).len
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        lock(&self.socket).as_ref().map(|stream| stream.as_raw_fd())
    }

    /// Attach an accepted socket to this channel.
    pub(crate) fn set_socket(&self, stream: TcpStream) {
        let mut guard = lock(&self.socket);
        debug!(name = %self.name, channel = self.id, fd = stream.as_raw_fd(), "attached socket");
        *guard = Some(stream);
    }

    /// Connect to the configured loopback port and store the socket.
    pub fn open_client(&self) -> Result<()> {
        let port = self.config.port();
        let stream = gep_transport::connect(port).map_err(|err| {
            error!(name = %self.name, channel = self.id, port, "cannot open client socket");
            err
        })?;

        // a fresh connection never inherits buffered bytes
        lock(&self.recv).len = 0;
        let mut guard = lock(&self.socket);
        debug!(name = %self.name, channel = self.id, fd = stream.as_raw_fd(), "open client socket");
        *guard = Some(stream);
        Ok(())
    }

    /// Close the channel and discard any buffered bytes. Safe on an
    /// already-closed channel; returns whether a socket was closed.
    pub fn close(&self) -> bool {
        let stream = lock(&self.socket).take();
        match stream {
            Some(stream) => {
                debug!(name = %self.name, channel = self.id, fd = stream.as_raw_fd(), "closed socket");
                drop(stream);
                // the receive path may be mid-scan when a handler closes
                // its own channel; the buffer is then cleared on reopen
                if let Ok(mut rb) = self.recv.try_lock() {
                    rb.len = 0;
                }
                true
            }
            None => false,
        }
    }

    /// Serialize and send one message as a single frame.
    ///
    /// A codec failure is returned without touching the socket. The
    /// socket lock is held across header and value so the frame is
    /// contiguous on the wire.
    pub fn send(&self, msg: &C::Msg) -> Result<()> {
        let value = self.codec.serialize(msg).map_err(|err| {
            error!(name = %self.name, channel = self.id, %err, "cannot serialize message");
            err
        })?;
        let tag = self.codec.tag_of(msg);
        self.send_frame(tag, &value)
    }

    fn send_frame(&self, tag: u32, value: &[u8]) -> Result<()> {
        let mut guard = lock(&self.socket);
        let Some(stream) = guard.as_mut() else {
            return Err(ChannelError::NotConnected);
        };

        let timeout = self.config.send_timeout();
        let mut header = BytesMut::with_capacity(HEADER_LEN);
        write_header(self.config.magic(), tag, value.len(), &mut header);

        full_send(stream, &header, timeout).map_err(|err| {
            error!(name = %self.name, channel = self.id, tag = %tag_string(tag), %err,
                   "failed sending frame header");
            ChannelError::from(err)
        })?;

        if value.is_empty() {
            return Ok(());
        }

        full_send(stream, value, timeout).map_err(|err| {
            error!(name = %self.name, channel = self.id, tag = %tag_string(tag), %err,
                   "failed sending frame value");
            ChannelError::from(err)
        })?;

        debug!(name = %self.name, channel = self.id, tag = %tag_string(tag),
               bytes = HEADER_LEN + value.len(), "sent message");
        Ok(())
    }

    /// Non-blocking read plus frame extraction and dispatch.
    ///
    /// Appends one recv's worth of bytes to the buffer, then consumes
    /// every complete frame in it. An `Ok` return may leave a partial
    /// frame buffered. Errors are fatal for the channel: the caller
    /// closes it (and, on the client, reconnects).
    pub fn recv_data(&self) -> Result<()> {
        let mut rb = lock(&self.recv);

        if rb.len >= rb.buf.len() {
            error!(name = %self.name, channel = self.id, len = rb.len, "receive buffer full");
            return Err(ChannelError::BufferFull { len: rb.len });
        }

        let read = {
            let guard = lock(&self.socket);
            let Some(stream) = guard.as_ref() else {
                error!(name = %self.name, channel = self.id, "recv on closed channel");
                return Err(ChannelError::NotConnected);
            };
            let len = rb.len;
            (&*stream).read(&mut rb.buf[len..])
        };

        match read {
            Ok(0) => {
                debug!(name = %self.name, channel = self.id, "socket closed by peer");
                Err(ChannelError::PeerClosed)
            }
            Ok(n) => {
                rb.len += n;
                self.recv_scan(&mut rb)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                // spurious readiness; nothing arrived, nothing to do
                Ok(())
            }
            Err(err) => {
                error!(name = %self.name, channel = self.id, %err, "recv failed");
                Err(ChannelError::Io(err))
            }
        }
    }

    /// Consume complete frames from the front of the buffer.
    ///
    /// Per frame: scan the header, bounds-check the length, dispatch,
    /// then shift the remainder to the front. An unsupported tag skips
    /// the frame and keeps going; an invalid magic or oversized length
    /// clears the buffer and is fatal.
    fn recv_scan(&self, rb: &mut RecvBuf) -> Result<()> {
        let magic = self.config.magic();

        while rb.len >= HEADER_LEN {
            let Some(header) = scan_header(&rb.buf[..rb.len], magic) else {
                let word = u32::from_be_bytes([rb.buf[0], rb.buf[1], rb.buf[2], rb.buf[3]]);
                error!(name = %self.name, channel = self.id, word = %tag_string(word),
                       "wrong magic number");
                rb.len = 0;
                return Err(FrameError::InvalidMagic { word }.into());
            };

            if header.value_len >= MAX_VALUE_LEN {
                error!(name = %self.name, channel = self.id, len = header.value_len,
                       max = MAX_VALUE_LEN, "value length too large");
                rb.len = 0;
                return Err(FrameError::ValueTooLarge {
                    len: header.value_len,
                    max: MAX_VALUE_LEN,
                }
                .into());
            }

            let frame_len = header.frame_len();
            if rb.len < frame_len {
                debug!(name = %self.name, channel = self.id, have = rb.len, need = frame_len,
                       "frame is fragmented");
                return Ok(());
            }

            if let Err(err) = self.dispatch_frame(header.tag, &rb.buf[HEADER_LEN..frame_len]) {
                rb.len = 0;
                return Err(err);
            }

            let remain = rb.len - frame_len;
            if remain > 0 {
                rb.buf.copy_within(frame_len..rb.len, 0);
                debug!(name = %self.name, channel = self.id, left = remain,
                       "frames left in buffer");
            }
            rb.len = remain;
        }
        Ok(())
    }

    /// Decode one frame's value and run its handler.
    fn dispatch_frame(&self, tag: u32, value: &[u8]) -> Result<()> {
        let Some(handler) = self.ops.get(tag) else {
            warn!(name = %self.name, channel = self.id, tag = %tag_string(tag),
                  bytes = value.len(), "unsupported tag, dropping frame");
            return Ok(());
        };

        let Some(mut msg) = self.codec.new_message(tag) else {
            warn!(name = %self.name, channel = self.id, tag = %tag_string(tag),
                  "codec has no message for tag, dropping frame");
            return Ok(());
        };

        if let Err(err) = self.codec.deserialize(value, &mut msg) {
            warn!(name = %self.name, channel = self.id, tag = %tag_string(tag),
                  bytes = value.len(), %err, "unpackable message");
            return Err(err.into());
        }

        debug!(name = %self.name, channel = self.id, tag = %tag_string(tag),
               bytes = value.len(), "received message");

        let ret = handler(&msg, self);
        if ret < 0 {
            warn!(name = %self.name, channel = self.id, tag = %tag_string(tag), ret,
                  "callback error");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_buffered_len(&self, len: usize) {
        lock(&self.recv).len = len;
    }
}

impl<C: Codec> std::fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}
