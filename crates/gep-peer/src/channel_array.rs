//! The server-side set of channels.

use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};

use gep_transport::{peer_ip, FdSet};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::config::ProtocolConfig;
use crate::dispatch::DispatchTable;
use crate::error::{ChannelError, Result};
use crate::server::ServerEvents;

/// Accepted channels plus the listening socket.
///
/// Membership has its own mutex, separate from each channel's socket
/// lock, so a handler that broadcasts from inside a dispatch does not
/// re-enter a held lock. The Add/DelClient callbacks fire after the
/// membership lock is released for the same reason.
pub struct ChannelArray<C: Codec> {
    name: String,
    max_channels: usize,
    channels: Mutex<Vec<Arc<Channel<C>>>>,
    listener: Mutex<Option<TcpListener>>,
    last_id: AtomicU32,
    config: Arc<ProtocolConfig>,
    codec: Arc<C>,
    ops: Arc<DispatchTable<C>>,
    events: Arc<dyn ServerEvents>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

impl<C: Codec> ChannelArray<C> {
    pub fn new(
        name: impl Into<String>,
        max_channels: usize,
        config: Arc<ProtocolConfig>,
        codec: Arc<C>,
        ops: Arc<DispatchTable<C>>,
        events: Arc<dyn ServerEvents>,
    ) -> Self {
        Self {
            name: name.into(),
            max_channels,
            channels: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            last_id: AtomicU32::new(0),
            config,
            codec,
            ops,
            events,
        }
    }

    /// Bind and listen on the configured loopback port. With port 0 the
    /// OS-assigned port is written back into the config.
    pub fn open_listen(&self) -> Result<()> {
        let listener = gep_transport::bind_listener(self.config.port())?;
        if self.config.port() == 0 {
            self.config.set_port(gep_transport::local_port(&listener)?);
        }
        debug!(name = %self.name, port = self.config.port(), "open server socket");
        *lock(&self.listener) = Some(listener);
        Ok(())
    }

    pub(crate) fn listener_fd(&self) -> Option<RawFd> {
        lock(&self.listener)
            .as_ref()
            .map(|listener| listener.as_raw_fd())
    }

    /// Accept one pending connection and add a channel for it.
    pub fn accept_one(&self) -> Result<()> {
        let stream = {
            let guard = lock(&self.listener);
            let Some(listener) = guard.as_ref() else {
                return Err(ChannelError::NotConnected);
            };
            gep_transport::accept(listener).map_err(|err| {
                error!(name = %self.name, %err, "cannot accept new connection");
                err
            })?
        };
        debug!(name = %self.name, peer = %peer_ip(&stream), "accepted connection");
        self.add(stream)
    }

    /// Wrap an accepted socket in a new channel, enforcing the cap.
    fn add(&self, stream: std::net::TcpStream) -> Result<()> {
        let id = {
            let mut channels = lock(&self.channels);
            if channels.len() >= self.max_channels {
                error!(name = %self.name, max = self.max_channels, "too many clients");
                return Err(ChannelError::TooManyClients(self.max_channels));
            }
            let id = self.last_id.fetch_add(1, Ordering::SeqCst);
            let channel = Arc::new(Channel::new(
                id,
                "gep_channel",
                Arc::clone(&self.config),
                Arc::clone(&self.codec),
                Arc::clone(&self.ops),
            ));
            channel.set_socket(stream);
            debug!(name = %self.name, channel = id, "added channel");
            channels.push(channel);
            id
        };
        self.events.add_client(id);
        Ok(())
    }

    /// Send a message to every open channel. Per-channel failures do
    /// not stop the loop; the last failure is returned.
    pub fn broadcast(&self, msg: &C::Msg) -> Result<()> {
        let channels = lock(&self.channels);
        let mut result = Ok(());
        for channel in channels.iter() {
            if !channel.is_open() {
                continue;
            }
            if let Err(err) = channel.send(msg) {
                warn!(name = %self.name, channel = channel.id(), %err, "broadcast send failed");
                result = Err(err);
            }
        }
        result
    }

    /// Send a message to the channel with the given id.
    pub fn unicast(&self, msg: &C::Msg, id: u32) -> Result<()> {
        let channels = lock(&self.channels);
        for channel in channels.iter() {
            if channel.id() == id && channel.is_open() {
                return channel.send(msg);
            }
        }
        Err(ChannelError::NoSuchChannel(id))
    }

    /// Number of channels currently in the set.
    pub fn len(&self) -> usize {
        lock(&self.channels).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.channels).is_empty()
    }

    /// The channel at a position in the set, if any. Positions shift
    /// when channels are removed; this is a diagnostics accessor.
    pub fn channel(&self, index: usize) -> Option<Arc<Channel<C>>> {
        lock(&self.channels).get(index).cloned()
    }

    /// Union of all open channel sockets into a select set.
    pub(crate) fn collect_read_fds(&self, fds: &mut FdSet) {
        let channels = lock(&self.channels);
        for channel in channels.iter() {
            match channel.raw_fd() {
                Some(fd) => fds.insert(fd),
                None => {
                    error!(name = %self.name, channel = channel.id(), "channel has no socket");
                }
            }
        }
    }

    /// Process at most one ready channel. On a receive error the
    /// channel is removed from the set and DelClient fires.
    ///
    /// One channel per tick keeps the membership invariants simple
    /// after an erase; the service loop selects again immediately.
    pub(crate) fn dispatch_reads(&self, ready: &FdSet) {
        let target = {
            let channels = lock(&self.channels);
            channels
                .iter()
                .find(|channel| {
                    channel
                        .raw_fd()
                        .is_some_and(|fd| ready.contains(fd))
                })
                .cloned()
        };

        let Some(channel) = target else { return };

        if let Err(err) = channel.recv_data() {
            warn!(name = %self.name, channel = channel.id(), %err,
                  "channel receive failed, removing");
            let removed = {
                let mut channels = lock(&self.channels);
                channels
                    .iter()
                    .position(|other| Arc::ptr_eq(other, &channel))
                    .map(|pos| channels.remove(pos))
            };
            if let Some(channel) = removed {
                self.events.del_client(channel.id());
                channel.close();
            }
        }
    }

    /// Tear down: close the listening socket, then every channel
    /// (firing DelClient for each), then clear the set.
    pub fn stop(&self) {
        if let Some(listener) = lock(&self.listener).take() {
            debug!(name = %self.name, fd = listener.as_raw_fd(), "closing server socket");
            drop(listener);
        }

        let drained: Vec<_> = std::mem::take(&mut *lock(&self.channels));
        for channel in drained {
            self.events.del_client(channel.id());
            channel.close();
        }
    }
}
