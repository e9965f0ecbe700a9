//! The server endpoint: a channel set plus a service thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, info};

use gep_transport::{select_read, FdSet};

use crate::channel_array::ChannelArray;
use crate::codec::Codec;
use crate::config::ProtocolConfig;
use crate::dispatch::DispatchTable;
use crate::error::{ChannelError, Result};

/// Client lifecycle hooks, invoked from the service thread whenever a
/// channel joins or leaves the set. Implementations must not block for
/// long; the service loop waits on them.
pub trait ServerEvents: Send + Sync {
    fn add_client(&self, _id: u32) {}
    fn del_client(&self, _id: u32) {}
}

/// The default hooks: do nothing.
pub struct NoEvents;

impl ServerEvents for NoEvents {}

/// A GEP server: accepts local clients, one channel each, and fans
/// messages out to them.
///
/// `start` opens the listening socket and spawns the service thread;
/// `stop` joins it and drops every channel (firing
/// [`ServerEvents::del_client`] per channel). Broadcast and unicast may
/// be called from any thread, including from inside a handler.
pub struct GepServer<C: Codec> {
    name: String,
    config: Arc<ProtocolConfig>,
    channels: Arc<ChannelArray<C>>,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Codec> GepServer<C> {
    pub fn new(
        name: impl Into<String>,
        max_channels: usize,
        config: ProtocolConfig,
        codec: C,
        ops: DispatchTable<C>,
    ) -> Self {
        Self::with_events(name, max_channels, config, codec, ops, Arc::new(NoEvents))
    }

    /// Construct with client lifecycle hooks.
    pub fn with_events(
        name: impl Into<String>,
        max_channels: usize,
        config: ProtocolConfig,
        codec: C,
        ops: DispatchTable<C>,
        events: Arc<dyn ServerEvents>,
    ) -> Self {
        let name = name.into();
        let config = Arc::new(config);
        let channels = Arc::new(ChannelArray::new(
            format!("{name}_channels"),
            max_channels,
            Arc::clone(&config),
            Arc::new(codec),
            Arc::new(ops),
            events,
        ));
        Self {
            name,
            config,
            channels,
            run: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Open the listening socket and spawn the service thread. With
    /// port 0, the bound port is readable from [`config`](Self::config)
    /// afterwards.
    pub fn start(&mut self) -> Result<()> {
        self.channels.open_listen()?;

        self.run.store(true, Ordering::SeqCst);
        let service = ServerService {
            name: self.name.clone(),
            config: Arc::clone(&self.config),
            channels: Arc::clone(&self.channels),
            run: Arc::clone(&self.run),
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-service", self.name))
            .spawn(move || service.run())
            .map_err(ChannelError::Io)?;
        self.thread = Some(handle);

        info!(name = %self.name, port = self.config.port(), "server thread started");
        Ok(())
    }

    /// Stop the service thread and drop every channel.
    pub fn stop(&mut self) {
        info!(name = %self.name, "stopping server");
        self.run.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.channels.stop();
    }

    /// Broadcast a message to every connected client.
    pub fn send(&self, msg: &C::Msg) -> Result<()> {
        self.channels.broadcast(msg)
    }

    /// Send a message to one client by channel id.
    pub fn send_to(&self, msg: &C::Msg, id: u32) -> Result<()> {
        self.channels.unicast(msg, id)
    }

    pub fn num_clients(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_array(&self) -> &Arc<ChannelArray<C>> {
        &self.channels
    }

    pub fn config(&self) -> &Arc<ProtocolConfig> {
        &self.config
    }

    /// Whether the service thread is (supposed to be) running.
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }
}

impl<C: Codec> Drop for GepServer<C> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

struct ServerService<C: Codec> {
    name: String,
    config: Arc<ProtocolConfig>,
    channels: Arc<ChannelArray<C>>,
    run: Arc<AtomicBool>,
}

impl<C: Codec> ServerService<C> {
    fn run(self) {
        debug!(name = %self.name, "service thread running");

        let Some(listen_fd) = self.channels.listener_fd() else {
            error!(name = %self.name, "invalid server socket");
            return;
        };

        while self.run.load(Ordering::SeqCst) {
            let mut fds = FdSet::new();
            fds.insert(listen_fd);
            self.channels.collect_read_fds(&mut fds);

            match select_read(&mut fds, self.config.select_timeout()) {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    error!(name = %self.name, %err, "service socket select failed");
                    break;
                }
            }

            if !self.run.load(Ordering::SeqCst) {
                break;
            }

            // at most one ready channel per tick
            self.channels.dispatch_reads(&fds);

            if !self.run.load(Ordering::SeqCst) {
                break;
            }

            if fds.contains(listen_fd) {
                if let Err(err) = self.channels.accept_one() {
                    error!(name = %self.name, %err, "accept failed");
                    break;
                }
            }
        }

        debug!(name = %self.name, "service thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::codec::CodecError;

    struct UnitCodec;

    impl Codec for UnitCodec {
        type Msg = ();

        fn serialize(&self, _msg: &()) -> std::result::Result<Vec<u8>, CodecError> {
            Ok(Vec::new())
        }

        fn deserialize(&self, _bytes: &[u8], _msg: &mut ()) -> std::result::Result<(), CodecError> {
            Ok(())
        }

        fn tag_of(&self, _msg: &()) -> u32 {
            0
        }

        fn new_message(&self, _tag: u32) -> Option<()> {
            Some(())
        }
    }

    fn server() -> GepServer<UnitCodec> {
        let mut server = GepServer::new(
            "unit_server",
            4,
            ProtocolConfig::new(0),
            UnitCodec,
            DispatchTable::new(),
        );
        server.config().set_select_timeout_usec(10_000);
        server.start().unwrap();
        server
    }

    #[test]
    fn start_assigns_port_and_stop_clears() {
        let mut server = server();
        let port = server.config().port();
        assert!(port > 0);
        assert!(server.is_running());

        let _client = gep_transport::connect(port).unwrap();
        let deadline = Instant::now() + Duration::from_secs(6);
        while server.num_clients() == 0 {
            assert!(Instant::now() < deadline, "server never saw the client");
            std::thread::sleep(Duration::from_millis(1));
        }

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.num_clients(), 0);
    }

    #[test]
    fn broadcast_with_no_clients_is_ok() {
        let mut server = server();
        server.send(&()).unwrap();
        server.stop();
    }

    #[test]
    fn restart_rebinds_an_ephemeral_port() {
        let mut server = server();
        server.stop();

        server.config().set_port(0);
        server.start().unwrap();
        assert!(server.config().port() > 0);
        server.stop();
    }
}
