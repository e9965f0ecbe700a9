//! The client endpoint: one channel plus a service thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use gep_transport::{select_read, FdSet};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::config::ProtocolConfig;
use crate::dispatch::DispatchTable;
use crate::error::{ChannelError, Result};

/// Backoff after a failed reconnect attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// How often the backoff sleep polls the run flag, so Stop is not held
/// up by a reconnect wait.
const BACKOFF_POLL: Duration = Duration::from_millis(100);

/// A GEP client: one outbound channel to a local server, driven by a
/// service thread that selects, dispatches and reconnects.
///
/// `start` connects and spawns the thread; `stop` joins it and closes
/// the channel. The pair may be called repeatedly. Any number of
/// threads may call [`send`](GepClient::send) concurrently with the
/// service thread.
pub struct GepClient<C: Codec> {
    name: String,
    config: Arc<ProtocolConfig>,
    channel: Arc<Channel<C>>,
    run: Arc<AtomicBool>,
    reconnect_count: Arc<AtomicU32>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Codec> GepClient<C> {
    pub fn new(
        name: impl Into<String>,
        config: ProtocolConfig,
        codec: C,
        ops: DispatchTable<C>,
    ) -> Self {
        let name = name.into();
        let config = Arc::new(config);
        let channel = Arc::new(Channel::new(
            0,
            name.clone(),
            Arc::clone(&config),
            Arc::new(codec),
            Arc::new(ops),
        ));
        Self {
            name,
            config,
            channel,
            run: Arc::new(AtomicBool::new(false)),
            reconnect_count: Arc::new(AtomicU32::new(0)),
            thread: None,
        }
    }

    /// Connect and spawn the service thread. Fails without spawning if
    /// the initial connect fails.
    pub fn start(&mut self) -> Result<()> {
        self.channel.open_client().map_err(|err| {
            error!(name = %self.name, "cannot open server socket");
            err
        })?;

        self.run.store(true, Ordering::SeqCst);
        let service = ClientService {
            name: self.name.clone(),
            config: Arc::clone(&self.config),
            channel: Arc::clone(&self.channel),
            run: Arc::clone(&self.run),
            reconnect_count: Arc::clone(&self.reconnect_count),
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-service", self.name))
            .spawn(move || service.run())
            .map_err(ChannelError::Io)?;
        self.thread = Some(handle);

        info!(name = %self.name, "client thread started");
        Ok(())
    }

    /// Stop the service thread, close the channel, reset the reconnect
    /// counter.
    pub fn stop(&mut self) {
        info!(name = %self.name, "stopping client");
        self.run.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.channel.close();
        self.reconnect_count.store(0, Ordering::SeqCst);
    }

    /// Send one message on the channel.
    pub fn send(&self, msg: &C::Msg) -> Result<()> {
        self.channel.send(msg)
    }

    pub fn channel(&self) -> &Arc<Channel<C>> {
        &self.channel
    }

    pub fn config(&self) -> &Arc<ProtocolConfig> {
        &self.config
    }

    /// How many times the service thread re-established the connection
    /// since the last start.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    /// Whether the service thread is (supposed to be) running.
    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }
}

impl<C: Codec> Drop for GepClient<C> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

struct ClientService<C: Codec> {
    name: String,
    config: Arc<ProtocolConfig>,
    channel: Arc<Channel<C>>,
    run: Arc<AtomicBool>,
    reconnect_count: Arc<AtomicU32>,
}

impl<C: Codec> ClientService<C> {
    fn run(self) {
        debug!(name = %self.name, "service thread running");

        while self.run.load(Ordering::SeqCst) {
            let Some(fd) = self.channel.raw_fd() else {
                self.reconnect();
                continue;
            };

            let mut fds = FdSet::new();
            fds.insert(fd);
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

            if fds.contains(fd) {
                if let Err(err) = self.channel.recv_data() {
                    // toss the connection; the next tick reconnects
                    warn!(name = %self.name, %err, "connection reset by peer");
                    self.channel.close();
                }
            }
        }

        debug!(name = %self.name, "service thread exiting");
    }

    fn reconnect(&self) {
        warn!(name = %self.name, "reconnecting to server socket");
        if self.channel.open_client().is_err() {
            error!(name = %self.name, "cannot open server socket");
            let deadline = Instant::now() + RECONNECT_BACKOFF;
            while Instant::now() < deadline && self.run.load(Ordering::SeqCst) {
                std::thread::sleep(BACKOFF_POLL);
            }
        } else {
            warn!(name = %self.name, "reconnected");
            self.reconnect_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn start_fails_with_no_server() {
        // nothing listens on the ephemeral port we grab and release
        let listener = gep_transport::bind_listener(0).unwrap();
        let port = gep_transport::local_port(&listener).unwrap();
        drop(listener);

        let mut client = GepClient::new(
            "lonely_client",
            ProtocolConfig::new(port),
            UnitCodec,
            DispatchTable::new(),
        );
        assert!(client.start().is_err());
        assert!(!client.is_running());
        assert!(!client.channel().is_open());
    }

    #[test]
    fn stop_resets_reconnect_count_and_closes() {
        let listener = gep_transport::bind_listener(0).unwrap();
        let port = gep_transport::local_port(&listener).unwrap();

        let mut client = GepClient::new(
            "brief_client",
            ProtocolConfig::new(port),
            UnitCodec,
            DispatchTable::new(),
        );
        client.start().unwrap();
        assert!(client.is_running());
        assert!(client.channel().is_open());

        client.stop();
        assert!(!client.is_running());
        assert!(!client.channel().is_open());
        assert_eq!(client.reconnect_count(), 0);
    }

    #[test]
    fn send_while_disconnected_is_not_connected() {
        let client = GepClient::new(
            "idle_client",
            ProtocolConfig::new(1),
            UnitCodec,
            DispatchTable::new(),
        );
        let err = client.send(&()).unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }
}
