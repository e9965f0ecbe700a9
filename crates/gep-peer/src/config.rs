//! Endpoint-wide protocol configuration.

use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use gep_frame::DEFAULT_MAGIC;

/// Default select timeout for the service loops: 1 s.
pub const DEFAULT_SELECT_TIMEOUT_USEC: u64 = 1_000_000;

/// Default per-frame send budget: 5 ms.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5;

/// Shared, endpoint-wide knobs. One instance per endpoint, referenced
/// by every channel of that endpoint. All fields are atomics so the
/// service thread and external senders read them without a lock.
#[derive(Debug)]
pub struct ProtocolConfig {
    port: AtomicU16,
    magic: AtomicU32,
    select_timeout_usec: AtomicU64,
    send_timeout_ms: AtomicU64,
}

impl ProtocolConfig {
    /// Config for a given TCP port. Port 0 requests an ephemeral port,
    /// written back by the server after bind.
    pub fn new(port: u16) -> Self {
        Self {
            port: AtomicU16::new(port),
            magic: AtomicU32::new(DEFAULT_MAGIC),
            select_timeout_usec: AtomicU64::new(DEFAULT_SELECT_TIMEOUT_USEC),
            send_timeout_ms: AtomicU64::new(DEFAULT_SEND_TIMEOUT_MS),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    pub fn magic(&self) -> u32 {
        self.magic.load(Ordering::SeqCst)
    }

    pub fn set_magic(&self, magic: u32) {
        self.magic.store(magic, Ordering::SeqCst);
    }

    pub fn select_timeout_usec(&self) -> u64 {
        self.select_timeout_usec.load(Ordering::SeqCst)
    }

    pub fn set_select_timeout_usec(&self, usec: u64) {
        self.select_timeout_usec.store(usec, Ordering::SeqCst);
    }

    /// The select timeout as a [`Duration`], for the service loops.
    pub fn select_timeout(&self) -> Duration {
        Duration::from_micros(self.select_timeout_usec())
    }

    pub fn send_timeout_ms(&self) -> u64 {
        self.send_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn set_send_timeout_ms(&self, ms: u64) {
        self.send_timeout_ms.store(ms, Ordering::SeqCst);
    }

    /// The per-frame send budget as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
