//! GEP channel state machine and endpoints.
//!
//! A [`Channel`] is one full-duplex framed TCP connection. A
//! [`GepClient`] owns one channel plus a service thread that connects,
//! drives a select loop, and reconnects on failure. A [`GepServer`]
//! owns a [`ChannelArray`] of accepted channels plus a service thread
//! that accepts and dispatches.
//!
//! Payload encoding is behind the [`Codec`] trait; the engine only
//! round-trips bytes and routes decoded messages through the
//! [`DispatchTable`] registered at endpoint construction.

pub mod channel;
pub mod channel_array;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;

pub use channel::Channel;
pub use channel_array::ChannelArray;
pub use client::GepClient;
pub use codec::{Codec, CodecError, Mode};
pub use config::ProtocolConfig;
pub use dispatch::DispatchTable;
pub use error::{ChannelError, Result};
pub use server::{GepServer, ServerEvents};
