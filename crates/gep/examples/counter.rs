//! Message counter: a server broadcasts ticks, a client counts them.
//!
//! Run with:
//!   cargo run --example counter

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use gep::frame::make_tag;
use gep::peer::{Codec, CodecError, DispatchTable, GepClient, GepServer, Mode, ProtocolConfig};

const TAG_TICK: u32 = make_tag(b"tick");
const TICKS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Tick {
    seq: u64,
}

struct TickCodec;

impl Codec for TickCodec {
    type Msg = Tick;

    fn serialize(&self, msg: &Tick) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8], msg: &mut Tick) -> Result<(), CodecError> {
        if bytes.is_empty() {
            *msg = Tick::default();
            return Ok(());
        }
        *msg = serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))?;
        Ok(())
    }

    fn tag_of(&self, _msg: &Tick) -> u32 {
        TAG_TICK
    }

    fn new_message(&self, tag: u32) -> Option<Tick> {
        (tag == TAG_TICK).then(Tick::default)
    }

    fn mode(&self) -> Mode {
        Mode::Text
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut server = GepServer::new(
        "counter_server",
        4,
        ProtocolConfig::new(0),
        TickCodec,
        DispatchTable::new(),
    );
    server.start()?;
    let port = server.config().port();
    eprintln!("server listening on 127.0.0.1:{port}");

    let counted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&counted);
    let ops = DispatchTable::new().on(TAG_TICK, move |msg: &Tick, _chan| {
        counter.fetch_add(1, Ordering::SeqCst);
        if msg.seq % 10 == 0 {
            eprintln!("tick {}", msg.seq);
        }
        0
    });

    let mut client = GepClient::new("counter_client", ProtocolConfig::new(port), TickCodec, ops);
    client.start()?;

    // wait for the server to see the client before broadcasting
    while server.num_clients() == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }

    for seq in 0..TICKS as u64 {
        server.send(&Tick { seq })?;
    }

    let deadline = Instant::now() + Duration::from_secs(6);
    while counted.load(Ordering::SeqCst) < TICKS && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    println!("received {}/{TICKS} ticks", counted.load(Ordering::SeqCst));

    client.stop();
    server.stop();
    Ok(())
}
