//! The Test protocol: a small GEP-based protocol used by the
//! end-to-end suite. Five message kinds, JSON text rendering and
//! postcard binary rendering.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gep_frame::make_tag;
use gep_peer::{Codec, CodecError, Mode};

pub const TAG_COMMAND_1: u32 = make_tag(b"cmd1");
pub const TAG_COMMAND_2: u32 = make_tag(b"cmd2");
pub const TAG_COMMAND_3: u32 = make_tag(b"cmd3");
pub const TAG_COMMAND_4: u32 = make_tag(b"cmd4");
pub const TAG_CONTROL: u32 = make_tag(b"ctrl");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command1 {
    pub a: u64,
    pub b: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command2 {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command3 {
    pub id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command4 {
    pub id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    #[default]
    Ping,
    Pong,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub command: ControlCommand,
}

/// The payload enum: one variant per tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestMessage {
    Command1(Command1),
    Command2(Command2),
    Command3(Command3),
    Command4(Command4),
    Control(ControlMessage),
}

pub fn original_command1() -> TestMessage {
    TestMessage::Command1(Command1 {
        a: 1_111_111_111_111_111,
        b: 17_688_477,
    })
}

pub fn original_command3() -> TestMessage {
    TestMessage::Command3(Command3 { id: 123_456_789 })
}

pub fn original_command4() -> TestMessage {
    TestMessage::Command4(Command4 { id: 123_456_789 })
}

pub fn control_ping() -> TestMessage {
    TestMessage::Control(ControlMessage {
        command: ControlCommand::Ping,
    })
}

pub fn control_pong() -> TestMessage {
    TestMessage::Control(ControlMessage {
        command: ControlCommand::Pong,
    })
}

/// Codec for the Test protocol. Text mode is JSON, binary mode is
/// postcard; both peers must be built with the same mode.
pub struct TestCodec {
    mode: Mode,
}

impl TestCodec {
    pub fn text() -> Self {
        Self { mode: Mode::Text }
    }

    pub fn binary() -> Self {
        Self { mode: Mode::Binary }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self.mode {
            Mode::Text => {
                serde_json::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
            }
            Mode::Binary => {
                postcard::to_allocvec(value).map_err(|err| CodecError::Encode(err.to_string()))
            }
        }
    }

    fn decode<T: DeserializeOwned + Default>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        if bytes.is_empty() {
            return Ok(T::default());
        }
        match self.mode {
            Mode::Text => {
                serde_json::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
            }
            Mode::Binary => {
                postcard::from_bytes(bytes).map_err(|err| CodecError::Decode(err.to_string()))
            }
        }
    }
}

impl Codec for TestCodec {
    type Msg = TestMessage;

    fn serialize(&self, msg: &TestMessage) -> Result<Vec<u8>, CodecError> {
        match msg {
            TestMessage::Command1(m) => self.encode(m),
            TestMessage::Command2(m) => self.encode(m),
            TestMessage::Command3(m) => self.encode(m),
            TestMessage::Command4(m) => self.encode(m),
            TestMessage::Control(m) => self.encode(m),
        }
    }

    fn deserialize(&self, bytes: &[u8], msg: &mut TestMessage) -> Result<(), CodecError> {
        *msg = match msg {
            TestMessage::Command1(_) => TestMessage::Command1(self.decode(bytes)?),
            TestMessage::Command2(_) => TestMessage::Command2(self.decode(bytes)?),
            TestMessage::Command3(_) => TestMessage::Command3(self.decode(bytes)?),
            TestMessage::Command4(_) => TestMessage::Command4(self.decode(bytes)?),
            TestMessage::Control(_) => TestMessage::Control(self.decode(bytes)?),
        };
        Ok(())
    }

    fn tag_of(&self, msg: &TestMessage) -> u32 {
        match msg {
            TestMessage::Command1(_) => TAG_COMMAND_1,
            TestMessage::Command2(_) => TAG_COMMAND_2,
            TestMessage::Command3(_) => TAG_COMMAND_3,
            TestMessage::Command4(_) => TAG_COMMAND_4,
            TestMessage::Control(_) => TAG_CONTROL,
        }
    }

    fn new_message(&self, tag: u32) -> Option<TestMessage> {
        match tag {
            TAG_COMMAND_1 => Some(TestMessage::Command1(Command1::default())),
            TAG_COMMAND_2 => Some(TestMessage::Command2(Command2::default())),
            TAG_COMMAND_3 => Some(TestMessage::Command3(Command3::default())),
            TAG_COMMAND_4 => Some(TestMessage::Command4(Command4::default())),
            TAG_CONTROL => Some(TestMessage::Control(ControlMessage::default())),
            _ => None,
        }
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}
