//! Tag-keyed handler dispatch.
//!
//! The table is built before endpoint construction and never changes
//! afterwards, so lookups are lock-free. Handlers receive the decoded
//! message and the channel it arrived on; user state is closure
//! capture. A negative handler return is logged as a callback error and
//! never tears down the channel.

use std::collections::HashMap;

use crate::channel::Channel;
use crate::codec::Codec;

/// The handler shape stored in the table.
pub type HandlerFn<C> = dyn Fn(&<C as Codec>::Msg, &Channel<C>) -> i32 + Send + Sync;

/// Immutable mapping from tag to handler, shared by every channel of an
/// endpoint.
pub struct DispatchTable<C: Codec> {
    handlers: HashMap<u32, Box<HandlerFn<C>>>,
}

impl<C: Codec> DispatchTable<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a tag. Later registrations for the same
    /// tag replace earlier ones.
    pub fn on<F>(mut self, tag: u32, handler: F) -> Self
    where
        F: Fn(&C::Msg, &Channel<C>) -> i32 + Send + Sync + 'static,
    {
        self.handlers.insert(tag, Box::new(handler));
        self
    }

    pub fn get(&self, tag: u32) -> Option<&HandlerFn<C>> {
        self.handlers.get(&tag).map(Box::as_ref)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.handlers.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: Codec> Default for DispatchTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use gep_frame::make_tag;

    use super::*;
    use crate::codec::CodecError;

    struct NullCodec;

    impl Codec for NullCodec {
        type Msg = u32;

        fn serialize(&self, msg: &u32) -> Result<Vec<u8>, CodecError> {
            Ok(msg.to_be_bytes().to_vec())
        }

        fn deserialize(&self, bytes: &[u8], msg: &mut u32) -> Result<(), CodecError> {
            *msg = match bytes.try_into() {
                Ok(b) => u32::from_be_bytes(b),
                Err(_) => 0,
            };
            Ok(())
        }

        fn tag_of(&self, _msg: &u32) -> u32 {
            make_tag(b"word")
        }

        fn new_message(&self, _tag: u32) -> Option<u32> {
            Some(0)
        }
    }

    #[test]
    fn lookup_hit_and_miss() {
        let table: DispatchTable<NullCodec> =
            DispatchTable::new().on(make_tag(b"word"), |_msg, _chan| 0);

        assert!(table.contains(make_tag(b"word")));
        assert!(table.get(make_tag(b"word")).is_some());
        assert!(table.get(make_tag(b"none")).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn later_registration_replaces() {
        let table: DispatchTable<NullCodec> = DispatchTable::new()
            .on(make_tag(b"word"), |_msg, _chan| 1)
            .on(make_tag(b"word"), |_msg, _chan| 2);

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_table() {
        let table: DispatchTable<NullCodec> = DispatchTable::new();
        assert!(table.is_empty());
        assert!(!table.contains(make_tag(b"word")));
    }
}
