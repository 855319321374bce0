use std::fmt;
use serde::{Deserialize, Serialize};

pub const OFFSET_BITS: u32 = 22;
pub const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;
/// Buffer id 1023 is never handed out so the all-ones word is free for tombstones.
pub const MAX_BUFFERS: u32 = (1 << (32 - OFFSET_BITS)) - 1;
pub const MAX_ENTRIES_PER_BUFFER: u32 = 1 << OFFSET_BITS;

/// Compact handle to an entry stored in a [`DataStore`](super::data_store::DataStore).
///
/// Encodes `buffer_id << 22 | offset`. The zero word is the null ref; offset 0 of every
/// buffer is reserved so no stored entry encodes to it.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryRef(u32);

impl EntryRef {
    pub const fn new(buffer_id: u32, offset: u32) -> Self {
        EntryRef((buffer_id << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    pub const fn invalid() -> Self {
        EntryRef(0)
    }

    pub const fn from_raw(raw: u32) -> Self {
        EntryRef(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn valid(self) -> bool {
        self.0 != 0
    }

    pub const fn buffer_id(self) -> u32 {
        self.0 >> OFFSET_BITS
    }

    pub const fn offset(self) -> u32 {
        self.0 & OFFSET_MASK
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid() {
            write!(f, "EntryRef({}:{})", self.buffer_id(), self.offset())
        } else {
            write!(f, "EntryRef(invalid)")
        }
    }
}
