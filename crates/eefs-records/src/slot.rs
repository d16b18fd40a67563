//! On-media layout of ID-list payloads.
//!
//! An ID list record carries 4-byte slots, least significant byte first:
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+----+----+----+
//! | id0 (LE)          | id1 (LE)          | id2 (LE)          |
//! +----+----+----+----+----+----+----+----+----+----+----+----+
//! ```
//!
//! A zero slot is free. New records are one 12-byte chunk: the new id and two free slots.

/// Bytes per slot.
pub const SLOT_LEN: u32 = 4;

/// Slots in a freshly appended chunk.
pub const SLOTS_PER_CHUNK: usize = 3;

/// Bytes in a freshly appended chunk.
pub const CHUNK_LEN: usize = SLOT_LEN as usize * SLOTS_PER_CHUNK;

/// Tombstone value. Never a valid identifier.
pub const RESERVED_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSlot([u8; 4]);

impl IdSlot {
    pub const FREE: IdSlot = IdSlot([0; 4]);

    pub fn new(id: u32) -> Self {
        Self(id.to_le_bytes())
    }

    pub fn decode(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn encode(self) -> [u8; 4] {
        self.0
    }

    pub fn id(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn is_free(self) -> bool {
        self == Self::FREE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdChunk([IdSlot; SLOTS_PER_CHUNK]);

impl IdChunk {
    /// Chunk holding `id` in its first slot, the rest free.
    pub fn with_first(id: u32) -> Self {
        Self([IdSlot::new(id), IdSlot::FREE, IdSlot::FREE])
    }

    pub fn slots(&self) -> &[IdSlot; SLOTS_PER_CHUNK] {
        &self.0
    }

    pub fn encode(&self) -> [u8; CHUNK_LEN] {
        let mut buf = [0u8; CHUNK_LEN];
        for (dst, slot) in buf.chunks_exact_mut(SLOT_LEN as usize).zip(self.0.iter()) {
            dst.copy_from_slice(&slot.encode());
        }
        buf
    }

    pub fn decode(bytes: &[u8; CHUNK_LEN]) -> Self {
        let mut slots = [IdSlot::FREE; SLOTS_PER_CHUNK];
        for (slot, src) in slots.iter_mut().zip(bytes.chunks_exact(SLOT_LEN as usize)) {
            *slot = IdSlot::decode([src[0], src[1], src[2], src[3]]);
        }
        Self(slots)
    }
}

/// Which bytes take part in an id comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMask {
    /// All 32 bits.
    Exact,
    /// Low 24 bits: the most significant byte (byte 3) is ignored.
    Low24,
    /// Byte 1 is ignored.
    SkipByte1,
}

impl IdMask {
    fn ignored(self) -> Option<usize> {
        match self {
            IdMask::Exact => None,
            IdMask::Low24 => Some(3),
            IdMask::SkipByte1 => Some(1),
        }
    }

    pub fn matches(self, stored: IdSlot, target: IdSlot) -> bool {
        let skip = self.ignored();
        stored.0.iter().zip(target.0.iter())
            .enumerate()
            .all(|(i, (a, b))| skip == Some(i) || a == b)
    }
}
