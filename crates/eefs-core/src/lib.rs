#![no_std]
#[cfg(feature = "std")]
extern crate std;

/// Value of a byte after an erase cycle. Doubles as the counter's scan anchor.
pub const ERASED: u8 = 0xFF;

/// Neutral byte written where a stray erased byte would confuse the counter scan.
pub const FILLER: u8 = 0x77;

/// Stand-in for a checkpoint chunk whose 7 payload bits are all set.
pub const CHECKPOINT_ALL_ONES: u8 = 0x70;

/// Smallest counter region. Shorter regions are clamped up to this.
pub const MIN_COUNTER_LEN: u32 = 16;

/// Number of 7-bit chunks in a checkpoint register.
pub const CHECKPOINT_CHUNKS: u32 = 5;

/// Canonical record store header: signature record `[4, 'C', 'A', 'S', 0]` + end marker.
pub const FORMAT_IMAGE: [u8; 6] = [0x04, b'C', b'A', b'S', 0x00, 0x00];

/// Bytes taken by the signature record. User records start right after it.
pub const SIGNATURE_RECORD_LEN: u32 = 5;

/// Upper bound on program attempts before a write is reported as failed.
pub const MAX_PROGRAM_ATTEMPTS: u8 = 5;

/// A contiguous span of medium addresses owned by one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub len: u32,
}

impl Region {
    pub const fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }

    /// First address past the region.
    pub const fn end(&self) -> u32 {
        self.start + self.len
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end()
    }
}

pub type EeResult<T> = Result<T, EeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EeError {
    /// Address past the end of the medium.
    OutOfRange { addr: u32 },
    /// Read-back never matched after `MAX_PROGRAM_ATTEMPTS` programs.
    VerifyFailed { addr: u32, wanted: u8, found: u8 },
    /// Supply dropped mid-operation (simulated media only).
    PowerLoss,
    HalError,
}

impl core::fmt::Display for EeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EeError {}
