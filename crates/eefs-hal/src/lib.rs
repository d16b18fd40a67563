#![no_std]
#![forbid(unsafe_code)]

use eefs_core::{EeError, EeResult, ERASED, MAX_PROGRAM_ATTEMPTS};
use log::{trace, warn};

/// How a single byte program cycle treats the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramMode {
    /// Return the cell to `0xFF`.
    EraseOnly,
    /// Clear bits only. The cell becomes `current & value`.
    WriteOnly,
    /// Erase, then write.
    EraseWrite,
}

impl ProgramMode {
    /// Cheapest mode that turns `current` into `wanted`, or `None` if nothing to do.
    pub fn select(current: u8, wanted: u8) -> Option<Self> {
        if current == wanted { return None; }
        if current & wanted == wanted {
            Some(ProgramMode::WriteOnly)
        } else if wanted == ERASED {
            Some(ProgramMode::EraseOnly)
        } else {
            Some(ProgramMode::EraseWrite)
        }
    }

    pub fn erases(self) -> bool {
        !matches!(self, ProgramMode::WriteOnly)
    }
}

/// The Byte Medium (EEPROM-like storage).
/// INVARIANT: Must be Non-Blocking. `WouldBlock` means a previous program is still in flight.
pub trait ByteMedium {
    /// Size of the addressable space in bytes.
    fn capacity(&self) -> u32;

    fn read_byte(&mut self, addr: u32) -> nb::Result<u8, EeError>;

    /// Start one program cycle. The caller picks the mode (see `ProgramMode::select`).
    fn program(&mut self, addr: u32, value: u8, mode: ProgramMode) -> nb::Result<(), EeError>;

    /// Trailing bus access issued after counter operations.
    /// Default: a dummy read of address 0, which lets the data latch settle on AVR-class parts.
    fn settle(&mut self) -> nb::Result<(), EeError> {
        self.read_byte(0).map(|_| ())
    }
}

impl<M: ByteMedium + ?Sized> ByteMedium for &mut M {
    fn capacity(&self) -> u32 { (**self).capacity() }
    fn read_byte(&mut self, addr: u32) -> nb::Result<u8, EeError> { (**self).read_byte(addr) }
    fn program(&mut self, addr: u32, value: u8, mode: ProgramMode) -> nb::Result<(), EeError> {
        (**self).program(addr, value, mode)
    }
    fn settle(&mut self) -> nb::Result<(), EeError> { (**self).settle() }
}

/// Blocking access on top of any `ByteMedium`.
pub trait MediumExt: ByteMedium {
    /// Spin until the byte can be read.
    fn load(&mut self, addr: u32) -> EeResult<u8> {
        nb::block!(self.read_byte(addr))
    }

    /// Make `addr` hold `value`, erasing only when a bit has to go from 0 to 1.
    /// Each attempt is verified by reading back.
    fn update(&mut self, addr: u32, value: u8) -> EeResult<()> {
        let mut found = self.load(addr)?;
        for attempt in 0..MAX_PROGRAM_ATTEMPTS {
            let Some(mode) = ProgramMode::select(found, value) else { return Ok(()); };
            trace!("program {:#06x}: {:#04x} -> {:#04x} ({:?})", addr, found, value, mode);
            nb::block!(self.program(addr, value, mode))?;
            found = self.load(addr)?;
            if found == value { return Ok(()); }
            warn!("verify {:#06x} failed on attempt {}: wanted {:#04x}, read {:#04x}", addr, attempt + 1, value, found);
        }
        Err(EeError::VerifyFailed { addr, wanted: value, found })
    }

    fn settle_bus(&mut self) -> EeResult<()> {
        nb::block!(self.settle())
    }
}

impl<M: ByteMedium + ?Sized> MediumExt for M {}
