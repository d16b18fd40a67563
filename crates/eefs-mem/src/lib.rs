#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;
use rand_core::RngCore;
use log::debug;

use eefs_core::{EeError, ERASED};
use eefs_hal::{ByteMedium, ProgramMode};

#[cfg(feature = "std")]
pub mod fs_image;

/// Per-cell endurance accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wear {
    pub erases: u32,
    pub writes: u32,
}

/// EEPROM simulator.
/// Writes can only clear bits, erases set the cell back to 0xFF.
/// Fault injection: power budget (programs past it fail) and torn erase-write cycles.
#[derive(Debug, Clone)]
pub struct RamMedium {
    cells: Vec<u8>,
    wear: Vec<Wear>,

    /// Busy polls reported after every program (0 = instant).
    latency: u8,
    busy: u8,

    power_budget: Option<usize>,
    tear_next: bool,
    settles: u64,
}

impl RamMedium {
    /// Fresh part: every cell erased.
    pub fn new(capacity: u32) -> Self {
        Self::from_bytes(vec![ERASED; capacity as usize])
    }

    pub fn from_bytes(cells: Vec<u8>) -> Self {
        let wear = vec![Wear::default(); cells.len()];
        Self {
            cells, wear,
            latency: 0,
            busy: 0,
            power_budget: None,
            tear_next: false,
            settles: 0,
        }
    }

    pub fn with_latency(mut self, polls: u8) -> Self {
        self.latency = polls;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Overwrite a cell directly, bypassing program semantics and wear accounting.
    pub fn poke(&mut self, addr: u32, value: u8) {
        self.cells[addr as usize] = value;
    }

    /// Fill every cell with noise (an unformatted or corrupted part).
    pub fn scramble<R: RngCore>(&mut self, rng: &mut R) {
        rng.fill_bytes(&mut self.cells);
    }

    pub fn wear(&self, addr: u32) -> Wear {
        self.wear[addr as usize]
    }

    pub fn total_erases(&self) -> u64 {
        self.wear.iter().map(|w| w.erases as u64).sum()
    }

    pub fn total_writes(&self) -> u64 {
        self.wear.iter().map(|w| w.writes as u64).sum()
    }

    pub fn reset_wear(&mut self) {
        self.wear.iter_mut().for_each(|w| *w = Wear::default());
    }

    /// Allow `programs` more program cycles, then drop the supply.
    pub fn cut_power_after(&mut self, programs: usize) {
        self.power_budget = Some(programs);
    }

    pub fn restore_power(&mut self) {
        self.power_budget = None;
        self.tear_next = false;
        self.busy = 0;
    }

    pub fn is_powered(&self) -> bool {
        self.power_budget != Some(0)
    }

    /// The next program cycle loses power half-way: an erase-write leaves the cell erased.
    pub fn tear_next_program(&mut self) {
        self.tear_next = true;
    }

    /// Settle accesses seen so far.
    pub fn settles(&self) -> u64 {
        self.settles
    }

    fn index(&self, addr: u32) -> Result<usize, EeError> {
        if (addr as usize) < self.cells.len() { Ok(addr as usize) } else { Err(EeError::OutOfRange { addr }) }
    }
}

impl ByteMedium for RamMedium {
    fn capacity(&self) -> u32 {
        self.cells.len() as u32
    }

    fn read_byte(&mut self, addr: u32) -> nb::Result<u8, EeError> {
        if self.busy > 0 {
            self.busy -= 1;
            return Err(nb::Error::WouldBlock);
        }
        let idx = self.index(addr)?;
        Ok(self.cells[idx])
    }

    fn program(&mut self, addr: u32, value: u8, mode: ProgramMode) -> nb::Result<(), EeError> {
        if self.busy > 0 {
            self.busy -= 1;
            return Err(nb::Error::WouldBlock);
        }
        let idx = self.index(addr)?;

        if let Some(budget) = self.power_budget.as_mut() {
            if *budget == 0 { return Err(nb::Error::Other(EeError::PowerLoss)); }
            *budget -= 1;
        }

        if self.tear_next {
            debug!("tearing program at {:#06x} ({:?})", addr, mode);
            if mode == ProgramMode::EraseWrite {
                self.cells[idx] = ERASED;
                self.wear[idx].erases += 1;
            }
            self.tear_next = false;
            self.power_budget = Some(0);
            return Err(nb::Error::Other(EeError::PowerLoss));
        }

        let cell = &mut self.cells[idx];
        let wear = &mut self.wear[idx];
        match mode {
            ProgramMode::EraseOnly => {
                *cell = ERASED;
                wear.erases += 1;
            }
            ProgramMode::WriteOnly => {
                *cell &= value;
                wear.writes += 1;
            }
            ProgramMode::EraseWrite => {
                *cell = value;
                wear.erases += 1;
                wear.writes += 1;
            }
        }
        self.busy = self.latency;
        Ok(())
    }

    fn settle(&mut self) -> nb::Result<(), EeError> {
        self.read_byte(0)?;
        self.settles += 1;
        Ok(())
    }
}

/// Cloneable handle so a counter and a record store can sit on one part.
/// Each byte access takes the lock; whole operations are not atomic.
pub struct SharedMedium<M> {
    inner: Arc<Mutex<M>>,
}

impl<M> Clone for SharedMedium<M> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<M: ByteMedium> SharedMedium<M> {
    pub fn new(medium: M) -> Self {
        Self { inner: Arc::new(Mutex::new(medium)) }
    }

    /// Run `f` with exclusive access to the underlying medium.
    pub fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut medium = self.inner.lock();
        f(&mut medium)
    }

    /// Recover the medium once every other handle is gone.
    pub fn into_inner(self) -> Result<M, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner()),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl<M: ByteMedium> ByteMedium for SharedMedium<M> {
    fn capacity(&self) -> u32 {
        self.inner.lock().capacity()
    }

    fn read_byte(&mut self, addr: u32) -> nb::Result<u8, EeError> {
        self.inner.lock().read_byte(addr)
    }

    fn program(&mut self, addr: u32, value: u8, mode: ProgramMode) -> nb::Result<(), EeError> {
        self.inner.lock().program(addr, value, mode)
    }

    fn settle(&mut self) -> nb::Result<(), EeError> {
        self.inner.lock().settle()
    }
}
