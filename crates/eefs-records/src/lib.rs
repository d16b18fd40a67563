#![no_std]
#![forbid(unsafe_code)]

//! Append-only keyed records and ID lists on a byte medium.
//!
//! Layout of a store region:
//!
//! ```text
//! +---+---+---+---+---+--------------------+---+
//! | 4 | C | A | S | 0 | len key payload ...| 0 |
//! +---+---+---+---+---+--------------------+---+
//!  signature record    user records          end marker
//! ```
//!
//! A record is a length byte (key + payload), the key, then the payload. A zero length
//! byte ends the list.

extern crate alloc;

mod idlist;
pub mod slot;

pub use slot::{IdChunk, IdMask, IdSlot};

use alloc::vec::Vec;
use eefs_core::{EeError, EeResult, Region, FORMAT_IMAGE, SIGNATURE_RECORD_LEN};
use eefs_hal::{ByteMedium, MediumExt};
use log::{debug, warn};

/// Largest payload a single record carries (the length byte also counts the key).
pub const MAX_PAYLOAD: usize = 254;

/// One record header found during a scan.
#[derive(Debug, Clone, Copy)]
struct RecordRef {
    at: u32,
    /// Key plus payload. Never zero.
    total_len: u8,
    key: u8,
}

impl RecordRef {
    fn key_addr(&self) -> u32 { self.at + 1 }
    fn data_addr(&self) -> u32 { self.at + 2 }
    fn data_len(&self) -> u8 { self.total_len - 1 }
    fn next(&self) -> u32 { self.at + self.total_len as u32 + 1 }
}

pub struct RecordStore<M> {
    medium: M,
    region: Region,
}

impl<M: ByteMedium> RecordStore<M> {
    /// Attach to `region` and make sure it carries a valid header.
    pub fn open(medium: M, region: Region) -> EeResult<Self> {
        if region.end() > medium.capacity() {
            return Err(EeError::OutOfRange { addr: region.end() - 1 });
        }
        if region.len < FORMAT_IMAGE.len() as u32 {
            return Err(EeError::OutOfRange { addr: region.start + FORMAT_IMAGE.len() as u32 - 1 });
        }

        let mut store = Self { medium, region };
        store.begin()?;
        Ok(store)
    }

    pub fn region(&self) -> Region { self.region }
    pub fn medium(&self) -> &M { &self.medium }
    pub fn medium_mut(&mut self) -> &mut M { &mut self.medium }
    pub fn into_inner(self) -> M { self.medium }

    /// Format check. Safe to call any number of times.
    pub fn begin(&mut self) -> EeResult<()> {
        let start = self.region.start;

        let mut intact = true;
        for (i, &b) in FORMAT_IMAGE.iter().enumerate().skip(1).take(3) {
            if self.medium.load(start + i as u32)? != b {
                intact = false;
                break;
            }
        }

        if !intact {
            debug!("record store at {:#06x}: formatting", start);
            for (i, &b) in FORMAT_IMAGE.iter().enumerate() {
                self.medium.update(start + i as u32, b)?;
            }
        }

        if self.medium.load(start)? != FORMAT_IMAGE[0] {
            warn!("record store at {:#06x}: repairing signature length", start);
            self.medium.update(start, FORMAT_IMAGE[0])?;
        }
        Ok(())
    }

    /// Address of the key byte of the first record keyed `key`, and its payload size.
    /// The payload starts at `address + 1`.
    pub fn get_record_address(&mut self, key: u8) -> EeResult<Option<(u32, u8)>> {
        Ok(self.find(key)?.map(|rec| (rec.key_addr(), rec.data_len())))
    }

    /// Store `data` under `key`, in place when the record exists, appended otherwise.
    ///
    /// Returns `Ok(false)` without writing when the region is full or when `data` is
    /// longer than the existing record. Shorter data leaves the tail of the old payload.
    pub fn update_record(&mut self, key: u8, data: &[u8]) -> EeResult<bool> {
        let Some(rec) = self.find(key)? else {
            return self.append(key, data);
        };

        if data.len() > rec.data_len() as usize {
            debug!("record {:#04x}: {} bytes do not fit in {}", key, data.len(), rec.data_len());
            return Ok(false);
        }
        for (i, &b) in data.iter().enumerate() {
            self.medium.update(rec.data_addr() + i as u32, b)?;
        }
        Ok(true)
    }

    pub fn update_record_byte(&mut self, key: u8, value: u8) -> EeResult<bool> {
        self.update_record(key, &[value])
    }

    pub fn read_record(&mut self, key: u8) -> EeResult<Option<Vec<u8>>> {
        let Some(rec) = self.find(key)? else { return Ok(None) };
        let mut data = Vec::with_capacity(rec.data_len() as usize);
        for i in 0..rec.data_len() as u32 {
            data.push(self.medium.load(rec.data_addr() + i)?);
        }
        Ok(Some(data))
    }

    /// Address where the next append would place its length byte.
    pub fn end_of_records(&mut self) -> EeResult<u32> {
        let mut at = self.first_record();
        while let Some(rec) = self.record_at(at)? {
            at = rec.next();
        }
        Ok(at)
    }

    fn append(&mut self, key: u8, data: &[u8]) -> EeResult<bool> {
        let payload: &[u8] = match data.len() {
            0 => &[0],
            n => &data[..n.min(MAX_PAYLOAD)],
        };

        let at = self.end_of_records()?;
        let stride = payload.len() as u32 + 2;
        let end = self.region.end();
        if at + stride > end {
            debug!("record {:#04x}: region full ({} bytes needed at {:#06x})", key, stride, at);
            return Ok(false);
        }
        if self.medium.load(at)? != 0 {
            // Scan stopped on a length that overruns the region
            warn!("record store at {:#06x}: corrupt record at {:#06x}", self.region.start, at);
            return Ok(false);
        }

        // Length byte last: until it lands the record does not exist
        if at + stride < end {
            self.medium.update(at + stride, 0)?;
        }
        self.medium.update(at + 1, key)?;
        for (i, &b) in payload.iter().enumerate() {
            self.medium.update(at + 2 + i as u32, b)?;
        }
        self.medium.update(at, payload.len() as u8 + 1)?;

        debug!("record {:#04x}: appended {} bytes at {:#06x}", key, payload.len(), at);
        Ok(true)
    }

    fn find(&mut self, key: u8) -> EeResult<Option<RecordRef>> {
        let mut at = self.first_record();
        while let Some(rec) = self.record_at(at)? {
            if rec.key == key {
                return Ok(Some(rec));
            }
            at = rec.next();
        }
        Ok(None)
    }

    fn first_record(&self) -> u32 {
        self.region.start + SIGNATURE_RECORD_LEN
    }

    /// Record header at `at`, or `None` at the end marker, the region end, or a length
    /// that would run past the region.
    fn record_at(&mut self, at: u32) -> EeResult<Option<RecordRef>> {
        if at >= self.region.end() {
            return Ok(None);
        }
        let total_len = self.medium.load(at)?;
        if total_len == 0 || at + total_len as u32 >= self.region.end() {
            return Ok(None);
        }
        let key = self.medium.load(at + 1)?;
        Ok(Some(RecordRef { at, total_len, key }))
    }
}
