#![no_std]
#![forbid(unsafe_code)]

//! Wear-leveled 32-bit counter for clear-only byte media.
//!
//! The counter lives in a circular region of at least 16 bytes. Most increments
//! clear a single bit of the newest byte, roughly one in nine erases one byte, and
//! every trip around the region leaves a 5-byte checkpoint of the absolute value.
//!
//! Byte roles while scanning from the first erased byte:
//!
//! | byte | worth |
//! |---|---|
//! | `FF` (anchor) | 0 |
//! | `FF` right after the anchor | 1 |
//! | `7F 3F 1F 0F 07 03 01 00` | 2 ..= 9 |
//! | `80..=FE`, `70` | 2, plus 7 bits of the checkpoint register |
//! | `77` and anything else | 0 |
//!
//! Five checkpoint bytes in a row replace the running count with their value.

mod cell;

use cell::{checkpoint_chunk, classify, is_checkpoint, next_step, Cell, STEP_START};
use eefs_core::{EeResult, CHECKPOINT_CHUNKS, ERASED, FILLER, MIN_COUNTER_LEN};
use eefs_hal::{ByteMedium, MediumExt};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Read,
    Increment,
}

/// Where the erased bytes sit.
struct Markers {
    first: Option<u32>,
    second: Option<u32>,
    total: u32,
}

/// Result of one walk around the region.
struct Scan {
    anchor: u32,
    count: u32,
    /// Offset of the last complete checkpoint chain seen.
    checkpoint_at: u32,
}

pub struct WearLevelCounter<M> {
    medium: M,
    start: u32,
    len: u32,
}

impl<M: ByteMedium> WearLevelCounter<M> {
    /// Counter over `len` bytes at `start`. Lengths under 16 are raised to 16.
    pub fn new(medium: M, start: u32, len: u32) -> Self {
        if len < MIN_COUNTER_LEN {
            debug!("counter at {:#06x}: length {} raised to {}", start, len, MIN_COUNTER_LEN);
        }
        Self { medium, start, len: len.max(MIN_COUNTER_LEN) }
    }

    pub fn start(&self) -> u32 { self.start }
    pub fn len(&self) -> u32 { self.len }

    pub fn medium(&self) -> &M { &self.medium }
    pub fn medium_mut(&mut self) -> &mut M { &mut self.medium }
    pub fn into_inner(self) -> M { self.medium }

    /// Startup check.
    ///
    /// Without `recover`: a region with no erased byte or more than two is reset to 0.
    /// With `recover` (after an unclean shutdown): read, increment, read again. If the three
    /// disagree, a torn write is assumed and the counter is reset to the first read plus one.
    /// Either way inconsistencies are repaired here, never reported.
    pub fn begin(&mut self, recover: bool) -> EeResult<()> {
        if recover {
            let before = self.read()?;
            let bumped = self.increment()?;
            let after = self.read()?;
            let expected = before.wrapping_add(1);
            if bumped != expected || after != bumped {
                warn!("counter at {:#06x}: torn state ({} -> {} -> {}), resetting to {}",
                    self.start, before, bumped, after, expected);
                self.resetcount(expected)?;
            }
            return Ok(());
        }

        let markers = self.markers()?;
        if markers.total == 0 || markers.total > 2 {
            warn!("counter at {:#06x}: {} erased bytes, resetting to 0", self.start, markers.total);
            self.resetcount(0)?;
        }
        Ok(())
    }

    pub fn read(&mut self) -> EeResult<u32> {
        self.op(Op::Read)
    }

    /// Advance by one and return the new value. Wraps to 0 after `u32::MAX`.
    pub fn increment(&mut self) -> EeResult<u32> {
        self.op(Op::Increment)
    }

    /// Rewrite the region so it reads back as `value`.
    pub fn resetcount(&mut self, value: u32) -> EeResult<u32> {
        debug!("counter at {:#06x}: reset to {}", self.start, value);

        // 1. Checkpoint chain, most significant chunk first
        for i in 0..CHECKPOINT_CHUNKS {
            self.update_at(i, checkpoint_chunk(value, CHECKPOINT_CHUNKS - 1 - i))?;
        }

        // 2. Anchor
        self.update_at(CHECKPOINT_CHUNKS, ERASED)?;

        // 3. Scrub stray erased bytes. The last byte precedes the chain in scan
        //    order, so it must not extend it either.
        let last = self.len - 1;
        for i in CHECKPOINT_CHUNKS + 1..self.len {
            let b = self.load_at(i)?;
            if b == ERASED || (i == last && is_checkpoint(b)) {
                self.update_at(i, FILLER)?;
            }
        }

        self.medium.settle_bus()?;
        Ok(value)
    }

    fn op(&mut self, op: Op) -> EeResult<u32> {
        let Some(scan) = self.scan()? else {
            // Nothing erased: blank or fully consumed region counts as zero
            if op == Op::Increment { return self.resetcount(1); }
            self.medium.settle_bus()?;
            return Ok(0);
        };

        if op == Op::Read {
            self.medium.settle_bus()?;
            return Ok(scan.count);
        }

        let count = scan.count.wrapping_add(1);
        let anchor = scan.anchor;
        let second = self.next(anchor);
        let third = self.next(second);
        let before = self.prev(anchor);

        // A stray erased byte two ahead would become a third marker
        if self.load_at(third)? == ERASED {
            self.update_at(third, FILLER)?;
        }

        if self.load_at(second)? != ERASED {
            // 1. Erase the byte after the anchor: worth one
            self.update_at(second, ERASED)?;
        } else if let Some(step) = next_step(self.load_at(before)?) {
            // 2. Clear one more bit of the newest ladder byte
            self.update_at(before, step)?;
        } else {
            // 3. Start a new byte on the anchor
            let fresh = self.fresh_byte(anchor, scan.checkpoint_at, count);
            self.update_at(anchor, fresh)?;
        }

        self.medium.settle_bus()?;
        Ok(count)
    }

    /// Byte to write on the anchor. When the live checkpoint chain is 2 to 6 bytes ahead
    /// it is about to be overwritten, so lay down its successor instead of a ladder byte.
    /// The successor encodes the value the counter will hold once the last chunk lands:
    /// each checkpoint byte is followed by one erase, so chunk `k` is written 2 * k
    /// increments before the chain completes.
    fn fresh_byte(&self, anchor: u32, checkpoint_at: u32, count: u32) -> u8 {
        for ahead in 2..=6 {
            if (anchor + ahead) % self.len == checkpoint_at {
                let future = count.wrapping_add(2 * ahead - 4);
                return checkpoint_chunk(future, ahead - 2);
            }
        }
        STEP_START
    }

    fn markers(&mut self) -> EeResult<Markers> {
        let mut markers = Markers { first: None, second: None, total: 0 };
        for i in 0..self.len {
            if self.load_at(i)? != ERASED { continue; }
            markers.total += 1;
            if markers.first.is_none() {
                markers.first = Some(i);
            } else if markers.second.is_none() {
                markers.second = Some(i);
            }
        }
        Ok(markers)
    }

    fn scan(&mut self) -> EeResult<Option<Scan>> {
        let markers = self.markers()?;
        let Some(mut anchor) = markers.first else { return Ok(None); };

        // Markers at both ends are neighbours across the wrap; the last one leads
        if anchor == 0 && markers.second == Some(self.len - 1) {
            anchor = self.len - 1;
        }

        let mut count: u32 = 0;
        let mut register: u32 = 0;
        let mut run: u32 = 0;
        let mut pending: u32 = 0;
        let mut checkpoint_at: u32 = 0;

        let mut x = anchor;
        for i in 0..self.len {
            match classify(self.load_at(x)?) {
                Cell::Erased => {
                    run = 0;
                    if i == 1 {
                        pending = 1;
                        count = count.wrapping_add(1);
                    }
                }
                Cell::Step(worth) => {
                    run = 0;
                    count = count.wrapping_add(worth);
                }
                Cell::Checkpoint(bits) => {
                    if run == 0 { register = 0; }
                    register = (register << 7) | bits;
                    run += 1;
                    count = count.wrapping_add(2);
                    if run == CHECKPOINT_CHUNKS {
                        // Adopt the absolute value
                        count = register.wrapping_add(pending);
                        run = 0;
                        checkpoint_at = (x + self.len - (CHECKPOINT_CHUNKS - 1)) % self.len;
                    }
                }
                Cell::Inert => run = 0,
            }
            x = self.next(x);
        }

        Ok(Some(Scan { anchor, count, checkpoint_at }))
    }

    fn next(&self, x: u32) -> u32 { (x + 1) % self.len }
    fn prev(&self, x: u32) -> u32 { (x + self.len - 1) % self.len }

    fn load_at(&mut self, offset: u32) -> EeResult<u8> {
        self.medium.load(self.start + offset)
    }

    fn update_at(&mut self, offset: u32, value: u8) -> EeResult<()> {
        self.medium.update(self.start + offset, value)
    }
}
