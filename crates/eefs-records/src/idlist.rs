//! ID lists: sets of non-zero 32-bit identifiers stored in records keyed by a list id.

use alloc::vec::Vec;
use eefs_core::EeResult;
use eefs_hal::{ByteMedium, MediumExt};
use log::debug;

use crate::slot::{IdChunk, IdMask, IdSlot, RESERVED_ID, SLOT_LEN};
use crate::RecordStore;

#[derive(Debug, Clone, Copy)]
enum IdOp {
    /// Stop at the first slot matching `target`.
    Query { target: IdSlot, mask: IdMask },
    /// Free every slot matching `target`.
    Delete { target: IdSlot, mask: IdMask },
    Enumerate,
}

#[derive(Debug, Default)]
struct Walk {
    found: bool,
    deleted: bool,
    /// First free slot of the whole walk.
    free_slot: Option<u32>,
}

impl<M: ByteMedium> RecordStore<M> {
    /// Add `id` to list `listid`. True iff the id was newly stored.
    pub fn add_id(&mut self, id: u32, listid: u8) -> EeResult<bool> {
        if id == RESERVED_ID {
            return Ok(false);
        }

        let target = IdSlot::new(id);
        let walk = self.walk_ids(listid, IdOp::Query { target, mask: IdMask::Exact }, |_| {})?;
        if walk.found {
            return Ok(false);
        }

        if let Some(slot) = walk.free_slot {
            debug!("list {:#04x}: id {:#010x} into slot {:#06x}", listid, id, slot);
            self.write_slot(slot, target)?;
            return Ok(true);
        }
        // Always a new record: an in-place update would land on the first chunk
        self.append(listid, &IdChunk::with_first(id).encode())
    }

    /// Whether `id` is in list `listid`. With `partial24` only the low 24 bits are compared.
    pub fn query_id(&mut self, id: u32, listid: u8, partial24: bool) -> EeResult<bool> {
        if id == RESERVED_ID {
            return Ok(false);
        }

        let mask = if partial24 { IdMask::Low24 } else { IdMask::Exact };
        let walk = self.walk_ids(listid, IdOp::Query { target: IdSlot::new(id), mask }, |_| {})?;
        Ok(walk.found)
    }

    /// Remove `id` from list `listid`. With `partial8` byte 1 is ignored, so one call may
    /// free several slots.
    pub fn delete_id(&mut self, id: u32, listid: u8, partial8: bool) -> EeResult<bool> {
        let mask = if partial8 { IdMask::SkipByte1 } else { IdMask::Exact };
        self.delete_id_matching(id, listid, mask)
    }

    /// Free every slot of list `listid` that matches `id` under `mask`.
    pub fn delete_id_matching(&mut self, id: u32, listid: u8, mask: IdMask) -> EeResult<bool> {
        if id == RESERVED_ID {
            return Ok(false);
        }

        let walk = self.walk_ids(listid, IdOp::Delete { target: IdSlot::new(id), mask }, |_| {})?;
        Ok(walk.deleted)
    }

    /// Call `on_id` for every stored id of list `listid`, in storage order.
    pub fn enumerate_ids<F: FnMut(u32)>(&mut self, listid: u8, on_id: F) -> EeResult<()> {
        self.walk_ids(listid, IdOp::Enumerate, on_id)?;
        Ok(())
    }

    pub fn list_ids(&mut self, listid: u8) -> EeResult<Vec<u32>> {
        let mut ids = Vec::new();
        self.enumerate_ids(listid, |id| ids.push(id))?;
        Ok(ids)
    }

    fn walk_ids<F: FnMut(u32)>(&mut self, listid: u8, op: IdOp, mut on_id: F) -> EeResult<Walk> {
        let mut walk = Walk::default();
        let mut at = self.first_record();

        while let Some(rec) = self.record_at(at)? {
            at = rec.next();
            if rec.key != listid {
                continue;
            }

            // A trailing remainder shorter than a slot is not an id
            let slots = rec.data_len() as u32 / SLOT_LEN;
            for n in 0..slots {
                let addr = rec.data_addr() + n * SLOT_LEN;
                let stored = self.read_slot(addr)?;

                if stored.is_free() {
                    walk.free_slot.get_or_insert(addr);
                    continue;
                }

                match op {
                    IdOp::Query { target, mask } if mask.matches(stored, target) => {
                        walk.found = true;
                        return Ok(walk);
                    }
                    IdOp::Delete { target, mask } if mask.matches(stored, target) => {
                        self.write_slot(addr, IdSlot::FREE)?;
                        walk.deleted = true;
                    }
                    IdOp::Enumerate => on_id(stored.id()),
                    _ => {}
                }
            }
        }
        Ok(walk)
    }

    fn read_slot(&mut self, addr: u32) -> EeResult<IdSlot> {
        let mut bytes = [0u8; SLOT_LEN as usize];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.medium.load(addr + i as u32)?;
        }
        Ok(IdSlot::decode(bytes))
    }

    fn write_slot(&mut self, addr: u32, slot: IdSlot) -> EeResult<()> {
        for (i, &b) in slot.encode().iter().enumerate() {
            self.medium.update(addr + i as u32, b)?;
        }
        Ok(())
    }
}
