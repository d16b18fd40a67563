use eefs_core::{CHECKPOINT_ALL_ONES, ERASED};

/// First rung of the small-increment ladder.
pub(crate) const STEP_START: u8 = 0x7F;

/// What one counter byte contributes to a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cell {
    Erased,
    /// Ladder byte worth a fixed increment (0x7F = 2 ... 0x00 = 9).
    Step(u32),
    /// 7 payload bits of a checkpoint register.
    Checkpoint(u32),
    Inert,
}

pub(crate) fn classify(b: u8) -> Cell {
    match b {
        ERASED => Cell::Erased,
        CHECKPOINT_ALL_ONES => Cell::Checkpoint(0x7F),
        0x80..=0xFE => Cell::Checkpoint((b & 0x7F) as u32),
        _ if is_step(b) => Cell::Step(9 - b.count_ones()),
        _ => Cell::Inert,
    }
}

/// Ladder bytes are 0x7F with some number of high bits cleared: 2^k - 1 for k <= 7.
fn is_step(b: u8) -> bool {
    b < 0x80 && b & b.wrapping_add(1) == 0
}

/// Next rung down, or `None` once the byte is spent (0x00) or not a ladder byte.
pub(crate) fn next_step(b: u8) -> Option<u8> {
    if b != 0 && is_step(b) { Some(b >> 1) } else { None }
}

pub(crate) fn is_checkpoint(b: u8) -> bool {
    matches!(classify(b), Cell::Checkpoint(_))
}

/// Checkpoint byte carrying chunk `chunk` (0 = least significant 7 bits) of `value`.
pub(crate) fn checkpoint_chunk(value: u32, chunk: u32) -> u8 {
    let b = (value >> (7 * chunk)) as u8 | 0x80;
    if b == ERASED { CHECKPOINT_ALL_ONES } else { b }
}
