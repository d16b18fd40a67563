#![cfg(feature = "std")]

use crate::RamMedium;
use eefs_hal::ByteMedium;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::format;

/// Load a medium image. A missing file yields a fresh (all erased) part.
pub fn load_image(path: &Path, capacity: u32) -> io::Result<RamMedium> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no image at {}, starting from a blank part", path.display());
            return Ok(RamMedium::new(capacity));
        }
        Err(e) => return Err(e),
    };

    if bytes.len() != capacity as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("image is {} bytes, expected {}", bytes.len(), capacity),
        ));
    }
    Ok(RamMedium::from_bytes(bytes))
}

/// Persist a medium image. Wear counters are not saved.
pub fn save_image(path: &Path, medium: &RamMedium) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");

    // 1. Write .tmp
    {
        let mut file = OpenOptions::new()
            .write(true).create(true).truncate(true)
            .open(&tmp_path)?;
        file.write_all(medium.as_bytes())?;

        // 2. FSYNC
        file.sync_all()?;
    }

    // 3. Rename (Atomic)
    fs::rename(&tmp_path, path)?;

    // 4. Sync Parent Dir
    if let Some(parent) = path.parent() {
        if let Ok(f) = File::open(parent) { let _ = f.sync_all(); }
    }

    debug!("saved {} byte image to {}", medium.capacity(), path.display());
    Ok(())
}
