use std::{fs::File, io, path::Path};

use memmap2::{Mmap, MmapOptions};

/// Opens a memory mapped file.
pub fn map_file<P: AsRef<Path>>(path: P) -> io::Result<Mmap> {
    let file = File::open(&path)?;
    let map = unsafe { MmapOptions::new().map(&file) }?;
    Ok(map)
}
