//! Swap Disk
//!
//! Backing store for [`swap`](super::swap)'s slot allocator. Modeled on
//! `crate::disk`'s RAM-disk sector API, but kept separate: swap I/O has
//! nothing to do with the file layer, and giving it its own disk avoids
//! tangling eviction with `vfs`.

use spin::Mutex;
use alloc::vec;
use alloc::vec::Vec;

pub const SECTOR_SIZE: usize = 512;

/// 16 MB of swap space — enough for a few thousand evicted pages in a
/// teaching kernel with no real backing store.
const SWAP_DISK_SECTORS: usize = (16 * 1024 * 1024) / SECTOR_SIZE;

struct SwapDisk {
    data: Vec<u8>,
}

static SWAP_DISK: Mutex<Option<SwapDisk>> = Mutex::new(None);

pub fn init() {
    *SWAP_DISK.lock() = Some(SwapDisk { data: vec![0u8; SWAP_DISK_SECTORS * SECTOR_SIZE] });
    crate::log!("[SWAP] swap disk ready: {} KB", (SWAP_DISK_SECTORS * SECTOR_SIZE) / 1024);
}

pub fn sector_count() -> usize {
    SWAP_DISK_SECTORS
}

pub fn read_sector(sector: usize, buf: &mut [u8; SECTOR_SIZE]) {
    let disk = SWAP_DISK.lock();
    if let Some(disk) = disk.as_ref() {
        let off = sector * SECTOR_SIZE;
        buf.copy_from_slice(&disk.data[off..off + SECTOR_SIZE]);
    }
}

pub fn write_sector(sector: usize, buf: &[u8; SECTOR_SIZE]) {
    let mut disk = SWAP_DISK.lock();
    if let Some(disk) = disk.as_mut() {
        let off = sector * SECTOR_SIZE;
        disk.data[off..off + SECTOR_SIZE].copy_from_slice(buf);
    }
}
