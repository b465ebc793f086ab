//! Swap Slot Allocator
//!
//! A bitmap over the swap disk, partitioned into page-sized slots
//! (`PAGE_SIZE / SECTOR_SIZE` sectors each). No LRU tracking here — which
//! page to evict is the Claim/Evict Engine's job (`memory::frame_table`);
//! this module only hands out and reclaims the on-disk storage for an
//! evicted anonymous page.

use spin::Mutex;
use alloc::vec;
use alloc::vec::Vec;

use super::paging::PAGE_SIZE;
use super::swap_disk::{self, SECTOR_SIZE};

pub type SwapSlot = u32;

const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

struct SwapBitmap {
    bits: Vec<u64>,
    slot_count: usize,
}

impl SwapBitmap {
    fn new(slot_count: usize) -> Self {
        Self { bits: vec![0u64; (slot_count + 63) / 64], slot_count }
    }

    fn is_free(&self, slot: usize) -> bool {
        self.bits[slot / 64] & (1 << (slot % 64)) == 0
    }

    fn set_used(&mut self, slot: usize) {
        self.bits[slot / 64] |= 1 << (slot % 64);
    }

    fn set_free(&mut self, slot: usize) {
        self.bits[slot / 64] &= !(1 << (slot % 64));
    }
}

static BITMAP: Mutex<Option<SwapBitmap>> = Mutex::new(None);

pub fn init() {
    let slot_count = swap_disk::sector_count() / SECTORS_PER_PAGE;
    *BITMAP.lock() = Some(SwapBitmap::new(slot_count));
    crate::log!("[SWAP] {} swap slots available", slot_count);
}

/// Allocate a free swap slot. Returns `None` if the swap disk is full.
pub fn allocate() -> Option<SwapSlot> {
    let mut guard = BITMAP.lock();
    let bitmap = guard.as_mut()?;
    for slot in 0..bitmap.slot_count {
        if bitmap.is_free(slot) {
            bitmap.set_used(slot);
            return Some(slot as SwapSlot);
        }
    }
    None
}

/// Release a swap slot, e.g. once its page has been swapped back in or the
/// owning process has exited.
pub fn release(slot: SwapSlot) {
    if let Some(bitmap) = BITMAP.lock().as_mut() {
        bitmap.set_free(slot as usize);
    }
}

/// Write a full page's worth of bytes into `slot`.
pub fn write_from(slot: SwapSlot, page: &[u8; PAGE_SIZE]) {
    let base = slot as usize * SECTORS_PER_PAGE;
    for i in 0..SECTORS_PER_PAGE {
        let mut sector = [0u8; SECTOR_SIZE];
        sector.copy_from_slice(&page[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        swap_disk::write_sector(base + i, &sector);
    }
}

/// Read a full page's worth of bytes out of `slot`.
pub fn read_into(slot: SwapSlot, page: &mut [u8; PAGE_SIZE]) {
    let base = slot as usize * SECTORS_PER_PAGE;
    for i in 0..SECTORS_PER_PAGE {
        let mut sector = [0u8; SECTOR_SIZE];
        swap_disk::read_sector(base + i, &mut sector);
        page[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&sector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_is_reusable() {
        *BITMAP.lock() = Some(SwapBitmap::new(4));
        let a = allocate().unwrap();
        let b = allocate().unwrap();
        assert_ne!(a, b);
        release(a);
        let c = allocate().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn write_then_read_round_trips() {
        *BITMAP.lock() = Some(SwapBitmap::new(4));
        let slot = allocate().unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;
        write_from(slot, &page);
        let mut back = [0u8; PAGE_SIZE];
        read_into(slot, &mut back);
        assert_eq!(page[0], back[0]);
        assert_eq!(page[PAGE_SIZE - 1], back[PAGE_SIZE - 1]);
    }
}
