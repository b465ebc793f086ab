//! Frame Table
//!
//! Tracks every physical frame currently backing a user page: who owns it
//! (`Pid`, virtual address) and whether it's pinned against eviction while
//! I/O is in flight. This sits above the raw frame allocator
//! (`memory::frame`, a bitmap of all physical RAM) — the frame table only
//! ever holds frames that are actually mapped into some process's address
//! space right now.
//!
//! Eviction is clock/second-chance (§4.3): sweep the table looking for an
//! unpinned frame whose accessed bit is clear, clearing accessed bits (and
//! giving a second chance) on the way past. The sweep is bounded to twice
//! the table size so it terminates even if every frame looks busy.

use alloc::vec::Vec;
use spin::Mutex;

use crate::process::Pid;
use super::VmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameId(pub usize);

struct Frame {
    phys: u64,
    owner: Option<(Pid, u64)>,
    pinned: bool,
}

static FRAMES: Mutex<Vec<Frame>> = Mutex::new(Vec::new());
static CLOCK_HAND: Mutex<usize> = Mutex::new(0);

/// Claim a frame for `(pid, va)`, evicting a victim if physical memory is
/// exhausted. Returns the frame's id and its HHDM kernel virtual address.
/// The frame comes back pinned — callers must `unpin` once they've finished
/// populating and mapping it.
pub fn acquire(pid: Pid, va: u64) -> Result<(FrameId, u64), VmError> {
    for attempt in 0..2 {
        if let Some(phys) = crate::memory::frame::alloc_frame_zeroed() {
            let kva = crate::memory::phys_to_virt(phys);
            let mut frames = FRAMES.lock();
            let id = FrameId(frames.len());
            frames.push(Frame { phys, owner: Some((pid, va)), pinned: true });
            return Ok((id, kva));
        }
        if attempt == 0 {
            evict_one()?;
        }
    }
    Err(VmError::OutOfMemory)
}

/// Mark a claimed frame as eligible for eviction.
pub fn unpin(id: FrameId) {
    if let Some(f) = FRAMES.lock().get_mut(id.0) {
        f.pinned = false;
    }
}

pub fn pin(id: FrameId) {
    if let Some(f) = FRAMES.lock().get_mut(id.0) {
        f.pinned = true;
    }
}

/// Release a frame back to the physical allocator. Called once its content
/// has been written out (or discarded) and it's unmapped from the owner's
/// address space.
pub fn release(id: FrameId) {
    let phys = {
        let mut frames = FRAMES.lock();
        match frames.get_mut(id.0) {
            Some(f) if f.owner.is_some() => {
                f.owner = None;
                f.phys
            }
            _ => return,
        }
    };
    crate::memory::frame::free_frame(phys);
}

/// Run one clock sweep and evict a single victim frame. Delegates the
/// actual content save (swap-out / file write-back) and hardware unmap to
/// `memory::spt::evict_page`, which calls back into `release` once done.
fn evict_one() -> Result<(), VmError> {
    let frame_count = FRAMES.lock().len();
    if frame_count == 0 {
        return Err(VmError::OutOfMemory);
    }

    let max_scans = frame_count * 2;
    for _ in 0..max_scans {
        let mut hand = CLOCK_HAND.lock();
        let idx = *hand % frame_count;
        *hand = (*hand + 1) % frame_count;
        drop(hand);

        let candidate = {
            let frames = FRAMES.lock();
            frames.get(idx).and_then(|f| {
                if f.pinned { None } else { f.owner }
            })
        };

        let (pid, va) = match candidate {
            Some(owner) => owner,
            None => continue,
        };

        let accessed = crate::process::with_process(pid, |p| {
            p.address_space.as_ref().map(|space| space.lock().is_accessed(va))
        }).flatten().unwrap_or(false);

        if accessed {
            crate::process::with_process(pid, |p| {
                if let Some(space) = &p.address_space {
                    space.lock().clear_accessed(va);
                }
            });
            continue;
        }

        return super::spt::evict_page(pid, va, FrameId(idx));
    }

    Err(VmError::OutOfMemory)
}

pub fn frame_count() -> usize {
    FRAMES.lock().len()
}

/// Physical address of a claimed frame, for installing a hardware mapping.
pub fn phys_of(id: FrameId) -> Option<u64> {
    FRAMES.lock().get(id.0).map(|f| f.phys)
}

/// HHDM kernel virtual address of a claimed frame, for reading/writing its content.
pub fn kva_of(id: FrameId) -> Option<u64> {
    FRAMES.lock().get(id.0).map(|f| crate::memory::phys_to_virt(f.phys))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_frame_id_resolves_to_nothing() {
        let id = FrameId(9999);
        assert_eq!(phys_of(id), None);
        assert_eq!(kva_of(id), None);
    }

    #[test]
    fn pin_and_unpin_on_unknown_id_are_no_ops() {
        let id = FrameId(9999);
        pin(id);
        unpin(id);
        release(id);
    }

    #[test]
    fn acquire_without_physical_memory_reports_out_of_memory() {
        assert_eq!(acquire(1, 0x1000), Err(VmError::OutOfMemory));
    }
}
