//! Supplemental Page Table
//!
//! One `BTreeMap<va, Page>` per process, tracking every page the process
//! has mapped whether or not it currently occupies a frame. This is the
//! single source of truth the fault handler, the Claim/Evict Engine, and
//! `mmap`/`munmap` all consult — the hardware page table only ever holds a
//! cache of pages this table says are resident.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use spin::Mutex;

use crate::process::Pid;
use crate::memory::paging::{AddressSpace, PageFlags, PAGE_SIZE};
use super::frame_table::{self, FrameId};
use super::page::{AnonState, FileBacking, Page, PageKind, UninitKind};
use super::swap;
use super::VmError;

static SPT: Mutex<BTreeMap<Pid, BTreeMap<u64, Page>>> = Mutex::new(BTreeMap::new());

fn page_flags(writable: bool) -> PageFlags {
    let bits = PageFlags::PRESENT | PageFlags::USER | if writable { PageFlags::WRITABLE } else { 0 };
    PageFlags::new(bits)
}

fn address_space_of(pid: Pid) -> Option<Arc<Mutex<AddressSpace>>> {
    crate::process::with_process(pid, |p| p.address_space.clone()).flatten()
}

/// Record a new page in `pid`'s supplemental page table. Overwrites any
/// existing entry at the same address.
pub fn insert(pid: Pid, page: Page) {
    SPT.lock().entry(pid).or_insert_with(BTreeMap::new).insert(page.va, page);
}

/// Drop a page's SPT entry without touching its frame or swap slot —
/// callers that need those released should do so first.
pub fn remove(pid: Pid, va: u64) -> Option<Page> {
    SPT.lock().get_mut(&pid)?.remove(&va)
}

pub fn find(pid: Pid, va: u64) -> Option<Page> {
    SPT.lock().get(&pid)?.get(&va).cloned()
}

/// Fault in the page at `va` for `pid`: claim a frame, populate it from
/// whatever the page's current kind says (zero fill, file read, or swap
/// read), and install the hardware mapping. A no-op if the page is already
/// resident.
pub fn claim_page(pid: Pid, va: u64) -> Result<(), VmError> {
    let page = {
        let table = SPT.lock();
        table.get(&pid).and_then(|m| m.get(&va)).cloned().ok_or(VmError::NotFound)?
    };

    if page.frame.is_some() {
        return Ok(());
    }

    let (frame_id, kva) = frame_table::acquire(pid, va)?;
    let buf = unsafe { core::slice::from_raw_parts_mut(kva as *mut u8, PAGE_SIZE) };

    let new_kind = match &page.kind {
        PageKind::Uninit(UninitKind::Anonymous) => PageKind::Anonymous(AnonState::default()),
        PageKind::Uninit(UninitKind::File(fb)) => {
            load_file_backing(fb, buf)?;
            PageKind::FileBacked(fb.clone())
        }
        PageKind::Anonymous(state) => {
            if let Some(slot) = state.swap_slot {
                swap::read_into(slot, buf.try_into().unwrap());
                swap::release(slot);
            }
            PageKind::Anonymous(AnonState::default())
        }
        PageKind::FileBacked(fb) => {
            load_file_backing(fb, buf)?;
            PageKind::FileBacked(fb.clone())
        }
    };

    let space = address_space_of(pid).ok_or(VmError::NotFound)?;
    let phys = frame_table::phys_of(frame_id).ok_or(VmError::OutOfMemory)?;
    space.lock().map_page(va, phys, page_flags(page.writable)).ok_or(VmError::OutOfMemory)?;
    frame_table::unpin(frame_id);

    let mut table = SPT.lock();
    if let Some(slot) = table.get_mut(&pid).and_then(|m| m.get_mut(&va)) {
        slot.frame = Some(frame_id);
        slot.kind = new_kind;
    }
    Ok(())
}

fn load_file_backing(fb: &FileBacking, buf: &mut [u8]) -> Result<(), VmError> {
    let read_bytes = fb.read_bytes as usize;
    let n = fb.file.read_at(fb.offset, &mut buf[..read_bytes]).map_err(|_| VmError::Io)?;
    for b in &mut buf[n..] {
        *b = 0;
    }
    Ok(())
}

/// Evict the page at `(pid, va)` out of `frame_id`: save its content (swap
/// slot for anonymous, write-back for a dirty file-backed page), clear the
/// hardware mapping, and release the frame. Called by the Claim/Evict
/// Engine's clock sweep when it picks this frame as a victim.
pub fn evict_page(pid: Pid, va: u64, frame_id: FrameId) -> Result<(), VmError> {
    let kva = frame_table::kva_of(frame_id).ok_or(VmError::NotFound)?;
    let buf = unsafe { core::slice::from_raw_parts(kva as *const u8, PAGE_SIZE) };
    let space = address_space_of(pid).ok_or(VmError::NotFound)?;

    let new_kind = {
        let mut table = SPT.lock();
        let page = table.get_mut(&pid).and_then(|m| m.get_mut(&va)).ok_or(VmError::NotFound)?;

        match &page.kind {
            PageKind::Anonymous(_) => {
                let slot = swap::allocate().ok_or(VmError::OutOfMemory)?;
                swap::write_from(slot, buf.try_into().unwrap());
                PageKind::Anonymous(AnonState { swap_slot: Some(slot) })
            }
            PageKind::FileBacked(fb) => {
                if space.lock().is_dirty(va) {
                    let len = fb.read_bytes as usize;
                    fb.file.write_at(fb.offset, &buf[..len]).map_err(|_| VmError::Io)?;
                }
                PageKind::FileBacked(fb.clone())
            }
            PageKind::Uninit(_) => return Err(VmError::NotFound),
        }
    };

    {
        let mut guard = space.lock();
        guard.unmap_page(va);
        guard.clear_dirty(va);
    }

    let mut table = SPT.lock();
    if let Some(slot) = table.get_mut(&pid).and_then(|m| m.get_mut(&va)) {
        slot.frame = None;
        slot.kind = new_kind;
    }
    drop(table);

    frame_table::release(frame_id);
    Ok(())
}

/// Build a fresh `AddressSpace` for a forked child, eagerly copying every
/// page the parent has in its supplemental page table. No sharing survives
/// the fork: anonymous pages get their own frame and (if evicted) are read
/// back from swap into it; file-backed pages get their own lazily-reread
/// file handle.
pub fn fork_address_space(parent: Pid, child: Pid) -> Result<Arc<Mutex<AddressSpace>>, VmError> {
    let new_space = AddressSpace::new_with_kernel().ok_or(VmError::OutOfMemory)?;
    let new_space = Arc::new(Mutex::new(new_space));

    let parent_pages: alloc::vec::Vec<Page> = {
        let table = SPT.lock();
        table.get(&parent).map(|m| m.values().cloned().collect()).unwrap_or_default()
    };

    for page in parent_pages {
        let child_page = match &page.kind {
            PageKind::Uninit(UninitKind::Anonymous) => {
                Page::new_uninit_anon(child, page.va, page.writable)
            }
            PageKind::Uninit(UninitKind::File(fb)) => {
                Page::new_uninit_file(child, page.va, page.writable, fb.reopened())
            }
            PageKind::FileBacked(fb) => {
                Page::new_uninit_file(child, page.va, page.writable, fb.reopened())
            }
            PageKind::Anonymous(state) => {
                let mut buf = [0u8; PAGE_SIZE];
                if let Some(fid) = page.frame {
                    if let Some(kva) = frame_table::kva_of(fid) {
                        let src = unsafe { core::slice::from_raw_parts(kva as *const u8, PAGE_SIZE) };
                        buf.copy_from_slice(src);
                    }
                } else if let Some(slot) = state.swap_slot {
                    swap::read_into(slot, &mut buf);
                }

                let (cfid, ckva) = frame_table::acquire(child, page.va)?;
                unsafe {
                    core::ptr::copy_nonoverlapping(buf.as_ptr(), ckva as *mut u8, PAGE_SIZE);
                }
                let phys = frame_table::phys_of(cfid).ok_or(VmError::OutOfMemory)?;
                new_space.lock().map_page(page.va, phys, page_flags(page.writable)).ok_or(VmError::OutOfMemory)?;
                frame_table::unpin(cfid);

                Page { va: page.va, writable: page.writable, owner: child, frame: Some(cfid), kind: PageKind::Anonymous(AnonState::default()) }
            }
        };
        insert(child, child_page);
    }

    Ok(new_space)
}

/// Tear down every SPT entry for `pid`: release its frames and swap slots.
/// Called when a process is reaped.
pub fn destroy(pid: Pid) {
    let pages = {
        let mut table = SPT.lock();
        table.remove(&pid).unwrap_or_default()
    };

    for (_, page) in pages {
        if let Some(fid) = page.frame {
            frame_table::release(fid);
        }
        if let PageKind::Anonymous(state) = &page.kind {
            if let Some(slot) = state.swap_slot {
                swap::release(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove_round_trip() {
        let pid: Pid = 4242;
        let page = Page::new_uninit_anon(pid, 0x4000, true);
        insert(pid, page);

        let found = find(pid, 0x4000).expect("page should be in the table");
        assert!(!found.is_resident());
        assert!(matches!(found.kind, PageKind::Uninit(UninitKind::Anonymous)));

        let removed = remove(pid, 0x4000);
        assert!(removed.is_some());
        assert!(find(pid, 0x4000).is_none());
    }

    #[test]
    fn find_on_unknown_pid_or_address_is_none() {
        assert!(find(99999, 0x1000).is_none());
        let pid: Pid = 4243;
        insert(pid, Page::new_uninit_anon(pid, 0x5000, true));
        assert!(find(pid, 0x6000).is_none());
    }

    #[test]
    fn destroy_clears_every_entry_for_the_pid() {
        let pid: Pid = 4244;
        insert(pid, Page::new_uninit_anon(pid, 0x7000, true));
        insert(pid, Page::new_uninit_anon(pid, 0x8000, false));
        destroy(pid);
        assert!(find(pid, 0x7000).is_none());
        assert!(find(pid, 0x8000).is_none());
    }

    #[test]
    fn claim_page_on_missing_entry_reports_not_found() {
        assert_eq!(claim_page(99998, 0x9000), Err(VmError::NotFound));
    }
}
