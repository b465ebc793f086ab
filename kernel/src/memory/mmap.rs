//! File-Backed and Anonymous Memory Mapping
//!
//! `do_mmap`/`do_munmap` register a run of pages with the supplemental
//! page table as `Uninit` — nothing is loaded or mapped until the process
//! actually touches a page and the fault handler claims it (§4.5). A
//! `Region` remembers the mapping's extent so `munmap` can walk back over
//! exactly the pages it created and write back any that are dirty.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::process::Pid;
use crate::vfs::VmFile;
use super::page::{FileBacking, Page};
use super::paging::{is_user_address, PAGE_SIZE};
use super::{spt, VmError};

struct Region {
    start: u64,
    pages: usize,
    file: Option<Arc<dyn VmFile>>,
    writable: bool,
}

static REGIONS: Mutex<BTreeMap<Pid, Vec<Region>>> = Mutex::new(BTreeMap::new());

fn page_align(addr: u64) -> bool {
    addr % PAGE_SIZE as u64 == 0
}

/// Reserve `length` bytes starting at `addr` for `pid`, backed by `file` at
/// `offset` (or anonymous zero pages if `file` is `None`). `addr` and
/// `offset` must be page-aligned, `addr` nonzero — this mmap never chooses a
/// placement for the caller. Returns the mapped address, or `None` on any
/// precondition failure (null or misaligned `addr`/`offset`, zero `length`,
/// a zero-length file, an end past the user-address ceiling, or overlap with
/// an already-mapped page) without any side effect.
pub fn do_mmap(
    pid: Pid,
    addr: u64,
    length: usize,
    writable: bool,
    file: Option<Arc<dyn VmFile>>,
    offset: u64,
) -> Option<u64> {
    if addr == 0 || length == 0 || !page_align(addr) || !page_align(offset) {
        return None;
    }

    let file_len = match &file {
        Some(f) => {
            let len = f.len();
            if len == 0 {
                return None;
            }
            len
        }
        None => 0,
    };

    let last_byte = addr.checked_add(length as u64 - 1)?;
    if !is_user_address(addr) || !is_user_address(last_byte) {
        return None;
    }

    let page_count = (length + PAGE_SIZE - 1) / PAGE_SIZE;

    // Validate every page is free before touching the SPT: once we start
    // inserting there is nothing left to fail, so no rollback is needed.
    for i in 0..page_count {
        let va = addr + (i * PAGE_SIZE) as u64;
        if spt::find(pid, va).is_some() {
            return None;
        }
    }

    for i in 0..page_count {
        let va = addr + (i * PAGE_SIZE) as u64;
        let page = match &file {
            Some(f) => {
                let page_offset = offset + (i * PAGE_SIZE) as u64;
                let remaining = file_len.saturating_sub(page_offset);
                let read_bytes = remaining.min(PAGE_SIZE as u64) as u32;
                let zero_bytes = PAGE_SIZE as u32 - read_bytes;
                let backing = FileBacking { file: f.reopen(), offset: page_offset, read_bytes, zero_bytes };
                Page::new_uninit_file(pid, va, writable, backing)
            }
            None => Page::new_uninit_anon(pid, va, writable),
        };
        spt::insert(pid, page);
    }

    REGIONS.lock().entry(pid).or_insert_with(Vec::new).push(Region {
        start: addr,
        pages: page_count,
        file,
        writable,
    });

    Some(addr)
}

/// Unmap the region starting at `addr`. Any resident, dirty, file-backed
/// page in it is written back before its supplemental page table entry is
/// dropped; anonymous pages (and their swap slots, if evicted) are simply
/// discarded. A no-op (not an error) if no region starts at `addr`.
pub fn do_munmap(pid: Pid, addr: u64) -> Result<(), VmError> {
    let region = {
        let mut regions = REGIONS.lock();
        let list = match regions.get_mut(&pid) {
            Some(list) => list,
            None => return Ok(()),
        };
        match list.iter().position(|r| r.start == addr) {
            Some(idx) => list.remove(idx),
            None => return Ok(()),
        }
    };

    for i in 0..region.pages {
        let va = region.start + (i * PAGE_SIZE) as u64;
        if let Some(page) = spt::find(pid, va) {
            if let Some(frame_id) = page.frame {
                // Evicting through the normal path writes back a dirty
                // file-backed page and frees the frame either way.
                spt::evict_page(pid, va, frame_id).ok();
            }
        }
        spt::remove(pid, va);
    }

    Ok(())
}

/// Drop all of a process's mmap bookkeeping without writing anything back
/// (used on process exit, where `spt::destroy` already reclaims the frames).
pub fn destroy(pid: Pid) {
    REGIONS.lock().remove(&pid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::VfsResult;

    struct FakeFile(u64);

    impl VmFile for FakeFile {
        fn read_at(&self, _offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
            buf.fill(0);
            Ok(buf.len())
        }
        fn write_at(&self, _offset: u64, buf: &[u8]) -> VfsResult<usize> {
            Ok(buf.len())
        }
        fn len(&self) -> u64 {
            self.0
        }
        fn reopen(&self) -> Arc<dyn VmFile> {
            Arc::new(FakeFile(self.0))
        }
    }

    #[test]
    fn rejects_null_or_misaligned_or_empty_requests() {
        let pid: Pid = 5001;
        assert_eq!(do_mmap(pid, 0, PAGE_SIZE, true, None, 0), None);
        assert_eq!(do_mmap(pid, 0x1001, PAGE_SIZE, true, None, 0), None);
        assert_eq!(do_mmap(pid, 0x2000, 0, true, None, 0), None);
    }

    #[test]
    fn rejects_misaligned_offset() {
        let pid: Pid = 5005;
        let file: Arc<dyn VmFile> = Arc::new(FakeFile(PAGE_SIZE as u64 * 2));
        assert_eq!(do_mmap(pid, 0x3000_0000, PAGE_SIZE, true, Some(file), 1), None);
    }

    #[test]
    fn rejects_zero_length_file() {
        let pid: Pid = 5006;
        let file: Arc<dyn VmFile> = Arc::new(FakeFile(0));
        assert_eq!(do_mmap(pid, 0x3100_0000, PAGE_SIZE, true, Some(file), 0), None);
    }

    #[test]
    fn rejects_end_past_user_address_ceiling() {
        let pid: Pid = 5007;
        let addr = 0x0000_7FFF_FFFF_F000u64;
        assert_eq!(do_mmap(pid, addr, PAGE_SIZE * 2, true, None, 0), None);
    }

    #[test]
    fn rejects_overlap_with_existing_mapping() {
        let pid: Pid = 5008;
        let addr = 0x3200_0000u64;
        do_mmap(pid, addr, PAGE_SIZE * 2, true, None, 0).expect("first mmap should succeed");

        // Overlaps the second page of the first mapping.
        let overlapping = addr + PAGE_SIZE as u64;
        assert_eq!(do_mmap(pid, overlapping, PAGE_SIZE * 2, true, None, 0), None);

        // The original mapping is untouched by the rejected overlap.
        assert!(spt::find(pid, addr).is_some());
        assert!(spt::find(pid, addr + PAGE_SIZE as u64).is_some());

        destroy(pid);
        spt::destroy(pid);
    }

    #[test]
    fn anonymous_mapping_registers_one_uninit_page_per_page_slot() {
        let pid: Pid = 5002;
        let addr = 0x4000_0000u64;
        let mapped = do_mmap(pid, addr, PAGE_SIZE * 3, true, None, 0);
        assert_eq!(mapped, Some(addr));

        for i in 0..3u64 {
            let page = spt::find(pid, addr + i * PAGE_SIZE as u64);
            assert!(page.is_some(), "page {i} should be in the supplemental page table");
        }

        destroy(pid);
        spt::destroy(pid);
    }

    #[test]
    fn munmap_drops_every_page_the_mapping_created() {
        let pid: Pid = 5003;
        let addr = 0x5000_0000u64;
        do_mmap(pid, addr, PAGE_SIZE * 2, true, None, 0).expect("mmap should succeed");

        do_munmap(pid, addr).expect("munmap should find the region it just created");

        assert!(spt::find(pid, addr).is_none());
        assert!(spt::find(pid, addr + PAGE_SIZE as u64).is_none());
    }

    #[test]
    fn munmap_on_unknown_address_is_a_silent_no_op() {
        let pid: Pid = 5004;
        assert_eq!(do_munmap(pid, 0x6000_0000), Ok(()));
    }
}
