//! Page Descriptor
//!
//! Every virtual page a process has mapped is described by one `Page`,
//! independent of whether it currently occupies a physical frame. A page
//! starts `Uninit` (its content hasn't been loaded yet — either a zeroed
//! anonymous page or unread file bytes) and transitions to `Anonymous` or
//! `FileBacked` the first time the fault handler claims it. From there it
//! can be evicted back out (to a swap slot, or discarded if it's a clean
//! file-backed page) and reloaded on the next fault.

use alloc::sync::Arc;
use crate::process::Pid;
use crate::vfs::VmFile;

use super::frame_table::FrameId;
use super::swap::SwapSlot;

/// Where a file-backed page's bytes come from, and how much of the final
/// page is beyond EOF and must be zero-filled.
#[derive(Clone)]
pub struct FileBacking {
    pub file: Arc<dyn VmFile>,
    pub offset: u64,
    pub read_bytes: u32,
    pub zero_bytes: u32,
}

impl FileBacking {
    /// An independent handle to the same underlying file, for a page being
    /// copied into another process's supplemental page table (fork).
    pub fn reopened(&self) -> Self {
        Self { file: self.file.reopen(), offset: self.offset, read_bytes: self.read_bytes, zero_bytes: self.zero_bytes }
    }
}

/// What an unclaimed page will be initialized from.
#[derive(Clone)]
pub enum UninitKind {
    Anonymous,
    File(FileBacking),
}

#[derive(Clone, Default)]
pub struct AnonState {
    pub swap_slot: Option<SwapSlot>,
}

#[derive(Clone)]
pub enum PageKind {
    Uninit(UninitKind),
    Anonymous(AnonState),
    FileBacked(FileBacking),
}

/// Supplemental page table entry: everything needed to satisfy a fault on
/// this virtual page, or to evict it, without consulting the hardware page
/// table for anything but the accessed/dirty bits.
#[derive(Clone)]
pub struct Page {
    pub va: u64,
    pub writable: bool,
    pub owner: Pid,
    pub frame: Option<FrameId>,
    pub kind: PageKind,
}

impl Page {
    pub fn new_uninit_anon(owner: Pid, va: u64, writable: bool) -> Self {
        Self { va, writable, owner, frame: None, kind: PageKind::Uninit(UninitKind::Anonymous) }
    }

    pub fn new_uninit_file(owner: Pid, va: u64, writable: bool, backing: FileBacking) -> Self {
        Self { va, writable, owner, frame: None, kind: PageKind::Uninit(UninitKind::File(backing)) }
    }

    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }
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
    fn fresh_anon_page_is_uninit_and_not_resident() {
        let page = Page::new_uninit_anon(1, 0x1000, true);
        assert!(!page.is_resident());
        assert!(matches!(page.kind, PageKind::Uninit(UninitKind::Anonymous)));
    }

    #[test]
    fn fresh_file_page_carries_its_backing() {
        let backing = FileBacking { file: Arc::new(FakeFile(4096)), offset: 0, read_bytes: 4096, zero_bytes: 0 };
        let page = Page::new_uninit_file(2, 0x2000, false, backing);
        match &page.kind {
            PageKind::Uninit(UninitKind::File(b)) => assert_eq!(b.file.len(), 4096),
            _ => panic!("expected Uninit(File)"),
        }
    }

    #[test]
    fn reopened_backing_is_independent_but_same_length() {
        let backing = FileBacking { file: Arc::new(FakeFile(128)), offset: 16, read_bytes: 112, zero_bytes: 0 };
        let copy = backing.reopened();
        assert_eq!(copy.offset, backing.offset);
        assert_eq!(copy.file.len(), backing.file.len());
    }
}
