//! Virtual File System
//!
//! A minimal in-memory file layer. Every regular file is a `Vec<u8>` behind
//! a lock; directories are name -> inode maps. This is enough to back the
//! process fd table (open/read/write/close/lseek) and to hand out the
//! independent, position-free file handles that `mmap` reopens.
//!
//! Not a general-purpose VFS: no mount points, no device nodes, no on-disk
//! format. Swap lives on its own disk (`memory::swap_disk`); this module
//! only ever stores file content in heap memory.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, RwLock};

/// Open flags (subset of the Linux bit layout, enough for O_RDONLY/O_WRONLY/O_RDWR/O_CREAT/O_TRUNC)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0o0;
    pub const O_WRONLY: u32 = 0o1;
    pub const O_RDWR: u32 = 0o2;
    pub const O_CREAT: u32 = 0o100;
    pub const O_TRUNC: u32 = 0o1000;

    pub fn readable(&self) -> bool {
        self.0 & 0o3 != Self::O_WRONLY
    }
    pub fn writable(&self) -> bool {
        self.0 & 0o3 != Self::O_RDONLY
    }
    pub fn creates(&self) -> bool {
        self.0 & Self::O_CREAT != 0
    }
    pub fn truncates(&self) -> bool {
        self.0 & Self::O_TRUNC != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    NotADirectory,
    IsADirectory,
    BadFd,
    InvalidArgument,
}

pub type VfsResult<T> = Result<T, VfsError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Stat {
    pub size: u64,
    pub is_dir: bool,
}

/// A file's content. Reachable by path through the directory tree, but kept
/// alive by any `Arc<Inode>` a caller holds independent of that path —
/// exactly the "reopen" semantics the VM core's file-backed mappings need.
struct Inode {
    data: Mutex<Vec<u8>>,
}

enum Node {
    File(Arc<Inode>),
    Dir(BTreeMap<String, Node>),
}

struct Fs {
    root: Node,
}

impl Fs {
    fn new() -> Self {
        Self { root: Node::Dir(BTreeMap::new()) }
    }

    fn split(path: &str) -> Vec<&str> {
        path.split('/').filter(|c| !c.is_empty()).collect()
    }

    fn lookup(&self, path: &str) -> Option<&Node> {
        let mut cur = &self.root;
        for part in Self::split(path) {
            match cur {
                Node::Dir(children) => cur = children.get(part)?,
                Node::File(_) => return None,
            }
        }
        Some(cur)
    }

    fn lookup_file(&self, path: &str) -> VfsResult<Arc<Inode>> {
        match self.lookup(path) {
            Some(Node::File(inode)) => Ok(inode.clone()),
            Some(Node::Dir(_)) => Err(VfsError::IsADirectory),
            None => Err(VfsError::NotFound),
        }
    }

    fn create_file(&mut self, path: &str) -> VfsResult<Arc<Inode>> {
        let parts = Self::split(path);
        let (name, dirs) = match parts.split_last() {
            Some((name, dirs)) => (*name, dirs),
            None => return Err(VfsError::InvalidArgument),
        };

        let mut cur = &mut self.root;
        for part in dirs {
            let children = match cur {
                Node::Dir(children) => children,
                Node::File(_) => return Err(VfsError::NotADirectory),
            };
            cur = children.entry(part.to_string()).or_insert_with(|| Node::Dir(BTreeMap::new()));
        }

        let children = match cur {
            Node::Dir(children) => children,
            Node::File(_) => return Err(VfsError::NotADirectory),
        };

        if let Some(existing) = children.get(name) {
            return match existing {
                Node::File(inode) => Ok(inode.clone()),
                Node::Dir(_) => Err(VfsError::IsADirectory),
            };
        }

        let inode = Arc::new(Inode { data: Mutex::new(Vec::new()) });
        children.insert(name.to_string(), Node::File(inode.clone()));
        Ok(inode)
    }

    fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        let parts = Self::split(path);
        let mut cur = &mut self.root;
        for part in &parts {
            let children = match cur {
                Node::Dir(children) => children,
                Node::File(_) => return Err(VfsError::NotADirectory),
            };
            cur = children.entry(part.to_string()).or_insert_with(|| Node::Dir(BTreeMap::new()));
        }
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> VfsResult<()> {
        let parts = Self::split(path);
        let (name, dirs) = match parts.split_last() {
            Some((name, dirs)) => (*name, dirs),
            None => return Err(VfsError::InvalidArgument),
        };
        let mut cur = &mut self.root;
        for part in dirs {
            let children = match cur {
                Node::Dir(children) => children,
                Node::File(_) => return Err(VfsError::NotADirectory),
            };
            cur = children.get_mut(*part).ok_or(VfsError::NotFound)?;
        }
        let children = match cur {
            Node::Dir(children) => children,
            Node::File(_) => return Err(VfsError::NotADirectory),
        };
        children.remove(name).map(|_| ()).ok_or(VfsError::NotFound)
    }
}

static FS: RwLock<Option<Fs>> = RwLock::new(None);
static CWD: Mutex<String> = Mutex::new(String::new());

pub fn init() {
    *FS.write() = Some(Fs::new());
    *CWD.lock() = String::from("/");
    crate::log!("[VFS] In-memory filesystem ready");
}

/// The file interface the VM core actually needs: `read_at`/`write_at` at an
/// explicit offset (no shared position), a length, and an independent
/// `reopen`. Everything else (the fd table, path lookup) lives above this.
pub trait VmFile: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize>;
    fn len(&self) -> u64;
    fn reopen(&self) -> Arc<dyn VmFile>;
}

/// Wraps an `Arc<Inode>` so `reopen()` can clone the Arc itself rather than
/// `self` (trait objects can't be cloned without knowing the concrete type).
struct ReopenableFile(Arc<Inode>);

impl VmFile for ReopenableFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let data = self.0.data.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        let mut data = self.0.data.lock();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn len(&self) -> u64 {
        self.0.data.lock().len() as u64
    }

    fn reopen(&self) -> Arc<dyn VmFile> {
        Arc::new(ReopenableFile(self.0.clone()))
    }
}

/// Open (creating if requested) a file for the VM core's own use — this is
/// the `file_reopen`-capable handle `mmap` stores in its Region.
pub fn open_vm_file(path: &str, flags: OpenFlags) -> VfsResult<Arc<dyn VmFile>> {
    let mut guard = FS.write();
    let fs = guard.as_mut().ok_or(VfsError::NotFound)?;
    let inode = if flags.creates() {
        fs.create_file(path)?
    } else {
        fs.lookup_file(path)?
    };
    if flags.truncates() {
        inode.data.lock().clear();
    }
    Ok(Arc::new(ReopenableFile(inode)))
}

// ── Process fd table: a small open-file-description layer on top of VmFile ──

struct OpenFile {
    file: Arc<dyn VmFile>,
    pos: u64,
}

static OPEN_FILES: Mutex<BTreeMap<i32, OpenFile>> = Mutex::new(BTreeMap::new());
static NEXT_FD: Mutex<i32> = Mutex::new(3); // 0/1/2 reserved for stdio

pub fn open(path: &str, flags: OpenFlags) -> VfsResult<i32> {
    let file = open_vm_file(path, flags)?;
    let mut next = NEXT_FD.lock();
    let fd = *next;
    *next += 1;
    OPEN_FILES.lock().insert(fd, OpenFile { file, pos: 0 });
    Ok(fd)
}

pub fn read(fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
    let mut files = OPEN_FILES.lock();
    let entry = files.get_mut(&fd).ok_or(VfsError::BadFd)?;
    let n = entry.file.read_at(entry.pos, buf)?;
    entry.pos += n as u64;
    Ok(n)
}

pub fn write(fd: i32, buf: &[u8]) -> VfsResult<usize> {
    let mut files = OPEN_FILES.lock();
    let entry = files.get_mut(&fd).ok_or(VfsError::BadFd)?;
    let n = entry.file.write_at(entry.pos, buf)?;
    entry.pos += n as u64;
    Ok(n)
}

pub fn close(fd: i32) -> VfsResult<()> {
    OPEN_FILES.lock().remove(&fd).map(|_| ()).ok_or(VfsError::BadFd)
}

/// Resolve an open-file-description fd to its underlying file, for mmap —
/// an independent handle via `reopen()`, since the mapping outlives whatever
/// the caller does with the fd afterward.
pub fn vm_file_for_fd(fd: i32) -> VfsResult<Arc<dyn VmFile>> {
    let files = OPEN_FILES.lock();
    let entry = files.get(&fd).ok_or(VfsError::BadFd)?;
    Ok(entry.file.reopen())
}

pub fn lseek(fd: i32, offset: i64, whence: u32) -> VfsResult<u64> {
    const SEEK_SET: u32 = 0;
    const SEEK_CUR: u32 = 1;
    const SEEK_END: u32 = 2;

    let mut files = OPEN_FILES.lock();
    let entry = files.get_mut(&fd).ok_or(VfsError::BadFd)?;
    let base = match whence {
        SEEK_SET => 0,
        SEEK_CUR => entry.pos,
        SEEK_END => entry.file.len(),
        _ => return Err(VfsError::InvalidArgument),
    };
    let new_pos = (base as i64 + offset).max(0) as u64;
    entry.pos = new_pos;
    Ok(new_pos)
}

pub fn stat_fd(fd: i32) -> VfsResult<Stat> {
    let files = OPEN_FILES.lock();
    let entry = files.get(&fd).ok_or(VfsError::BadFd)?;
    Ok(Stat { size: entry.file.len(), is_dir: false })
}

pub fn mkdir(path: &str) -> VfsResult<()> {
    FS.write().as_mut().ok_or(VfsError::NotFound)?.mkdir(path)
}

pub fn unlink(path: &str) -> VfsResult<()> {
    FS.write().as_mut().ok_or(VfsError::NotFound)?.unlink(path)
}

pub fn getcwd() -> String {
    CWD.lock().clone()
}

pub fn chdir(path: &str) -> VfsResult<()> {
    let guard = FS.read();
    let fs = guard.as_ref().ok_or(VfsError::NotFound)?;
    match fs.lookup(path) {
        Some(Node::Dir(_)) => {
            *CWD.lock() = path.to_string();
            Ok(())
        }
        Some(Node::File(_)) => Err(VfsError::NotADirectory),
        None => Err(VfsError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        init();
        let fd = open("/a.txt", OpenFlags(OpenFlags::O_CREAT | OpenFlags::O_RDWR)).unwrap();
        write(fd, b"hello").unwrap();
        lseek(fd, 0, 0).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn reopen_shares_content() {
        init();
        let a = open_vm_file("/b.txt", OpenFlags(OpenFlags::O_CREAT | OpenFlags::O_RDWR)).unwrap();
        a.write_at(0, b"xyz").unwrap();
        let b = a.reopen();
        let mut buf = [0u8; 3];
        b.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"xyz");
    }
}
