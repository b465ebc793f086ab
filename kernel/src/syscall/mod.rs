//! System Call Interface
//!
//! Dispatches the Linux x86_64 syscall ABI entries the VM core and its
//! surrounding process/file machinery actually implement. Anything else
//! returns `ENOSYS` rather than pretending to be Linux-compatible.

use crate::usercopy;

/// Syscall numbers (Linux x86_64 numbering, subset)
pub mod nr {
    pub const READ: u64 = 0;
    pub const WRITE: u64 = 1;
    pub const OPEN: u64 = 2;
    pub const CLOSE: u64 = 3;
    pub const LSEEK: u64 = 8;
    pub const MMAP: u64 = 9;
    pub const MUNMAP: u64 = 11;
    pub const BRK: u64 = 12;
    pub const GETPID: u64 = 39;
    pub const FORK: u64 = 57;
    pub const EXIT: u64 = 60;
    pub const WAIT4: u64 = 61;
    pub const GETCWD: u64 = 79;
    pub const CHDIR: u64 = 80;
    pub const MKDIR: u64 = 83;
    pub const UNLINK: u64 = 87;
    pub const GETPPID: u64 = 110;
    pub const EXIT_GROUP: u64 = 231;
}

/// Error codes (Linux-compatible, negative values)
pub mod errno {
    pub const ENOENT: i64 = -2;
    pub const EIO: i64 = -5;
    pub const EBADF: i64 = -9;
    pub const ECHILD: i64 = -10;
    pub const ENOMEM: i64 = -12;
    pub const EFAULT: i64 = -14;
    pub const EEXIST: i64 = -17;
    pub const EINVAL: i64 = -22;
    pub const ENOSYS: i64 = -38;
}

pub fn init() {
    crate::log!("[SYSCALL] syscall interface initialized");
}

/// Handle a syscall (called from the SYSCALL entry stub)
///
/// Linux x86_64 syscall ABI: rax = number, rdi/rsi/rdx/r10/r8/r9 = args 1-6.
pub fn handle(num: u64, a1: u64, a2: u64, a3: u64) -> u64 {
    handle_full(num, a1, a2, a3, 0, 0, 0) as u64
}

pub fn handle_full(num: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, a6: u64) -> i64 {
    use nr::*;

    match num {
        READ => sys_read(a1 as i32, a2, a3 as usize),
        WRITE => sys_write(a1 as i32, a2, a3 as usize),
        OPEN => sys_open(a1, a2 as u32),
        CLOSE => sys_close(a1 as i32),
        LSEEK => sys_lseek(a1 as i32, a2 as i64, a3 as u32),
        MMAP => sys_mmap(a1, a2 as usize, a3 as u32, a4 as i32, a5 as u64, a6),
        MUNMAP => sys_munmap(a1, a2 as usize),
        BRK => sys_brk(a1),
        GETPID => crate::process::current_pid() as i64,
        GETPPID => crate::process::with_process(crate::process::current_pid(), |p| p.ppid as i64).unwrap_or(0),
        FORK => sys_fork(),
        EXIT | EXIT_GROUP => { crate::process::exit(a1 as i32); 0 }
        WAIT4 => sys_wait4(a1 as i32, a2),
        GETCWD => sys_getcwd(a1, a2 as usize),
        CHDIR => sys_chdir(a1),
        MKDIR => sys_mkdir(a1),
        UNLINK => sys_unlink(a1),
        _ => {
            crate::log_debug!("[SYSCALL] unimplemented: {} (0x{:x})", num, num);
            errno::ENOSYS
        }
    }
}

fn sys_read(fd: i32, buf_ptr: u64, count: usize) -> i64 {
    if count == 0 {
        return errno::EINVAL;
    }
    let slice = match usercopy::UserSlice::rw(buf_ptr, count) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    let mut buf = alloc::vec![0u8; count];
    match crate::vfs::read(fd, &mut buf) {
        Ok(n) => match slice.write_from(&buf[..n]) {
            Ok(_) => n as i64,
            Err(e) => e.to_errno(),
        },
        Err(_) => errno::EIO,
    }
}

fn sys_write(fd: i32, buf_ptr: u64, count: usize) -> i64 {
    if count == 0 {
        return errno::EINVAL;
    }
    let slice = match usercopy::UserSlice::ro(buf_ptr, count) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    let mut buf = alloc::vec![0u8; count];
    if let Err(e) = slice.read_to(&mut buf) {
        return e.to_errno();
    }

    if fd == 1 || fd == 2 {
        for &b in &buf {
            crate::serial_print!("{}", b as char);
        }
        return count as i64;
    }

    match crate::vfs::write(fd, &buf) {
        Ok(n) => n as i64,
        Err(_) => errno::EIO,
    }
}

fn sys_open(path_ptr: u64, flags: u32) -> i64 {
    let path = match usercopy::copy_string_from_user(path_ptr, 256) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    match crate::vfs::open(&path, crate::vfs::OpenFlags(flags)) {
        Ok(fd) => fd as i64,
        Err(crate::vfs::VfsError::IsADirectory) => errno::EINVAL,
        Err(_) => errno::ENOENT,
    }
}

fn sys_close(fd: i32) -> i64 {
    match crate::vfs::close(fd) {
        Ok(()) => 0,
        Err(_) => errno::EBADF,
    }
}

fn sys_lseek(fd: i32, offset: i64, whence: u32) -> i64 {
    match crate::vfs::lseek(fd, offset, whence) {
        Ok(pos) => pos as i64,
        Err(_) => errno::EINVAL,
    }
}

fn sys_mkdir(path_ptr: u64) -> i64 {
    let path = match usercopy::copy_string_from_user(path_ptr, 256) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    match crate::vfs::mkdir(&path) {
        Ok(()) => 0,
        Err(_) => errno::EIO,
    }
}

fn sys_unlink(path_ptr: u64) -> i64 {
    let path = match usercopy::copy_string_from_user(path_ptr, 256) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    match crate::vfs::unlink(&path) {
        Ok(()) => 0,
        Err(_) => errno::ENOENT,
    }
}

fn sys_getcwd(buf: u64, size: usize) -> i64 {
    if size == 0 {
        return errno::EFAULT;
    }
    let slice = match usercopy::UserSlice::wo(buf, size) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    let cwd = crate::vfs::getcwd();
    let bytes = cwd.as_bytes();
    let len = bytes.len().min(size - 1);
    let mut out = alloc::vec![0u8; len + 1];
    out[..len].copy_from_slice(&bytes[..len]);
    match slice.write_from(&out) {
        Ok(_) => buf as i64,
        Err(e) => e.to_errno(),
    }
}

fn sys_chdir(path_ptr: u64) -> i64 {
    let path = match usercopy::copy_string_from_user(path_ptr, 256) {
        Ok(s) => s,
        Err(e) => return e.to_errno(),
    };
    match crate::vfs::chdir(&path) {
        Ok(()) => 0,
        Err(_) => errno::ENOENT,
    }
}

fn sys_fork() -> i64 {
    match crate::process::fork() {
        Ok(pid) => pid as i64,
        Err(_) => errno::ENOMEM,
    }
}

fn sys_wait4(pid: i32, wstatus: u64) -> i64 {
    let target_pid = if pid > 0 { pid as u32 } else { 0 };
    match crate::process::wait(target_pid) {
        Ok(status) => {
            if let Ok(slice) = usercopy::UserSlice::wo(wstatus, 4) {
                unsafe { let _ = slice.write_exact(&((status & 0xFF) << 8)); }
            }
            target_pid as i64
        }
        Err(_) => errno::ECHILD,
    }
}

/// `mmap(addr, length, prot, flags, fd, offset)` — only the VM core's
/// file/anonymous mapping path is implemented; `addr` is required (no
/// kernel-chosen placement) and `flags` only distinguishes MAP_ANONYMOUS.
fn sys_mmap(addr: u64, length: usize, prot: u32, flags: i32, fd: u64, offset: u64) -> i64 {
    const MAP_ANONYMOUS: i32 = 0x20;
    const PROT_WRITE: u32 = 0x2;

    let writable = prot & PROT_WRITE != 0;
    let pid = crate::process::current_pid();

    let file = if flags & MAP_ANONYMOUS != 0 {
        None
    } else {
        let vfs_fd = match crate::process::with_process(pid, |p| p.get_vfs_fd(fd as i32)).flatten() {
            Some(vfs_fd) => vfs_fd,
            None => return errno::EBADF,
        };
        match crate::vfs::vm_file_for_fd(vfs_fd) {
            Ok(file) => Some(file),
            Err(_) => return errno::EBADF,
        }
    };

    match crate::memory::mmap::do_mmap(pid, addr, length, writable, file, offset) {
        Some(mapped) => mapped as i64,
        None => 0, // mmap returns null (here: 0) on precondition failure
    }
}

fn sys_munmap(addr: u64, _length: usize) -> i64 {
    let pid = crate::process::current_pid();
    match crate::memory::mmap::do_munmap(pid, addr) {
        Ok(()) => 0,
        Err(_) => errno::EINVAL,
    }
}

fn sys_brk(addr: u64) -> i64 {
    if addr == 0 {
        return crate::exec::current_brk() as i64;
    }
    crate::exec::set_current_brk(addr);
    addr as i64
}

