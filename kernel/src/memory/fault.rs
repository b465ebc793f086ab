//! Page Fault Handler
//!
//! Classifies every page fault into one of three outcomes: a lazy load of a
//! page already known to the current process's supplemental page table, a
//! stack growth, or an unrecoverable access that kills the process. Called
//! directly from `interrupts::handlers::page_fault_handler`.

use crate::exec;
use crate::memory::paging::{UserMemoryRegion, PAGE_SIZE};
use crate::process::{self, Pid};

use super::{spt, VmError};

/// A fault within this many bytes below the current stack pointer is still
/// considered a stack access (PUSH can fault below %rsp before it updates it).
const STACK_FAULT_SLACK: u64 = 32;

/// Maximum the user stack is allowed to grow to.
const MAX_STACK_SIZE: u64 = 1024 * 1024;

fn page_floor(addr: u64) -> u64 {
    addr & !(PAGE_SIZE as u64 - 1)
}

/// `rsp` is the interrupt frame's stack pointer for a user-mode fault; for a
/// kernel-mode fault (e.g. a syscall handler touching a user buffer) the
/// interrupt frame's `rsp` is the kernel stack, so the current thread's
/// saved `user_rsp` is used instead to judge stack growth.
pub fn handle_page_fault(addr: u64, write: bool, user: bool, present: bool, rsp: u64) -> Result<(), VmError> {
    let pid = process::current_pid();
    let va = page_floor(addr);

    if present {
        // The page is mapped but the access still faulted: a permission
        // violation (e.g. a write to a read-only page). Nothing to claim.
        return Err(VmError::AccessViolation);
    }

    if let Some(page) = spt::find(pid, va) {
        if write && !page.writable {
            return Err(VmError::AccessViolation);
        }
        return spt::claim_page(pid, va);
    }

    let stack_rsp = if user { rsp } else { crate::thread::current_user_rsp() };
    if is_stack_growth(addr, stack_rsp) {
        return grow_stack(pid, va);
    }

    Err(VmError::NotFound)
}

fn is_stack_growth(addr: u64, rsp: u64) -> bool {
    if addr >= UserMemoryRegion::STACK_TOP {
        return false;
    }
    if addr < rsp.saturating_sub(STACK_FAULT_SLACK) {
        return false;
    }
    UserMemoryRegion::STACK_TOP - addr <= MAX_STACK_SIZE
}

fn grow_stack(pid: Pid, va: u64) -> Result<(), VmError> {
    let page = super::page::Page::new_uninit_anon(pid, va, true);
    spt::insert(pid, page);
    spt::claim_page(pid, va)?;

    if va < exec::current_stack_bottom() || exec::current_stack_bottom() == 0 {
        exec::set_current_stack_bottom(va);
    }

    crate::log_debug!("[VM] stack grown to {:#x}", va);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_floor_truncates_to_page_boundary() {
        assert_eq!(page_floor(0x1000), 0x1000);
        assert_eq!(page_floor(0x1fff), 0x1000);
        assert_eq!(page_floor(0x2000), 0x2000);
    }

    #[test]
    fn fault_just_below_rsp_is_stack_growth() {
        let rsp = UserMemoryRegion::STACK_TOP - 0x1000;
        let addr = rsp - 8;
        assert!(is_stack_growth(addr, rsp));
    }

    #[test]
    fn fault_far_below_rsp_is_not_stack_growth() {
        let rsp = UserMemoryRegion::STACK_TOP - 0x1000;
        let addr = rsp - STACK_FAULT_SLACK - 1;
        assert!(!is_stack_growth(addr, rsp));
    }

    #[test]
    fn fault_at_or_past_stack_top_is_not_stack_growth() {
        assert!(!is_stack_growth(UserMemoryRegion::STACK_TOP, UserMemoryRegion::STACK_TOP));
    }

    #[test]
    fn fault_beyond_max_stack_size_is_not_stack_growth() {
        let addr = UserMemoryRegion::STACK_TOP - MAX_STACK_SIZE - PAGE_SIZE as u64;
        assert!(!is_stack_growth(addr, addr));
    }
}
