//! Current user process context.
//!
//! Tracks which `AddressSpace` is live in Ring 3 right now, along with its
//! program break and stack bottom, so syscall handlers and the page-fault
//! handler can look at "the running process" without threading a reference
//! through every call site.

use core::sync::atomic::{AtomicU64, AtomicPtr, Ordering};
use crate::memory::paging::AddressSpace;

// ── Current process context (for syscall / page-fault access) ──

/// Raw pointer to the currently-executing user AddressSpace.
/// Set before entering Ring 3, cleared on return.
static CURRENT_USER_SPACE: AtomicPtr<AddressSpace> = AtomicPtr::new(core::ptr::null_mut());

/// Current user program break (heap top virtual address)
static CURRENT_USER_BRK: AtomicU64 = AtomicU64::new(0);

/// Current user stack bottom (lowest mapped stack page)
static CURRENT_USER_STACK_BOTTOM: AtomicU64 = AtomicU64::new(0);

/// Access the current user AddressSpace from within a syscall or page fault handler.
/// Returns `None` if no user process is running.
///
/// # Safety
/// The caller must not hold this reference across an address-space switch.
pub fn with_current_address_space<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut AddressSpace) -> R,
{
    let ptr = CURRENT_USER_SPACE.load(Ordering::Acquire);
    if ptr.is_null() {
        return None;
    }
    // Safety: pointer is valid while a user process is executing, and we are in a
    // syscall / exception handler on the same (only) CPU.
    Some(f(unsafe { &mut *ptr }))
}

/// Get current user program break
pub fn current_brk() -> u64 {
    CURRENT_USER_BRK.load(Ordering::Relaxed)
}

/// Set current user program break
pub fn set_current_brk(brk: u64) {
    CURRENT_USER_BRK.store(brk, Ordering::SeqCst);
}

/// Get current user stack bottom (lowest valid stack address)
pub fn current_stack_bottom() -> u64 {
    CURRENT_USER_STACK_BOTTOM.load(Ordering::Relaxed)
}

/// Set the current user stack bottom. Called when a process is scheduled in
/// or its stack grows downward.
pub fn set_current_stack_bottom(addr: u64) {
    CURRENT_USER_STACK_BOTTOM.store(addr, Ordering::SeqCst);
}

/// Install `space` as the AddressSpace backing the process about to run in
/// Ring 3. Called by the scheduler on context switch into a user thread.
///
/// # Safety
/// `space` must stay valid (not freed or mutated from another CPU) until
/// [`clear_current_address_space`] is called.
pub unsafe fn set_current_address_space(space: *mut AddressSpace) {
    CURRENT_USER_SPACE.store(space, Ordering::Release);
}

/// Clear the current process context, e.g. when a process exits or the
/// scheduler switches back to a kernel-only thread.
pub fn clear_current_address_space() {
    CURRENT_USER_SPACE.store(core::ptr::null_mut(), Ordering::Release);
    CURRENT_USER_BRK.store(0, Ordering::SeqCst);
    CURRENT_USER_STACK_BOTTOM.store(0, Ordering::SeqCst);
}
