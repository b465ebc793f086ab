//! Ring 3 entry/exit glue.
//!
//! Builds the IRETQ frame that drops a kernel thread into user mode and
//! tracks the per-thread kernel stack SYSCALL uses to come back.

use core::sync::atomic::{AtomicU64, Ordering};

/// Kernel stack top for the thread currently running in Ring 3.
/// Updated on every context switch so SYSCALL always lands on the right stack.
pub static KERNEL_SYSCALL_STACK_TOP: AtomicU64 = AtomicU64::new(0);

pub fn current_syscall_stack() -> u64 {
    KERNEL_SYSCALL_STACK_TOP.load(Ordering::Relaxed)
}

pub fn set_syscall_stack(top: u64) {
    KERNEL_SYSCALL_STACK_TOP.store(top, Ordering::SeqCst);
}

/// Drop to Ring 3 at `entry` with stack `user_stack`, passing `arg` in the
/// user entry point's first argument register. Never returns — the thread
/// ends via the `exit` syscall, not by returning up this call stack.
///
/// Called by `thread::user_thread_entry` with entry in rdi, stack in rsi,
/// arg in rdx.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
pub extern "C" fn jump_to_ring3_with_args() {
    core::arch::naked_asm!(
        "mov r12, rdi",   // entry
        "mov r13, rsi",   // user stack
        "mov r14, rdx",   // arg

        // Build the IRETQ frame: SS, RSP, RFLAGS, CS, RIP
        "push {user_ss}",
        "push r13",
        "pushfq",
        "pop rax",
        "or rax, 0x200",  // IF
        "push rax",
        "push {user_cs}",
        "push r12",

        // User entry point convention: arg in rdi, rest cleared
        "mov rdi, r14",
        "xor esi, esi",
        "xor edx, edx",
        "xor ecx, ecx",
        "xor r8d, r8d",
        "xor r9d, r9d",

        "iretq",

        user_ss = const crate::gdt::USER_DATA_SELECTOR as u64,
        user_cs = const crate::gdt::USER_CODE_SELECTOR as u64,
    );
}

#[cfg(not(target_arch = "x86_64"))]
pub extern "C" fn jump_to_ring3_with_args() {}
