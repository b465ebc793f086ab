//! T-RustOs Kernel
//!
//! A small teaching kernel: virtual memory core (supplemental page table,
//! frame table, swap, file-backed mmap) around a Ring 0/3 process model.
//! Boots via Limine on UEFI systems.

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
extern crate alloc;

mod serial;
mod logger;
mod rtc;
mod disk;
mod time;
mod cpu;

mod vfs;
mod process;
mod exec;
mod init;
mod gdt;
mod userland;
mod thread;

mod memory;
mod interrupts;
mod scheduler;
mod syscall;
mod sync;
mod usercopy;

use core::panic::PanicInfo;
use core::alloc::Layout;
use limine::request::{
    MemoryMapRequest, HhdmRequest,
    RequestsStartMarker, RequestsEndMarker,
};
use limine::BaseRevision;

// ============================================================================
// Limine Protocol Requests
// ============================================================================

#[used]
#[unsafe(link_section = ".requests_start_marker")]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[unsafe(link_section = ".requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

/// Request memory map from Limine for memory management
#[used]
#[unsafe(link_section = ".requests")]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

/// Request higher half direct map offset for physical memory access
#[used]
#[unsafe(link_section = ".requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".requests_end_marker")]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

// ============================================================================
// Kernel Entry Point
// ============================================================================

// Force the linker to include kmain by creating a static reference to it
#[used]
#[link_section = ".text"]
static KMAIN_REFERENCE: unsafe extern "C" fn() -> ! = kmain;

/// Kernel entry point - called by Limine bootloader
///
/// Initializes subsystems in the order the VM core depends on:
/// serial -> heap -> GDT/interrupts -> paging -> the rest.
#[no_mangle]
#[link_section = ".text.kmain"]
pub unsafe extern "C" fn kmain() -> ! {
    if !BASE_REVISION.is_supported() {
        halt_loop();
    }

    // Phase 1: serial port for early debug output
    serial::init();
    serial_println!("T-RustOs Kernel v0.1.0");
    serial_println!("Limine protocol supported");

    // Phase 2: heap (must come before any allocation)
    serial_println!("Initializing memory management...");

    let mut heap_initialized = false;

    if let Some(mmap_response) = MEMORY_MAP_REQUEST.get_response() {
        let hhdm_offset = HHDM_REQUEST.get_response()
            .map(|r| r.offset())
            .unwrap_or(0);

        serial_println!("HHDM offset: {:#x}", hhdm_offset);
        serial_println!("Memory map entries: {}", mmap_response.entries().len());

        let mut usable_for_heap: Option<u64> = None;
        let mut kernel_end: u64 = 0;
        let mut total_phys_memory: u64 = 0;

        for entry in mmap_response.entries() {
            let kind = match entry.entry_type {
                limine::memory_map::EntryType::USABLE => "USABLE",
                limine::memory_map::EntryType::RESERVED => "RESERVED",
                limine::memory_map::EntryType::ACPI_RECLAIMABLE => "ACPI_RECLAIM",
                limine::memory_map::EntryType::ACPI_NVS => "ACPI_NVS",
                limine::memory_map::EntryType::BAD_MEMORY => "BAD",
                limine::memory_map::EntryType::BOOTLOADER_RECLAIMABLE => "BOOTLOADER",
                limine::memory_map::EntryType::EXECUTABLE_AND_MODULES => "KERNEL",
                limine::memory_map::EntryType::FRAMEBUFFER => "FRAMEBUFFER",
                _ => "UNKNOWN",
            };
            serial_println!("  {:#012x} - {:#012x} ({:12} bytes) {}",
                entry.base,
                entry.base + entry.length,
                entry.length,
                kind
            );

            if entry.entry_type == limine::memory_map::EntryType::EXECUTABLE_AND_MODULES
                || entry.entry_type == limine::memory_map::EntryType::BOOTLOADER_RECLAIMABLE
            {
                let end = entry.base + entry.length;
                if end > kernel_end {
                    kernel_end = end;
                }
            }
            total_phys_memory += entry.length;
        }

        memory::set_total_physical_memory(total_phys_memory);
        serial_println!("[MEM] Total physical memory: {} MB", total_phys_memory / 1024 / 1024);

        let dynamic_heap_size = memory::compute_heap_size(total_phys_memory);
        serial_println!("[HEAP] Dynamic size: {} MB (25% of {} MB RAM)",
            dynamic_heap_size / 1024 / 1024, total_phys_memory / 1024 / 1024);

        let align_up = |addr: u64, align: u64| -> u64 {
            if addr % align == 0 { addr } else { addr + (align - (addr % align)) }
        };

        let min_heap_base = align_up(core::cmp::max(0x100000, kernel_end), 0x1000);
        for entry in mmap_response.entries() {
            if entry.entry_type != limine::memory_map::EntryType::USABLE {
                continue;
            }
            let region_start = entry.base;
            let region_end = entry.base.saturating_add(entry.length);
            if region_end <= min_heap_base {
                continue;
            }
            let heap_start = core::cmp::max(region_start, min_heap_base);
            if region_end >= heap_start + dynamic_heap_size as u64 {
                usable_for_heap = Some(heap_start);
                break;
            }
        }

        if usable_for_heap.is_none() {
            let mut best_base: u64 = 0;
            let mut best_len: u64 = 0;
            for entry in mmap_response.entries() {
                if entry.entry_type != limine::memory_map::EntryType::USABLE {
                    continue;
                }
                if entry.length > best_len {
                    best_len = entry.length;
                    best_base = entry.base;
                }
            }

            if best_len >= dynamic_heap_size as u64 {
                let mut heap_start = align_up(best_base, 0x1000);
                if heap_start < 0x100000 {
                    heap_start = align_up(0x100000, 0x1000);
                }
                if best_base.saturating_add(best_len) >= heap_start + dynamic_heap_size as u64 {
                    usable_for_heap = Some(heap_start);
                }
            }
        }

        if let Some(heap_phys) = usable_for_heap {
            serial_println!("[HEAP] Using mmap region at phys {:#x}, size {} MB", heap_phys, dynamic_heap_size / 1024 / 1024);
            memory::init_with_hhdm_dynamic(hhdm_offset, heap_phys, dynamic_heap_size);
            heap_initialized = true;
            serial_println!("[HEAP] Initialized: free={} KB", memory::heap::free() / 1024);
        } else {
            serial_println!("[HEAP] ERROR: No usable region found for {} MB heap!", dynamic_heap_size / 1024 / 1024);
        }
    }

    if !heap_initialized {
        serial_println!("[HEAP] Using fallback init");
        memory::init();
    }

    // Phase 3: GDT with Ring 0/3 support
    serial_println!("Initializing GDT with Ring 0/3 support...");
    gdt::init();

    // Phase 4: interrupts (IDT, PIC) - needed before enabling paging faults
    serial_println!("Initializing interrupts...");
    interrupts::init();

    // Phase 5: CPU capability detection (TSC, SSE, etc)
    serial_println!("Detecting CPU capabilities...");
    cpu::init();

    // Phase 6: paging subsystem
    serial_println!("Initializing paging subsystem...");
    memory::paging::init();
    memory::vm_init();

    // Phase 7: userland support (SYSCALL/SYSRET)
    serial_println!("Initializing userland support...");
    userland::init_syscall_stack();
    userland::init();

    // Phase 8: thread subsystem
    serial_println!("Initializing thread subsystem...");
    thread::init();

    // Phase 9: scheduler
    serial_println!("Initializing scheduler...");
    scheduler::init();

    // Phase 10: RTC
    serial_println!("[RTC] init start");
    if rtc::try_init() {
        serial_println!("[RTC] initialized");
    } else {
        serial_println!("[RTC] skipped");
    }

    time::init();

    // Phase 11: legacy RAM disk (backing store independent of swap)
    serial_println!("[PHASE] Disk init start");
    disk::init();
    serial_println!("[PHASE] Disk init done");

    // Phase 12: syscall interface
    syscall::init();

    // Phase 13: virtual filesystem
    serial_println!("[PHASE] VFS init start");
    vfs::init();
    serial_println!("[PHASE] VFS init done");

    // Phase 14: process manager
    serial_println!("[PHASE] Process manager init start");
    process::init();
    serial_println!("[PHASE] Process manager init done");

    // Phase 15: init process (PID 1)
    serial_println!("[PHASE] Init process start");
    init::start();
    serial_println!("[PHASE] Init process done");

    serial_println!("");
    serial_println!("========================================");
    serial_println!("  System ready - T-RustOs v0.1.0");
    serial_println!("========================================");
    serial_println!("");

    halt_loop();
}

// ============================================================================
// Core Functions
// ============================================================================

/// Halt the CPU in an infinite loop.
fn halt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    serial_println!("\n!!! ALLOC ERROR !!!");
    serial_println!("layout: size={}, align={}", layout.size(), layout.align());
    halt_loop();
}

/// Panic handler - called on unrecoverable errors
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("\n!!! KERNEL PANIC !!!");
    serial_println!("{}", info);
    halt_loop();
}
