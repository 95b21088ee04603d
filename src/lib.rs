//! Core of a small x86_64 monolithic kernel: interrupt/exception
//! dispatch, physical and virtual memory management, a kernel heap, a
//! round-robin task scheduler, bounded-mailbox IPC, and a narrow
//! syscall surface.
//!
//! `#![no_std]` everywhere except under `cargo test`: the pure-logic
//! subsystems (bitmap math, heap coalescing, scheduler rotation,
//! mailbox ordering) have real unit tests that run under the host
//! toolchain and the standard test harness; only the architecture
//! bring-up path and the `_start` entry point require the bespoke
//! `x86_64-monokernel` target and are excluded from host test builds by
//! `cfg(target_arch = "x86_64")` at their call sites.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod boot;
pub mod error;
pub mod ipc;
pub mod klog;
pub mod mm;
pub mod panic;
pub mod syscall;
pub mod task;

/// Brings the kernel up in the order §2 fixes: CPU/interrupt/controller
/// bring-up, memory management, then the task model. Returns once the
/// idle task exists and the timer is running; the caller is expected to
/// enable interrupts and fall into the scheduler's idle loop.
///
/// # Safety
/// Must be called exactly once, early in `_start`, with the CPU/platform
/// contract from §6 already satisfied (long mode, paging, a usable
/// stack, interrupts disabled) and `boot_info_ptr` pointing at a real
/// loader-populated structure.
#[cfg(target_arch = "x86_64")]
pub unsafe fn kernel_main(boot_info_ptr: *const u8) -> ! {
    // SAFETY: forwarded to caller.
    let info = unsafe { boot::parse(boot_info_ptr) };

    arch::x86_64::init();
    log::set_max_level(log::LevelFilter::Info);
    klog::init(log::LevelFilter::Info);

    log::info!(
        "monokernel {} ({}) built at {}",
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("PROFILE").unwrap_or("unknown"),
        option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
    );
    log::info!("monokernel boot: {} memory regions", info.memory_map.len());

    let memory_map: alloc::vec::Vec<mm::pmm::MemoryMapEntry> = info
        .memory_map
        .iter()
        .map(|r| mm::pmm::MemoryMapEntry { addr: r.addr, length: r.length, kind: r.kind })
        .collect();

    // SAFETY: these symbols are provided by `linker.ld` and describe the
    // kernel's own loaded physical image.
    let (kernel_phys_start, kernel_phys_end) = unsafe { kernel_physical_bounds() };

    let max_frame = info
        .memory_map
        .iter()
        .map(|r| (r.addr + r.length) / mm::pmm::PAGE_SIZE as u64)
        .max()
        .unwrap_or(0) as usize;

    let hhdm_offset = info.hhdm_offset.unwrap_or(0xFFFF_8000_0000_0000);
    // SAFETY: CR3 currently holds the bootstrap PML4 the loader/early
    // boot code installed, which this call treats as the kernel
    // template address space.
    let kernel_pml4 = arch::x86_64::cpu::read_cr3();

    const HEAP_VIRT_BASE: u64 = 0xFFFF_FF00_0000_0000;
    if mm::init(&memory_map, max_frame, kernel_phys_start, kernel_phys_end, hhdm_offset, kernel_pml4, HEAP_VIRT_BASE).is_err() {
        panic!("out of memory bringing up the kernel heap");
    }

    task::scheduler::init();

    x86_64::instructions::interrupts::enable();

    loop {
        if !task::scheduler::reap_one() {
            x86_64::instructions::hlt();
        }
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn kernel_physical_bounds() -> (u64, u64) {
    extern "C" {
        static KERNEL_PHYS_START: u8;
        static KERNEL_PHYS_END: u8;
    }
    // SAFETY: these symbols are defined by `linker.ld` as zero-sized
    // markers; only their addresses are meaningful.
    unsafe { (&KERNEL_PHYS_START as *const u8 as u64, &KERNEL_PHYS_END as *const u8 as u64) }
}

#[cfg(not(test))]
#[panic_handler]
fn rust_panic_handler(info: &core::panic::PanicInfo) -> ! {
    panic::fatal_panic(info)
}
