//! Fatal trap and panic handling (§7).
//!
//! The kernel never attempts to recover from an unhandled exception or a
//! Rust panic: both funnel here, which disables interrupts, forces the
//! console lock (a panic mid-print must still get its banner out), prints
//! a register dump plus the most recent log lines, and halts forever.

use core::fmt::Write;

use crate::arch::x86_64::idt::TrapFrame;

/// Entry point for unhandled CPU exceptions (component C's default path).
/// Never returns: the CPU state that reached here is not trusted to
/// resume.
pub fn fatal_trap(name: &str, trap: &TrapFrame) -> ! {
    x86_64::instructions::interrupts::disable();
    force_console();

    crate::console_println!("\n*** KERNEL PANIC: unhandled exception ***");
    crate::console_println!("{name} (vector {})", trap.vector);
    crate::console_println!("  error_code = {:#018x}", trap.error_code);
    crate::console_println!("  rip        = {:#018x}", trap.instruction_pointer);
    crate::console_println!("  cs         = {:#x}", trap.code_segment);
    crate::console_println!("  rflags     = {:#018x}", trap.cpu_flags);
    crate::console_println!("  rsp        = {:#018x}", trap.stack_pointer);
    crate::console_println!("  ss         = {:#x}", trap.stack_segment);
    if trap.vector == 14 {
        crate::console_println!("  cr2 (fault addr) = {:#018x}", trap.faulting_address);
    }

    print_recent_logs();
    halt_forever();
}

/// Entry point for Rust-level panics (`panic!`, `unwrap()` on `None`,
/// assertion failures, etc.), wired from [`crate::rust_panic_handler`].
pub fn fatal_panic(info: &core::panic::PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    force_console();

    crate::console_println!("\n*** KERNEL PANIC: Rust panic ***");
    // `console_println!` goes through a fixed-size `heapless::String`
    // buffer; a long panic message is truncated rather than lost.
    let mut line: heapless::String<512> = heapless::String::new();
    let _ = write!(line, "{info}");
    crate::arch::x86_64::console::print(&line);
    crate::arch::x86_64::console::print("\n");

    print_recent_logs();
    halt_forever();
}

fn force_console() {
    // SAFETY: we are fatally panicking with interrupts already disabled;
    // no other context will touch the console again.
    unsafe { crate::arch::x86_64::console::force_unlock() };
}

fn print_recent_logs() {
    crate::console_println!("--- recent log lines ---");
    crate::klog::with_recent_lines(|line| {
        crate::arch::x86_64::console::print(line);
        crate::arch::x86_64::console::print("\n");
    });
}

fn halt_forever() -> ! {
    loop {
        x86_64::instructions::interrupts::disable();
        x86_64::instructions::hlt();
    }
}
