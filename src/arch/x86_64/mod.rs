//! x86_64 platform support: CPU facilities (B), interrupt dispatch (C),
//! interrupt controller (D), and the external device interfaces fixed by
//! spec §6 (console, serial, keyboard, timer).

pub mod apic;
pub mod console;
pub mod context;
pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod keyboard;
pub mod pic;
pub mod pit;
pub mod port;
pub mod serial;
pub mod tss;

/// Brings up everything this module owns, in the order §2 fixes: GDT/TSS,
/// then IDT, then the interrupt controller (legacy PIC unconditionally,
/// APIC handoff if present and the `apic` feature is enabled), then the
/// timer. Interrupts remain disabled on return; the caller re-enables them
/// once the scheduler's idle task exists.
pub fn init() {
    serial::init();
    console::init();
    gdt::init();
    idt::init();
    install_irq_handlers();
    pic::init();
    #[cfg(feature = "apic")]
    apic::try_init();
    pit::init(crate::task::scheduler::TICK_HZ);
}

/// IRQ 0 (timer, vector 32): drives the scheduler's time-slice
/// accounting (§4.J `sched_tick`).
fn timer_irq(_trap: &idt::TrapFrame) {
    crate::task::scheduler::sched_tick();
}

/// IRQ 1 (keyboard, vector 33): drains one scancode per interrupt into
/// the keyboard ring buffer (§6).
fn keyboard_irq(_trap: &idt::TrapFrame) {
    keyboard::on_irq();
}

fn install_irq_handlers() {
    idt::install_vector(pic::MASTER_OFFSET, timer_irq);
    idt::install_vector(pic::MASTER_OFFSET + 1, keyboard_irq);
}
