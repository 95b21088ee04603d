//! Interrupt and exception dispatch (component C, §4.C).
//!
//! Vectors 0..32 are the architecturally defined exceptions; vectors
//! 32..48 are the legacy IRQ range (PIC remapped, see [`super::pic`]);
//! everything above that is available to [`install_vector`]. A null entry
//! in [`HANDLERS`] means "default handler": panic for an exception,
//! log-and-continue for an IRQ or other vector.
//!
//! The `x86_64` crate's `abi_x86_interrupt` ABI already does what the
//! spec's hand-written per-vector stub does (saves GPRs, builds the trap
//! frame, `iretq`s on return), so each IDT entry here is a thin Rust
//! function rather than an assembly stub — this is the idiomatic Rust
//! equivalent of "a per-vector stub that jumps to a shared router".

use core::arch::asm;

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::VirtAddr;

use super::tss::{DOUBLE_FAULT_IST_INDEX, MACHINE_CHECK_IST_INDEX, NMI_IST_INDEX};

/// A frame handed to registered handlers: the CPU-pushed interrupt frame
/// plus, for exceptions, the error code and (for #PF) the faulting
/// address. Mirrors spec §4.C's `trap_frame`.
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub vector: u8,
    pub error_code: u64,
    pub instruction_pointer: u64,
    pub code_segment: u64,
    pub cpu_flags: u64,
    pub stack_pointer: u64,
    pub stack_segment: u64,
    /// CR2 at fault time; only meaningful when `vector == 14`.
    pub faulting_address: u64,
}

impl TrapFrame {
    fn from_stack_frame(vector: u8, error_code: u64, frame: &InterruptStackFrame) -> Self {
        Self {
            vector,
            error_code,
            instruction_pointer: frame.instruction_pointer.as_u64(),
            code_segment: frame.code_segment.0 as u64,
            cpu_flags: frame.cpu_flags,
            stack_pointer: frame.stack_pointer.as_u64(),
            stack_segment: frame.stack_segment.0 as u64,
            faulting_address: if vector == 14 { super::cpu::read_cr2() } else { 0 },
        }
    }
}

pub type HandlerFn = fn(&TrapFrame);

/// One slot per vector (§3 Interrupt handler table invariant: 256 fixed
/// slots, vectors 0..32 exceptions, 32..48 legacy IRQs, rest available).
struct HandlerTable {
    slots: [Option<HandlerFn>; 256],
}

static HANDLERS: Mutex<HandlerTable> = Mutex::new(HandlerTable { slots: [None; 256] });

/// Registers `handler` for `vector`. Overwrites any previous registration.
/// Installing a handler on vector 255 (spurious) is accepted but the
/// vector is never raised by hardware under normal operation.
pub fn install_vector(vector: u8, handler: HandlerFn) {
    HANDLERS.lock().slots[vector as usize] = Some(handler);
}

/// Removes any handler registered for `vector`, reverting to the default.
pub fn uninstall_vector(vector: u8) {
    HANDLERS.lock().slots[vector as usize] = None;
}

fn dispatch(vector: u8, error_code: u64, frame: &InterruptStackFrame) {
    let trap = TrapFrame::from_stack_frame(vector, error_code, frame);
    let handler = HANDLERS.lock().slots[vector as usize];

    if vector < 32 {
        match handler {
            Some(h) => h(&trap),
            None => fatal_exception(&trap),
        }
        return;
    }

    if (32..48).contains(&vector) {
        if let Some(h) = handler {
            h(&trap);
        }
        let irq = vector - 32;
        super::pic::end_of_interrupt(irq);
        return;
    }

    // Spurious/unregistered high vectors are tolerated (§4.C failure
    // semantics): call the handler if present, otherwise log once.
    match handler {
        Some(h) => h(&trap),
        None => log::trace!("unhandled interrupt on vector {vector}"),
    }
}

fn fatal_exception(trap: &TrapFrame) -> ! {
    crate::panic::fatal_trap(EXCEPTION_NAMES.get(trap.vector as usize).copied().unwrap_or("unknown exception"), trap);
}

const EXCEPTION_NAMES: [&str; 32] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved (15)",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved (22)",
    "Reserved (23)",
    "Reserved (24)",
    "Reserved (25)",
    "Reserved (26)",
    "Reserved (27)",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved (31)",
];

/// Classification of a page-fault's error code (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFaultCause {
    pub present: bool,
    pub write: bool,
    pub user: bool,
    pub reserved_write: bool,
    pub instruction_fetch: bool,
}

pub fn classify_page_fault(error_code: u64) -> PageFaultCause {
    let flags = PageFaultErrorCode::from_bits_truncate(error_code);
    PageFaultCause {
        present: flags.contains(PageFaultErrorCode::PROTECTION_VIOLATION),
        write: flags.contains(PageFaultErrorCode::CAUSED_BY_WRITE),
        user: flags.contains(PageFaultErrorCode::USER_MODE),
        reserved_write: flags.contains(PageFaultErrorCode::MALFORMED_TABLE),
        instruction_fetch: flags.contains(PageFaultErrorCode::INSTRUCTION_FETCH),
    }
}

// ---------------------------------------------------------------------
// Named exception entry points (CPU ABI requires a distinct fn per entry
// since error-code presence differs by vector).
// ---------------------------------------------------------------------

macro_rules! exception_no_code {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            dispatch($vector, 0, &frame);
        }
    };
}

macro_rules! exception_with_code {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, error_code: u64) {
            dispatch($vector, error_code, &frame);
        }
    };
}

exception_no_code!(divide_error, 0);
exception_no_code!(debug, 1);
extern "x86-interrupt" fn nmi(frame: InterruptStackFrame) {
    dispatch(2, 0, &frame);
}
exception_no_code!(breakpoint, 3);
exception_no_code!(overflow, 4);
exception_no_code!(bound_range_exceeded, 5);
exception_no_code!(invalid_opcode, 6);
exception_no_code!(device_not_available, 7);

extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, _error_code: u64) -> ! {
    let trap = TrapFrame::from_stack_frame(8, _error_code, &frame);
    crate::panic::fatal_trap("Double Fault", &trap);
}

exception_with_code!(invalid_tss, 10);
exception_with_code!(segment_not_present, 11);
exception_with_code!(stack_segment_fault, 12);
exception_with_code!(general_protection_fault, 13);

extern "x86-interrupt" fn page_fault(frame: InterruptStackFrame, error_code: PageFaultErrorCode) {
    dispatch(14, error_code.bits(), &frame);
}

exception_no_code!(x87_floating_point, 16);
exception_with_code!(alignment_check, 17);

extern "x86-interrupt" fn machine_check(frame: InterruptStackFrame) -> ! {
    let trap = TrapFrame::from_stack_frame(18, 0, &frame);
    crate::panic::fatal_trap("Machine Check", &trap);
}

exception_no_code!(simd_floating_point, 19);
exception_no_code!(virtualization, 20);

// ---------------------------------------------------------------------
// Generic handlers for vectors 32..256 (legacy IRQs + everything else).
// Each vector needs its own monomorphic fn for the CPU to jump to;
// `seq_macro` generates the 224 near-identical functions at compile time,
// each funnelling into the shared `dispatch` router.
// ---------------------------------------------------------------------

seq_macro::seq!(N in 32..=255 {
    extern "x86-interrupt" fn vector_#N(frame: InterruptStackFrame) {
        dispatch(N as u8, 0, &frame);
    }
});

// ---------------------------------------------------------------------
// Syscall gate (vector 0x80, §4.L). Arguments travel in rax/rdi/rsi/rdx,
// which `InterruptStackFrame` never exposes, so this vector gets a
// hand-written naked entry instead of an `x86-interrupt` stub — the same
// reasoning as `context::switch_to`.
// ---------------------------------------------------------------------

#[repr(C)]
struct RawSyscallArgs {
    rdx: u64,
    rsi: u64,
    rdi: u64,
    rax: u64,
}

extern "C" fn syscall_inner(args: *mut RawSyscallArgs) {
    // SAFETY: `args` points at the four registers `syscall_entry` just
    // pushed onto the interrupt stack; it is valid for the duration of
    // this call and for no longer.
    let raw = unsafe { &mut *args };
    let mut regs =
        crate::syscall::SyscallRegs { number: raw.rax, arg0: raw.rdi, arg1: raw.rsi, arg2: raw.rdx };
    let current_pml4 = super::cpu::read_cr3();
    crate::syscall::dispatch(&mut regs, current_pml4);
    raw.rax = regs.arg0;
}

/// # Safety
/// Only ever reached through `int 0x80` via the IDT entry installed in
/// [`init`]; never call directly.
#[naked]
unsafe extern "C" fn syscall_entry() {
    asm!(
        "push rax",
        "push rdi",
        "push rsi",
        "push rdx",
        "mov rdi, rsp",
        "call {inner}",
        "pop rdx",
        "pop rsi",
        "pop rdi",
        "pop rax",
        "iretq",
        inner = sym syscall_inner,
        options(noreturn)
    )
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error);
        idt.debug.set_handler_fn(debug);
        idt.non_maskable_interrupt.set_handler_fn(nmi);
        idt.breakpoint.set_handler_fn(breakpoint);
        idt.overflow.set_handler_fn(overflow);
        idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded);
        idt.invalid_opcode.set_handler_fn(invalid_opcode);
        idt.device_not_available.set_handler_fn(device_not_available);
        // SAFETY: the double-fault/NMI/machine-check IST indices name
        // stacks set up in `tss::TSS` before this lazy_static runs.
        unsafe {
            idt.double_fault.set_handler_fn(double_fault).set_stack_index(DOUBLE_FAULT_IST_INDEX);
            idt.non_maskable_interrupt.set_handler_fn(nmi).set_stack_index(NMI_IST_INDEX);
            idt.machine_check.set_handler_fn(machine_check).set_stack_index(MACHINE_CHECK_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss);
        idt.segment_not_present.set_handler_fn(segment_not_present);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault);
        idt.general_protection_fault.set_handler_fn(general_protection_fault);
        idt.page_fault.set_handler_fn(page_fault);
        idt.x87_floating_point.set_handler_fn(x87_floating_point);
        idt.alignment_check.set_handler_fn(alignment_check);
        idt.simd_floating_point.set_handler_fn(simd_floating_point);
        idt.virtualization.set_handler_fn(virtualization);

        seq_macro::seq!(N in 32..=255 {
            idt[N].set_handler_fn(vector_#N);
        });

        // SAFETY: `syscall_entry` is a bespoke naked ISR (not an
        // `x86-interrupt` ABI function) that itself performs a correct
        // `iretq`; this is the one entry installed by raw address
        // instead of `set_handler_fn`.
        unsafe {
            idt[0x80].set_handler_addr(VirtAddr::new(syscall_entry as usize as u64));
        }

        idt
    };
}

/// Loads the IDT. Must run after [`super::gdt::init`].
pub fn init() {
    IDT.load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_fault_classification_decodes_present_and_write_bits() {
        // error code: present(1) | write(2) = not-present read fault absent
        let cause = classify_page_fault(0b011);
        assert!(cause.present);
        assert!(cause.write);
        assert!(!cause.user);

        let cause = classify_page_fault(0b000);
        assert!(!cause.present);
        assert!(!cause.write);
    }

    #[test]
    fn exception_names_cover_all_32_vectors() {
        assert_eq!(EXCEPTION_NAMES.len(), 32);
        assert_eq!(EXCEPTION_NAMES[14], "Page Fault");
        assert_eq!(EXCEPTION_NAMES[8], "Double Fault");
    }
}
