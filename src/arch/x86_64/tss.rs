//! Task State Segment (TSS): supplies the kernel stack used on privilege
//! transitions (RSP0) and the dedicated Interrupt Stack Table entries for
//! faults that must never run on a possibly-corrupted kernel stack.

use lazy_static::lazy_static;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// Size of each IST/privilege stack. The spec requires task stacks of at
/// least 16 KiB (§4.J); these dedicated fault stacks use the same floor.
pub const IST_STACK_SIZE: usize = 16 * 1024;

/// IST index used for the double-fault handler.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;
/// IST index used for the NMI handler.
pub const NMI_IST_INDEX: u16 = 1;
/// IST index used for the machine-check handler.
pub const MACHINE_CHECK_IST_INDEX: u16 = 2;

static mut DOUBLE_FAULT_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];
static mut NMI_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];
static mut MACHINE_CHECK_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];

lazy_static! {
    pub static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();

        // SAFETY: these statics are only ever referenced here, each exactly
        // once, to seed the IST; no other code takes `&mut` to them.
        unsafe {
            let df_top = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as u64 + IST_STACK_SIZE as u64;
            tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = VirtAddr::new(df_top);

            let nmi_top = core::ptr::addr_of!(NMI_STACK) as u64 + IST_STACK_SIZE as u64;
            tss.interrupt_stack_table[NMI_IST_INDEX as usize] = VirtAddr::new(nmi_top);

            let mc_top = core::ptr::addr_of!(MACHINE_CHECK_STACK) as u64 + IST_STACK_SIZE as u64;
            tss.interrupt_stack_table[MACHINE_CHECK_IST_INDEX as usize] = VirtAddr::new(mc_top);
        }

        tss
    };
}
