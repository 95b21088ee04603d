//! Kernel entry point. Everything interesting lives in the library
//! crate (`monokernel`); this binary only provides the `_start` symbol
//! the linker script and bootloader protocol expect.
#![no_std]
#![no_main]

// A second panic handler here would conflict with the one `monokernel`
// defines in lib.rs; this binary deliberately does not define one.

#[no_mangle]
pub extern "C" fn _start(boot_info_ptr: *const u8) -> ! {
    // SAFETY: `_start` is the documented kernel entry point; the CPU
    // contract in §6 (long mode, paging, a usable stack, interrupts
    // disabled) is established by the loader/linker before this symbol
    // is ever reached.
    unsafe { monokernel::kernel_main(boot_info_ptr) }
}
