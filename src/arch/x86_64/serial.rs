//! 16550 UART debug serial (§6): COM1 at 0x3F8, 115200-8N1, FIFO enabled,
//! polled transmit. This is the kernel's earliest output path, usable
//! before the IDT or console are up, and the backend for [`crate::klog`].

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

pub const COM1_PORT: u16 = 0x3F8;

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        // SAFETY: 0x3F8 is the standard COM1 base; calling this once
        // during early boot, before any other code touches that port.
        let mut port = unsafe { SerialPort::new(COM1_PORT) };
        port.init();
        Mutex::new(port)
    };
}

/// Forces the lazy COM1 initialization. Call once during boot.
pub fn init() {
    lazy_static::initialize(&SERIAL1);
}

/// Returns a lock guard usable with `core::fmt::Write` (`write!`/`writeln!`).
pub fn console() -> spin::MutexGuard<'static, SerialPort> {
    SERIAL1.lock()
}

pub fn write_byte(byte: u8) {
    SERIAL1.lock().send(byte);
}

pub fn write_bytes(bytes: &[u8]) {
    let mut guard = SERIAL1.lock();
    for &b in bytes {
        guard.send(b);
    }
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::arch::x86_64::serial::console(), $($arg)*);
    }};
}

#[macro_export]
macro_rules! serial_println {
    () => { $crate::serial_print!("\n") };
    ($fmt:expr $(, $arg:tt)*) => { $crate::serial_print!(concat!($fmt, "\n") $(, $arg)*) };
}
