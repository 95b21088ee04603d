//! Thin port-I/O wrapper (component B). The `x86_64` crate's [`Port`] type
//! already encodes the `in`/`out` instruction widths; this module just
//! re-exports the widths the rest of the kernel needs under one name so
//! callers don't reach into `x86_64::instructions::port` directly.

pub use x86_64::instructions::port::{Port, PortReadOnly, PortWriteOnly};

/// Reads a single byte from `port`.
///
/// # Safety
/// Caller must ensure the I/O port is safe to read (no side effects the
/// caller isn't prepared for).
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    // SAFETY: forwarded to the caller's invariant.
    unsafe { Port::new(port).read() }
}

/// Writes a single byte to `port`.
///
/// # Safety
/// Caller must ensure the I/O port is safe to write.
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    // SAFETY: forwarded to the caller's invariant.
    unsafe { Port::new(port).write(value) }
}

/// A trivial busy-wait used after PIC/APIC programming steps that require a
/// short delay for the hardware to latch a value (classic `out $0,$0x80`
/// idiom on real hardware; on QEMU this is a no-op but keeps the sequencing
/// identical to bare metal).
#[inline]
pub fn io_wait() {
    // SAFETY: port 0x80 is the POST diagnostic port; writing to it is the
    // traditional unused-I/O-port delay and has no side effect we depend on.
    unsafe { outb(0x80, 0) }
}
