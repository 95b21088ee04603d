//! Boot info parser (component A, §6 loader handoff).
//!
//! Accepts either of two loader conventions: a tagged-list (multiboot2-
//! style) structure, or a request/response (Limine-style) table the
//! kernel itself declares in a linker section. Both are normalized into
//! a single [`BootInfo`] the rest of the kernel consumes, so nothing
//! downstream of this module cares which variant was actually used.

pub mod multiboot;
pub mod requests;

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionKind {
    Available,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    BadRam,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub addr: u64,
    pub length: u64,
    pub kind: MemoryRegionKind,
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub addr: u64,
    pub pitch: u32,
    pub width: u32,
    pub height: u32,
    pub bpp: u8,
}

/// The loader information every boot path is normalized into,
/// regardless of which of the two variants (§6) actually delivered it.
#[derive(Debug, Default)]
pub struct BootInfo {
    pub memory_map: Vec<MemoryRegion>,
    pub framebuffer: Option<FramebufferInfo>,
    pub hhdm_offset: Option<u64>,
    pub rsdp_addr: Option<u64>,
    pub command_line: Option<alloc::string::String>,
    pub bootloader_name: Option<alloc::string::String>,
}

impl Default for MemoryRegionKind {
    fn default() -> Self {
        MemoryRegionKind::Reserved
    }
}

/// Parses `boot_info_ptr` by first trying the tagged-list format, then
/// the request/response table. Both are exposed as plain functions
/// (`multiboot::parse`, `requests::collect`) so either can also be
/// exercised directly in tests without a real loader-populated buffer.
///
/// # Safety
/// `boot_info_ptr` must point at a structure the active loader actually
/// populated, matching one of the two recognized layouts, and must
/// remain valid and immutable for the duration of this call.
pub unsafe fn parse(boot_info_ptr: *const u8) -> BootInfo {
    // SAFETY: forwarded to caller.
    if let Some(info) = unsafe { multiboot::try_parse(boot_info_ptr) } {
        return info;
    }
    // SAFETY: forwarded to caller; the request/response table lives in
    // a linker-provided section independent of `boot_info_ptr`'s layout.
    unsafe { requests::collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_info_defaults_to_empty() {
        let info = BootInfo::default();
        assert!(info.memory_map.is_empty());
        assert!(info.framebuffer.is_none());
    }
}
