//! Tagged-list boot info variant (§6 variant 1): a header followed by
//! 8-byte-aligned `{type, size, payload}` tags, terminated by a type-0
//! tag.

use alloc::string::String;
use alloc::vec::Vec;

use super::{BootInfo, FramebufferInfo, MemoryRegion, MemoryRegionKind};

const TAG_END: u32 = 0;
const TAG_CMDLINE: u32 = 1;
const TAG_BASIC_MEMINFO: u32 = 4;
const TAG_MEMORY_MAP: u32 = 6;
const TAG_MODULE: u32 = 3;
const TAG_RSDP_OLD: u32 = 14;
const TAG_RSDP_NEW: u32 = 15;
const TAG_FRAMEBUFFER: u32 = 8;

const MEMORY_AVAILABLE: u32 = 1;
const MEMORY_ACPI_RECLAIMABLE: u32 = 3;
const MEMORY_ACPI_NVS: u32 = 4;
const MEMORY_BAD_RAM: u32 = 5;

#[repr(C)]
struct ListHeader {
    total_size: u32,
    reserved: u32,
}

#[repr(C)]
struct TagHeader {
    kind: u32,
    size: u32,
}

#[repr(C)]
struct MemoryMapTagHeader {
    entry_size: u32,
    entry_version: u32,
}

#[repr(C)]
struct MemoryMapEntryRaw {
    addr: u64,
    length: u64,
    kind: u32,
    reserved: u32,
}

fn classify(kind: u32) -> MemoryRegionKind {
    match kind {
        MEMORY_AVAILABLE => MemoryRegionKind::Available,
        MEMORY_ACPI_RECLAIMABLE => MemoryRegionKind::AcpiReclaimable,
        MEMORY_ACPI_NVS => MemoryRegionKind::AcpiNvs,
        MEMORY_BAD_RAM => MemoryRegionKind::BadRam,
        _ => MemoryRegionKind::Reserved,
    }
}

/// Attempts to parse `ptr` as a tagged-list structure. A loader using
/// the other variant never produces a plausible `total_size`/tag
/// sequence here, so a structurally-invalid read (size 0, or no type-0
/// terminator before `total_size`) is treated as "not this format"
/// rather than a hard error.
///
/// # Safety
/// Same contract as [`super::parse`].
pub unsafe fn try_parse(ptr: *const u8) -> Option<BootInfo> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: forwarded to caller.
    let header = unsafe { &*(ptr as *const ListHeader) };
    if header.total_size < core::mem::size_of::<ListHeader>() as u32 {
        return None;
    }

    let mut info = BootInfo::default();
    // SAFETY: the tag stream begins immediately after the 8-byte header
    // per the tagged-list layout; each tag's `size` field bounds the
    // next tag's start, validated against `total_size` every iteration.
    unsafe {
        let mut cursor = ptr.add(core::mem::size_of::<ListHeader>());
        let end = ptr.add(header.total_size as usize);

        while cursor < end {
            let tag = &*(cursor as *const TagHeader);
            if tag.kind == TAG_END {
                break;
            }
            let payload = cursor.add(core::mem::size_of::<TagHeader>());

            match tag.kind {
                TAG_CMDLINE => {
                    let len = (tag.size as usize).saturating_sub(core::mem::size_of::<TagHeader>());
                    info.command_line = read_c_string(payload, len);
                }
                TAG_MEMORY_MAP => parse_memory_map(payload, tag.size, &mut info.memory_map),
                TAG_FRAMEBUFFER => info.framebuffer = parse_framebuffer(payload),
                TAG_RSDP_OLD | TAG_RSDP_NEW => info.rsdp_addr = Some(payload as u64),
                TAG_BASIC_MEMINFO | TAG_MODULE => {}
                _ => {}
            }

            // Tags are 8-byte aligned; advance past this tag's size,
            // rounded up.
            let advance = (tag.size as usize + 7) & !7;
            cursor = cursor.add(advance.max(core::mem::size_of::<TagHeader>()));
        }
    }

    Some(info)
}

unsafe fn parse_memory_map(payload: *const u8, tag_size: u32, out: &mut Vec<MemoryRegion>) {
    // SAFETY: forwarded to caller; `payload` points at a memory-map tag
    // body validated by the caller's bounds check.
    unsafe {
        let header = &*(payload as *const MemoryMapTagHeader);
        let entries_start = payload.add(core::mem::size_of::<MemoryMapTagHeader>());
        let body_len = tag_size as usize - core::mem::size_of::<TagHeader>() - core::mem::size_of::<MemoryMapTagHeader>();
        let entry_size = header.entry_size.max(core::mem::size_of::<MemoryMapEntryRaw>() as u32) as usize;
        let count = body_len / entry_size;

        for i in 0..count {
            let entry = &*(entries_start.add(i * entry_size) as *const MemoryMapEntryRaw);
            out.push(MemoryRegion { addr: entry.addr, length: entry.length, kind: classify(entry.kind) });
        }
    }
}

unsafe fn parse_framebuffer(payload: *const u8) -> Option<FramebufferInfo> {
    #[repr(C, packed)]
    struct Raw {
        addr: u64,
        pitch: u32,
        width: u32,
        height: u32,
        bpp: u8,
        fb_type: u8,
    }
    // SAFETY: forwarded to caller.
    let raw = unsafe { core::ptr::read_unaligned(payload as *const Raw) };
    Some(FramebufferInfo { addr: raw.addr, pitch: raw.pitch, width: raw.width, height: raw.height, bpp: raw.bpp })
}

unsafe fn read_c_string(ptr: *const u8, max_len: usize) -> Option<String> {
    // SAFETY: forwarded to caller; scanning at most `max_len` bytes for
    // a NUL terminator within the tag's own declared payload length.
    let slice = unsafe { core::slice::from_raw_parts(ptr, max_len) };
    let len = slice.iter().position(|&b| b == 0).unwrap_or(max_len);
    core::str::from_utf8(&slice[..len]).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_available_and_reserved_correctly() {
        assert_eq!(classify(MEMORY_AVAILABLE), MemoryRegionKind::Available);
        assert_eq!(classify(99), MemoryRegionKind::Reserved);
    }

    #[test]
    fn null_pointer_is_rejected() {
        // SAFETY: a null pointer is a documented "not this format" case.
        let result = unsafe { try_parse(core::ptr::null()) };
        assert!(result.is_none());
    }

    #[test]
    fn parses_a_minimal_tagged_list_with_one_memory_region() {
        #[repr(C)]
        struct Fixture {
            header: ListHeader,
            mmap_tag: TagHeader,
            mmap_header: MemoryMapTagHeader,
            entry: MemoryMapEntryRaw,
            end_tag: TagHeader,
        }

        let mmap_tag_size = (core::mem::size_of::<TagHeader>()
            + core::mem::size_of::<MemoryMapTagHeader>()
            + core::mem::size_of::<MemoryMapEntryRaw>()) as u32;

        let fixture = Fixture {
            header: ListHeader { total_size: core::mem::size_of::<Fixture>() as u32, reserved: 0 },
            mmap_tag: TagHeader { kind: TAG_MEMORY_MAP, size: mmap_tag_size },
            mmap_header: MemoryMapTagHeader { entry_size: core::mem::size_of::<MemoryMapEntryRaw>() as u32, entry_version: 0 },
            entry: MemoryMapEntryRaw { addr: 0x10_0000, length: 0x10_0000, kind: MEMORY_AVAILABLE, reserved: 0 },
            end_tag: TagHeader { kind: TAG_END, size: 8 },
        };

        // SAFETY: `fixture` is a validly laid out tagged-list structure
        // matching exactly what `try_parse` expects.
        let info = unsafe { try_parse(&fixture as *const Fixture as *const u8) }.expect("valid fixture");
        assert_eq!(info.memory_map.len(), 1);
        assert_eq!(info.memory_map[0].addr, 0x10_0000);
        assert_eq!(info.memory_map[0].kind, MemoryRegionKind::Available);
    }
}
