//! Request/response boot info variant (§6 variant 2): the kernel image
//! declares request records in a dedicated linker section ahead of
//! time; the loader walks that section and fills in each request's
//! response pointer before jumping to the kernel entry point.

use alloc::vec::Vec;

use super::{BootInfo, FramebufferInfo, MemoryRegion, MemoryRegionKind};

const REQUEST_MAGIC: [u64; 2] = [0xc7b1_dd30_df4c_8b88, 0x0a82_e883_a194_f07b];

#[repr(C)]
struct MemoryMapRequest {
    magic: [u64; 2],
    id: u64,
    revision: u64,
    response: *const MemoryMapResponse,
}

#[repr(C)]
struct MemoryMapResponse {
    entry_count: u64,
    entries: *const *const MemoryMapEntryRaw,
}

#[repr(C)]
struct MemoryMapEntryRaw {
    base: u64,
    length: u64,
    kind: u64,
}

const MM_KIND_USABLE: u64 = 0;
const MM_KIND_RESERVED: u64 = 1;
const MM_KIND_ACPI_RECLAIMABLE: u64 = 2;
const MM_KIND_ACPI_NVS: u64 = 3;
const MM_KIND_BAD_MEMORY: u64 = 4;

#[repr(C)]
struct FramebufferRequest {
    magic: [u64; 2],
    id: u64,
    revision: u64,
    response: *const FramebufferResponse,
}

#[repr(C)]
struct FramebufferResponse {
    framebuffer_count: u64,
    framebuffers: *const *const FramebufferRaw,
}

#[repr(C)]
struct FramebufferRaw {
    addr: u64,
    width: u64,
    height: u64,
    pitch: u64,
    bpp: u16,
}

#[repr(C)]
struct HhdmRequest {
    magic: [u64; 2],
    id: u64,
    revision: u64,
    response: *const HhdmResponse,
}

#[repr(C)]
struct HhdmResponse {
    offset: u64,
}

// Placeholder request records the kernel declares in a dedicated
// section (`.requests`, wired via the linker script) for the loader to
// discover and fill in. Left at zeroed/null responses until a real
// loader populates them; `collect` degrades gracefully when it finds
// nulls.
#[used]
#[link_section = ".requests"]
static MEMORY_MAP_REQUEST: MemoryMapRequest =
    MemoryMapRequest { magic: REQUEST_MAGIC, id: 1, revision: 0, response: core::ptr::null() };

#[used]
#[link_section = ".requests"]
static FRAMEBUFFER_REQUEST: FramebufferRequest =
    FramebufferRequest { magic: REQUEST_MAGIC, id: 2, revision: 0, response: core::ptr::null() };

#[used]
#[link_section = ".requests"]
static HHDM_REQUEST: HhdmRequest = HhdmRequest { magic: REQUEST_MAGIC, id: 3, revision: 0, response: core::ptr::null() };

fn classify(kind: u64) -> MemoryRegionKind {
    match kind {
        MM_KIND_USABLE => MemoryRegionKind::Available,
        MM_KIND_ACPI_RECLAIMABLE => MemoryRegionKind::AcpiReclaimable,
        MM_KIND_ACPI_NVS => MemoryRegionKind::AcpiNvs,
        MM_KIND_BAD_MEMORY => MemoryRegionKind::BadRam,
        MM_KIND_RESERVED => MemoryRegionKind::Reserved,
        _ => MemoryRegionKind::Reserved,
    }
}

/// Reads back whatever the loader populated into this kernel's request
/// section. Any request whose `response` is still null is simply
/// omitted from the resulting [`BootInfo`] (§6: "either variant must
/// deliver, at minimum, a memory map"; a request/response loader that
/// didn't honor the memory-map request is a boot-time configuration
/// error the caller surfaces by finding an empty `memory_map`).
///
/// # Safety
/// Every populated response pointer must have been written by a loader
/// that actually understands this request ABI, pointing at live,
/// correctly-sized data for the declared `entry_count`/`framebuffer_count`.
pub unsafe fn collect() -> BootInfo {
    let mut info = BootInfo::default();

    // SAFETY: forwarded to caller.
    unsafe {
        if let Some(response) = MEMORY_MAP_REQUEST.response.as_ref() {
            let mut regions = Vec::with_capacity(response.entry_count as usize);
            for i in 0..response.entry_count as usize {
                let entry_ptr = *response.entries.add(i);
                if let Some(entry) = entry_ptr.as_ref() {
                    regions.push(MemoryRegion { addr: entry.base, length: entry.length, kind: classify(entry.kind) });
                }
            }
            info.memory_map = regions;
        }

        if let Some(response) = FRAMEBUFFER_REQUEST.response.as_ref() {
            if response.framebuffer_count > 0 {
                if let Some(fb) = (*response.framebuffers).as_ref() {
                    info.framebuffer = Some(FramebufferInfo {
                        addr: fb.addr,
                        pitch: fb.pitch as u32,
                        width: fb.width as u32,
                        height: fb.height as u32,
                        bpp: fb.bpp as u8,
                    });
                }
            }
        }

        if let Some(response) = HHDM_REQUEST.response.as_ref() {
            info.hhdm_offset = Some(response.offset);
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_usable_to_available() {
        assert_eq!(classify(MM_KIND_USABLE), MemoryRegionKind::Available);
        assert_eq!(classify(MM_KIND_BAD_MEMORY), MemoryRegionKind::BadRam);
    }

    #[test]
    fn collect_degrades_gracefully_with_unpopulated_requests() {
        // SAFETY: the static requests above start with null responses
        // in any environment that hasn't run a real loader (including
        // this host test process); `collect` must not dereference them.
        let info = unsafe { collect() };
        assert!(info.memory_map.is_empty());
        assert!(info.framebuffer.is_none());
        assert!(info.hhdm_offset.is_none());
    }
}
