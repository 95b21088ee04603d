//! Memory management: physical frames (E), virtual memory (F), and the
//! kernel heap (G). Brought up in that order from the boot path, each
//! layer built strictly on the one before it (§2 data flow).

pub mod heap;
pub mod pmm;
pub mod vmm;

use heap::KernelAllocator;

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

/// Default heap size: 4 MiB, within the spec's suggested 1-4 MiB range
/// (§4.G).
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Brings up PMM → VMM → heap, in that order. `memory_map` and the
/// kernel's physical image bounds come from the boot-info parser (A);
/// `hhdm_offset` and `kernel_pml4_phys` from the same source (or
/// computed during early boot before this runs).
///
/// Returns the heap's virtual base, which the caller may log.
pub fn init(
    memory_map: &[pmm::MemoryMapEntry],
    max_frame: usize,
    kernel_phys_start: u64,
    kernel_phys_end: u64,
    hhdm_offset: u64,
    kernel_pml4_phys: u64,
    heap_virt_base: u64,
) -> crate::error::KResult<()> {
    pmm::init(memory_map, max_frame, kernel_phys_start, kernel_phys_end);
    vmm::init(hhdm_offset, kernel_pml4_phys);

    let heap_flags = vmm::PageFlags::PRESENT | vmm::PageFlags::WRITABLE;
    for i in 0..(HEAP_SIZE / pmm::PAGE_SIZE) {
        let phys = pmm::alloc_frame_checked()?;
        let virt = heap_virt_base + (i * pmm::PAGE_SIZE) as u64;
        // SAFETY: `kernel_pml4_phys` is the live kernel address space;
        // `heap_virt_base` is reserved kernel virtual space by convention.
        unsafe { vmm::map_page(kernel_pml4_phys, virt, phys, heap_flags)? };
    }

    // SAFETY: the region just mapped above is exclusively owned, backed,
    // writable kernel memory of exactly `HEAP_SIZE` bytes.
    unsafe { heap::init(heap_virt_base as usize, HEAP_SIZE) };

    Ok(())
}
