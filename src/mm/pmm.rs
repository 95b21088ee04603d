//! Bitmap physical frame allocator (component E, §4.E).
//!
//! One bit per 4 KiB frame; a set bit means "unavailable" (reserved by
//! firmware, the kernel image, the bitmap's own storage, or currently
//! allocated). Capped at [`MAX_FRAMES`] frames (4 GiB of physical
//! address space, the spec's stated minimum), which bounds the bitmap's
//! own static storage — plain `.bss`, not heap-backed, since the heap
//! (component G) is built on top of this allocator.

use spin::Mutex;

use crate::boot::MemoryRegionKind;
use crate::error::{KResult, KernelError};

pub const PAGE_SIZE: usize = 4096;
const MAX_FRAMES: usize = 4 * 1024 * 1024 * 1024 / PAGE_SIZE; // 4 GiB worth
const BITMAP_WORDS: usize = MAX_FRAMES / 64;

pub struct MemoryMapEntry {
    pub addr: u64,
    pub length: u64,
    pub kind: MemoryRegionKind,
}

/// The allocator's state, factored out of the process-wide singleton so
/// tests can construct private instances instead of sharing one behind
/// a global lock (which would make `cargo test`'s parallel threads race
/// against each other's `init()` calls).
struct FrameAllocator {
    words: [u64; BITMAP_WORDS],
    total_frames: usize,
    used_frames: usize,
}

impl FrameAllocator {
    const fn empty() -> Self {
        Self { words: [0; BITMAP_WORDS], total_frames: 0, used_frames: 0 }
    }

    fn set(&mut self, frame: usize) {
        let (word, bit) = (frame / 64, frame % 64);
        self.words[word] |= 1 << bit;
    }

    fn clear(&mut self, frame: usize) {
        let (word, bit) = (frame / 64, frame % 64);
        self.words[word] &= !(1 << bit);
    }

    fn test(&self, frame: usize) -> bool {
        let (word, bit) = (frame / 64, frame % 64);
        self.words[word] & (1 << bit) != 0
    }

    fn init(&mut self, memory_map: &[MemoryMapEntry], max_frame: usize, kernel_phys_start: u64, kernel_phys_end: u64) {
        let frame_count = max_frame.min(MAX_FRAMES);
        self.total_frames = frame_count;
        self.used_frames = frame_count;

        for i in 0..(frame_count / 64 + 1).min(BITMAP_WORDS) {
            self.words[i] = u64::MAX;
        }

        for entry in memory_map {
            if entry.kind != MemoryRegionKind::Available {
                continue;
            }
            let start = ceil_div(entry.addr, PAGE_SIZE as u64);
            let end = (entry.addr + entry.length) / PAGE_SIZE as u64;
            for frame in start..end {
                let frame = frame as usize;
                if frame < frame_count && self.test(frame) {
                    self.clear(frame);
                    self.used_frames -= 1;
                }
            }
        }

        self.reserve_range(0, 1024 * 1024); // first 1 MiB
        self.reserve_range(kernel_phys_start, kernel_phys_end);
    }

    fn reserve_range(&mut self, start: u64, end: u64) {
        let start_frame = (start / PAGE_SIZE as u64) as usize;
        let end_frame = ceil_div(end, PAGE_SIZE as u64) as usize;
        for frame in start_frame..end_frame.min(self.total_frames) {
            if !self.test(frame) {
                self.set(frame);
                self.used_frames += 1;
            }
        }
    }

    fn alloc_frame(&mut self) -> Option<u64> {
        for word_idx in 0..(self.total_frames / 64 + 1).min(BITMAP_WORDS) {
            let word = self.words[word_idx];
            if word != u64::MAX {
                let bit = (!word).trailing_zeros() as usize;
                let frame = word_idx * 64 + bit;
                if frame >= self.total_frames {
                    continue;
                }
                self.set(frame);
                self.used_frames += 1;
                return Some((frame * PAGE_SIZE) as u64);
            }
        }
        None
    }

    fn alloc_contiguous(&mut self, n: usize) -> Option<u64> {
        if n == 0 {
            return Some(0);
        }
        let total = self.total_frames;
        let mut run_start = 0usize;
        let mut run_len = 0usize;

        for frame in 0..total {
            if self.test(frame) {
                run_len = 0;
            } else {
                if run_len == 0 {
                    run_start = frame;
                }
                run_len += 1;
                if run_len == n {
                    for f in run_start..run_start + n {
                        self.set(f);
                    }
                    self.used_frames += n;
                    return Some((run_start * PAGE_SIZE) as u64);
                }
            }
        }
        None
    }

    fn free_frame(&mut self, phys_addr: u64) {
        let frame = (phys_addr / PAGE_SIZE as u64) as usize;
        if frame >= self.total_frames {
            log::warn!("pmm: free_frame out of range: {phys_addr:#x}");
            return;
        }
        if !self.test(frame) {
            log::warn!("pmm: double free of frame {phys_addr:#x}");
            return;
        }
        self.clear(frame);
        self.used_frames -= 1;
    }

    fn total_bytes(&self) -> u64 {
        self.total_frames as u64 * PAGE_SIZE as u64
    }

    fn free_bytes(&self) -> u64 {
        ((self.total_frames - self.used_frames) as u64) * PAGE_SIZE as u64
    }
}

fn ceil_div(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

static ALLOCATOR: Mutex<FrameAllocator> = Mutex::new(FrameAllocator::empty());

fn with_allocator<R>(f: impl FnOnce(&mut FrameAllocator) -> R) -> R {
    f(&mut ALLOCATOR.lock())
}

/// Initializes the process-wide allocator from the loader-supplied
/// memory map plus the kernel image's physical range (§4.E init
/// algorithm, exact order: mark all used, clear Available ranges,
/// re-reserve the fixed regions). Call once from the boot path.
pub fn init(memory_map: &[MemoryMapEntry], max_frame: usize, kernel_phys_start: u64, kernel_phys_end: u64) {
    with_allocator(|a| a.init(memory_map, max_frame, kernel_phys_start, kernel_phys_end));
}

/// Allocates a single frame, returning its physical address, or `None`
/// when exhausted.
pub fn alloc_frame() -> Option<u64> {
    with_allocator(FrameAllocator::alloc_frame)
}

/// Allocates `n` physically contiguous frames via a single linear scan
/// for a run of `n` clear bits. No compaction; returns `None` if no run
/// of sufficient length exists before the scan reaches the end.
pub fn alloc_contiguous(n: usize) -> Option<u64> {
    with_allocator(|a| a.alloc_contiguous(n))
}

/// Frees a single frame. A double-free or out-of-range address is a
/// logged no-op (§7 invalid-free / double-free).
pub fn free_frame(phys_addr: u64) {
    with_allocator(|a| a.free_frame(phys_addr));
}

pub fn free_contiguous(phys_addr: u64, n: usize) {
    for i in 0..n {
        free_frame(phys_addr + (i * PAGE_SIZE) as u64);
    }
}

pub fn total_bytes() -> u64 {
    with_allocator(FrameAllocator::total_bytes)
}

pub fn free_bytes() -> u64 {
    with_allocator(FrameAllocator::free_bytes)
}

/// Wraps [`alloc_frame`] in the `KResult` error convention used by the
/// VMM and heap, which sit above the PMM and need a typed failure.
pub fn alloc_frame_checked() -> KResult<u64> {
    alloc_frame().ok_or(KernelError::OutOfMemory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(regions: &[(u64, u64)], max_frame: usize) -> FrameAllocator {
        let entries: alloc::vec::Vec<MemoryMapEntry> = regions
            .iter()
            .map(|&(addr, length)| MemoryMapEntry { addr, length, kind: MemoryRegionKind::Available })
            .collect();
        let mut allocator = FrameAllocator::empty();
        allocator.init(&entries, max_frame, 0, 0);
        allocator
    }

    #[test]
    fn scenario_1_memory_map_honors_reservation() {
        // Available [1MiB, 17MiB) and [32MiB, 128MiB); kernel [2MiB, 4MiB).
        let one_mib = 1024 * 1024u64;
        let entries = [
            MemoryMapEntry { addr: one_mib, length: 16 * one_mib, kind: MemoryRegionKind::Available },
            MemoryMapEntry { addr: 32 * one_mib, length: 96 * one_mib, kind: MemoryRegionKind::Available },
        ];
        let max_frame = (128 * one_mib / PAGE_SIZE as u64) as usize;
        let mut allocator = FrameAllocator::empty();
        allocator.init(&entries, max_frame, 2 * one_mib, 4 * one_mib);

        assert_eq!(allocator.total_bytes(), 128 * one_mib);

        let expected_free = 112 * one_mib - 2 * one_mib;
        assert_eq!(allocator.free_bytes(), expected_free);

        let frame = allocator.alloc_frame().expect("frame available");
        assert!(
            (frame >= one_mib && frame < 2 * one_mib)
                || (frame >= 4 * one_mib && frame < 17 * one_mib)
                || (frame >= 32 * one_mib && frame < 128 * one_mib)
        );
    }

    #[test]
    fn alloc_then_free_restores_free_bytes() {
        let mut allocator = fresh(&[(0, 16 * 1024 * 1024)], 4096);
        let before = allocator.free_bytes();
        let frame = allocator.alloc_frame().unwrap();
        assert!(allocator.free_bytes() < before);
        allocator.free_frame(frame);
        assert_eq!(allocator.free_bytes(), before);
    }

    #[test]
    fn exhaustion_returns_none_and_zero_free_bytes() {
        let mut allocator = fresh(&[(0, 3 * PAGE_SIZE as u64)], 3);
        assert!(allocator.alloc_frame().is_some());
        assert!(allocator.alloc_frame().is_some());
        assert!(allocator.alloc_frame().is_some());
        assert!(allocator.alloc_frame().is_none());
        assert_eq!(allocator.free_bytes(), 0);
    }

    #[test]
    fn double_free_is_a_no_op() {
        let mut allocator = fresh(&[(0, 4 * PAGE_SIZE as u64)], 4);
        let frame = allocator.alloc_frame().unwrap();
        let before = allocator.free_bytes();
        allocator.free_frame(frame);
        let after_first_free = allocator.free_bytes();
        allocator.free_frame(frame);
        assert_eq!(allocator.free_bytes(), after_first_free);
        assert!(after_first_free > before);
    }

    #[test]
    fn contiguous_allocation_returns_a_single_run() {
        let mut allocator = fresh(&[(0, 8 * PAGE_SIZE as u64)], 8);
        let base = allocator.alloc_contiguous(4).expect("run of 4 frames");
        for i in 0..4 {
            allocator.free_frame(base + (i * PAGE_SIZE) as u64);
        }
    }
}
