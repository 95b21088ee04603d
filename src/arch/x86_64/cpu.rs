//! CPU facilities (component B): control registers, MSRs, CPUID, and TLB
//! invalidation primitives used by the VMM.

use x86_64::registers::control::{Cr0, Cr0Flags, Cr2, Cr3, Cr3Flags};
use x86_64::registers::model_specific::Msr;
use x86_64::structures::paging::PhysFrame;
use x86_64::{PhysAddr, VirtAddr};

/// Reads CR2, the faulting linear address latched by the CPU on a page
/// fault (§4.C). Only meaningful from inside the #PF handler.
#[inline]
pub fn read_cr2() -> u64 {
    Cr2::read_raw()
}

/// Reads the physical frame currently loaded as PML4 root (CR3).
#[inline]
pub fn read_cr3() -> u64 {
    Cr3::read().0.start_address().as_u64()
}

/// Loads a new PML4 root into CR3, switching address spaces. `flags`
/// carries the PCID bits; the core does not use PCID so this is always
/// [`Cr3Flags::empty`] in practice, exposed for completeness.
///
/// # Safety
/// `phys_pml4` must point at a valid, fully-populated PML4 table whose
/// upper half mirrors the kernel directory.
#[inline]
pub unsafe fn write_cr3(phys_pml4: u64) {
    let frame = PhysFrame::containing_address(PhysAddr::new(phys_pml4));
    // SAFETY: forwarded to caller's invariant.
    unsafe { Cr3::write(frame, Cr3Flags::empty()) };
}

/// Invalidates a single TLB entry for `virt` (local CPU only — no IPI
/// shootdown since SMP is a Non-goal, §1).
#[inline]
pub fn flush_tlb(virt: u64) {
    x86_64::instructions::tlb::flush(VirtAddr::new(virt));
}

/// Invalidates the entire TLB by reloading CR3 with its current value.
#[inline]
pub fn flush_tlb_all() {
    x86_64::instructions::tlb::flush_all();
}

/// Reads a model-specific register.
///
/// # Safety
/// `msr` must name an MSR that exists and is readable at the current
/// privilege level.
#[inline]
pub unsafe fn rdmsr(msr: u32) -> u64 {
    // SAFETY: forwarded to caller's invariant.
    unsafe { Msr::new(msr).read() }
}

/// Writes a model-specific register.
///
/// # Safety
/// `msr` must name a writable MSR and `value` must be a legal encoding for
/// it; writing garbage to some MSRs (e.g. the APIC base) can fault.
#[inline]
pub unsafe fn wrmsr(msr: u32, value: u64) {
    // SAFETY: forwarded to caller's invariant.
    unsafe { Msr::new(msr).write(value) };
}

/// Returns true if CPUID reports a local APIC (leaf 1, EDX bit 9).
pub fn has_apic() -> bool {
    raw_cpuid::CpuId::new()
        .get_feature_info()
        .map(|f| f.has_apic())
        .unwrap_or(false)
}

/// Returns true if CPUID reports the APIC can be accessed through MSRs
/// (x2APIC, leaf 1, ECX bit 21).
pub fn has_x2apic() -> bool {
    raw_cpuid::CpuId::new()
        .get_feature_info()
        .map(|f| f.has_x2apic())
        .unwrap_or(false)
}

/// Disables write protection enforcement on read-only pages for the
/// kernel (CR0.WP). The core always runs with WP set; this exists so the
/// VMM's tests can assert the invariant without touching real hardware.
#[inline]
pub fn write_protect_enabled() -> bool {
    Cr0::read().contains(Cr0Flags::WRITE_PROTECT)
}
