//! Global Descriptor Table. Segmentation is flat in long mode; the GDT
//! exists only to supply CS/SS selectors and the TSS descriptor the CPU
//! needs for privilege transitions and IST dispatch.

use lazy_static::lazy_static;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code = gdt.add_entry(Descriptor::kernel_code_segment());
        let kernel_data = gdt.add_entry(Descriptor::kernel_data_segment());
        let user_data = gdt.add_entry(Descriptor::user_data_segment());
        let user_code = gdt.add_entry(Descriptor::user_code_segment());
        let tss = gdt.add_entry(Descriptor::tss_segment(&super::tss::TSS));
        (
            gdt,
            Selectors {
                kernel_code,
                kernel_data,
                user_data,
                user_code,
                tss,
            },
        )
    };
}

struct Selectors {
    kernel_code: SegmentSelector,
    kernel_data: SegmentSelector,
    #[allow(dead_code)]
    user_data: SegmentSelector,
    #[allow(dead_code)]
    user_code: SegmentSelector,
    tss: SegmentSelector,
}

/// Loads the GDT and reloads every segment register plus the task register.
/// Must run before [`super::idt::init`] — a present-but-unloaded TSS would
/// make the IST entries referenced from the IDT meaningless.
pub fn init() {
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
    use x86_64::instructions::tables::load_tss;

    GDT.0.load();
    // SAFETY: the selectors above were produced by this exact GDT and name
    // entries of the matching type (code/data/TSS); loading them here is
    // the standard long-mode reload sequence.
    unsafe {
        CS::set_reg(GDT.1.kernel_code);
        DS::set_reg(GDT.1.kernel_data);
        ES::set_reg(GDT.1.kernel_data);
        SS::set_reg(GDT.1.kernel_data);
        load_tss(GDT.1.tss);
    }
}
