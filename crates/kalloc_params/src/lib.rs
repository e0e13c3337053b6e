#![no_std]

/// Bytes per physical page.
pub const PAGE_SIZE: usize = 4096;

/// Physical address where the kernel image is loaded.
///
/// The reference table is indexed from here.
pub const KERNEL_BASE: usize = 0x8000_0000;

/// Top of the physical memory handed to the page allocator.
pub const PHYS_TOP: usize = KERNEL_BASE + 128 * 1024 * 1024;

/// Number of pages between [`KERNEL_BASE`] and [`PHYS_TOP`].
pub const MAX_PHYS_PAGES: usize = (PHYS_TOP - KERNEL_BASE) / PAGE_SIZE;

/// Byte written over a page when it is allocated.
///
/// Callers that need zeroed memory must ask for it explicitly.
pub const ALLOC_FILL_BYTE: u8 = 5;

/// Byte written over a page when it returns to the free pool.
///
/// Makes reads through dangling references stand out.
pub const FREE_FILL_BYTE: u8 = 1;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(KERNEL_BASE % PAGE_SIZE == 0);
    assert!(PHYS_TOP % PAGE_SIZE == 0);
    assert!(ALLOC_FILL_BYTE != FREE_FILL_BYTE);
};
