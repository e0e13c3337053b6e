//! Physical page allocator with copy-on-write reference counting.
//!
//! [`PageAllocator`] hands out fixed-size pages from a [`FreeList`] and
//! counts the owners of every page in a [`RefTable`]. A page goes back to the
//! free list only when its last owner frees it.

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod free_list;
pub mod page_allocator;
pub mod ref_table;

pub use self::{
    error::PageAllocError,
    free_list::FreeList,
    page_allocator::{MemoryInfo, PageAllocator},
    ref_table::RefTable,
};

/// Page allocator using the kernel's page size.
pub type KernelPageAllocator<'a, M> = PageAllocator<'a, M, { kalloc_params::PAGE_SIZE }>;

/// Free list using the kernel's page size.
pub type KernelFreeList = FreeList<{ kalloc_params::PAGE_SIZE }>;
