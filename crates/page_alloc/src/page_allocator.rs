//! Physical memory allocator, for user processes,
//! kernel stacks, page-table pages,
//! and pipe buffers.
//!
//! Allocates whole pages and counts their owners so that a page can be
//! shared copy-on-write between address spaces.

use core::{
    ops::Range,
    ptr::NonNull,
    slice,
    sync::atomic::AtomicU32,
};

use kalloc_params::{ALLOC_FILL_BYTE, FREE_FILL_BYTE};
use mutex_api::Mutex;

use crate::{FreeList, PageAllocError, RefTable};

/// Snapshot of the allocator's page counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Pages currently in the free pool.
    pub free_pages: usize,
    /// Pages handed to the pool by initialization.
    pub total_pages: usize,
    /// Bytes per page.
    pub page_size: usize,
}

/// Page allocator with per-page reference counts.
///
/// Free pages are kept on a [`FreeList`] behind the lock `M`. Owner counts
/// live in a [`RefTable`] and are updated atomically, outside the lock.
pub struct PageAllocator<'a, M, const PAGE_SIZE: usize>
where
    M: Mutex<Data = FreeList<PAGE_SIZE>>,
{
    /// Pages managed by this allocator.
    heap: Range<NonNull<u8>>,
    free_list: M,
    refs: RefTable<'a, PAGE_SIZE>,
    total_pages: usize,
}

unsafe impl<M, const PAGE_SIZE: usize> Send for PageAllocator<'_, M, PAGE_SIZE> where
    M: Mutex<Data = FreeList<PAGE_SIZE>> + Send
{
}

unsafe impl<M, const PAGE_SIZE: usize> Sync for PageAllocator<'_, M, PAGE_SIZE> where
    M: Mutex<Data = FreeList<PAGE_SIZE>> + Sync
{
}

/// Shrinks `range` to the whole pages it contains.
fn page_range<const PAGE_SIZE: usize>(range: &Range<NonNull<u8>>) -> Range<NonNull<u8>> {
    let start_addr = range.start.addr().get();
    let offset = start_addr.next_multiple_of(PAGE_SIZE) - start_addr;
    let pages = range.end.addr().get().saturating_sub(start_addr + offset) / PAGE_SIZE;

    let start = range.start.map_addr(|a| a.saturating_add(offset));
    let end = start.map_addr(|a| a.saturating_add(pages * PAGE_SIZE));
    start..end
}

fn addr_range(range: &Range<NonNull<u8>>) -> Range<usize> {
    range.start.addr().get()..range.end.addr().get()
}

impl<'a, M, const PAGE_SIZE: usize> PageAllocator<'a, M, PAGE_SIZE>
where
    M: Mutex<Data = FreeList<PAGE_SIZE>>,
{
    /// Creates an allocator owning every whole page in `range`.
    ///
    /// The start of `range` is rounded up and its end rounded down to a page
    /// boundary. Each page is released through [`Self::free`], then every
    /// entry of `refs` is reset to `0`.
    ///
    /// # Safety
    ///
    /// `range` must be valid, writable memory that nothing else uses for
    /// as long as the allocator lives.
    ///
    /// # Panics
    ///
    /// Panics if `refs` does not have an entry for every page in `range`.
    #[must_use]
    pub unsafe fn new(range: Range<NonNull<u8>>, refs: RefTable<'a, PAGE_SIZE>) -> Self {
        let heap = page_range::<PAGE_SIZE>(&range);
        assert!(
            refs.covers(&addr_range(&heap)),
            "reference table does not cover {:#p}..{:#p}",
            heap.start,
            heap.end
        );

        // Caller-provided storage may hold stale counts.
        refs.clear();

        let mut this = Self {
            heap,
            free_list: M::new(FreeList::new()),
            refs,
            total_pages: 0,
        };

        let mut p = this.heap.start;
        while p < this.heap.end {
            unsafe {
                this.free(p);
                p = p.byte_add(PAGE_SIZE);
            }
            this.total_pages += 1;
        }

        this.refs.clear();

        log::debug!(
            "page allocator: {} pages in {:#p}..{:#p}",
            this.total_pages,
            this.heap.start,
            this.heap.end
        );

        this
    }

    /// Creates an allocator that keeps its reference table at the start of
    /// `range` and manages the whole pages after it.
    ///
    /// Used at boot, before any other memory is available for the table.
    ///
    /// # Safety
    ///
    /// `range` must be valid, writable memory that nothing else uses for
    /// the lifetime `'a`.
    ///
    /// # Panics
    ///
    /// Panics if no page is left for allocation once the table is placed.
    #[must_use]
    pub unsafe fn new_in_place(range: Range<NonNull<u8>>) -> Self {
        const {
            assert!(PAGE_SIZE % align_of::<AtomicU32>() == 0);
        }

        let region = page_range::<PAGE_SIZE>(&range);
        let max_pages = (region.end.addr().get() - region.start.addr().get()) / PAGE_SIZE;
        let table_pages = (max_pages * size_of::<AtomicU32>()).div_ceil(PAGE_SIZE);
        assert!(
            table_pages < max_pages,
            "no room for pages after reference table in {:#p}..{:#p}",
            range.start,
            range.end
        );

        let table = region.start.cast::<AtomicU32>();
        for i in 0..max_pages {
            unsafe {
                table.add(i).write(AtomicU32::new(0));
            }
        }
        let counts: &'a [AtomicU32] = unsafe { slice::from_raw_parts(table.as_ptr(), max_pages) };

        let heap_start = unsafe { region.start.byte_add(table_pages * PAGE_SIZE) };
        let refs = RefTable::new(heap_start.addr().get(), counts);

        unsafe { Self::new(heap_start..region.end, refs) }
    }

    #[track_caller]
    fn validate(&self, page: NonNull<u8>) -> usize {
        let pa = page.addr().get();
        assert_eq!(pa % PAGE_SIZE, 0, "page = {page:#p} is not page-aligned");
        assert!(
            self.heap.contains(&page),
            "page = {:#p} is outside {:#p}..{:#p}",
            page,
            self.heap.start,
            self.heap.end
        );
        pa
    }

    fn alloc_filled(&self, fill: u8) -> Result<NonNull<u8>, PageAllocError> {
        let mut free_list = self.free_list.lock();
        let page = free_list.pop();
        drop(free_list);

        let Some(page) = page else {
            log::trace!("page allocator: out of free pages");
            return Err(PageAllocError::NoFreePage);
        };

        unsafe {
            page.write_bytes(fill, PAGE_SIZE);
        }
        self.refs.set_allocated(page.addr().get());

        Ok(page)
    }

    /// Allocates one page of physical memory.
    ///
    /// Every byte of the page is set to [`ALLOC_FILL_BYTE`], so callers that
    /// need zeroed memory must use [`Self::alloc_zeroed`]. The page starts
    /// with a reference count of `1`.
    ///
    /// Returns [`PageAllocError::NoFreePage`] if the pool is empty.
    pub fn alloc(&self) -> Result<NonNull<u8>, PageAllocError> {
        self.alloc_filled(ALLOC_FILL_BYTE)
    }

    /// Allocates one zeroed page of physical memory.
    ///
    /// Returns [`PageAllocError::NoFreePage`] if the pool is empty.
    pub fn alloc_zeroed(&self) -> Result<NonNull<u8>, PageAllocError> {
        self.alloc_filled(0)
    }

    /// Drops one owner of `page`.
    ///
    /// If other owners remain the page is left untouched. Otherwise it is
    /// filled with [`FREE_FILL_BYTE`] to catch dangling references and put
    /// back in the free pool.
    ///
    /// # Safety
    ///
    /// `page` must have been returned by [`Self::alloc`] or
    /// [`Self::alloc_zeroed`], and the caller must not access it afterwards
    /// through the reference it drops.
    ///
    /// # Panics
    ///
    /// Panics if `page` is not page-aligned or not managed by this
    /// allocator. Nothing is modified in that case.
    #[track_caller]
    pub unsafe fn free(&self, page: NonNull<u8>) {
        let pa = self.validate(page);

        if self.refs.release(pa) > 1 {
            return;
        }

        unsafe {
            page.write_bytes(FREE_FILL_BYTE, PAGE_SIZE);
        }

        let mut free_list = self.free_list.lock();
        unsafe {
            free_list.push(page);
        }
    }

    /// Adds an owner to `page`, which must be in use.
    ///
    /// Called when a mapping to the page is duplicated without copying it.
    ///
    /// # Panics
    ///
    /// Panics if `page` is invalid (see [`Self::free`]) or currently free.
    #[track_caller]
    pub fn increment_ref(&self, page: NonNull<u8>) {
        let pa = self.validate(page);
        self.refs.increment(pa);
    }

    /// Returns the number of owners of `page`.
    ///
    /// # Panics
    ///
    /// Panics if `page` is invalid (see [`Self::free`]).
    #[track_caller]
    #[must_use]
    pub fn ref_count(&self, page: NonNull<u8>) -> u32 {
        let pa = self.validate(page);
        self.refs.get(pa)
    }

    /// Returns `true` if `ptr` is a page-aligned address managed by this
    /// allocator.
    #[must_use]
    pub fn is_heap_addr(&self, ptr: NonNull<u8>) -> bool {
        ptr.addr().get() % PAGE_SIZE == 0 && self.heap.contains(&ptr)
    }

    /// Retrieves memory information, including the number of free and total
    /// pages.
    #[must_use]
    pub fn info(&self) -> MemoryInfo {
        let free_pages = self.free_list.lock().len();
        MemoryInfo {
            free_pages,
            total_pages: self.total_pages,
            page_size: PAGE_SIZE,
        }
    }
}
