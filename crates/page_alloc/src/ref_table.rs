use core::{
    ops::Range,
    sync::atomic::{AtomicU32, Ordering},
};

use kalloc_params::{KERNEL_BASE, MAX_PHYS_PAGES, PAGE_SIZE as KERNEL_PAGE_SIZE};

/// Per-page reference counts, indexed by physical page number.
///
/// Entry `i` counts the owners of the page at `base + i * PAGE_SIZE`. A count
/// of `0` means the page is in the free pool. Every update is a single atomic
/// read-modify-write, so concurrent updates of one entry are linearizable
/// without holding the free pool lock.
#[derive(Debug)]
pub struct RefTable<'a, const PAGE_SIZE: usize> {
    /// Address of the page counted by the first entry.
    base: usize,
    counts: &'a [AtomicU32],
}

impl<'a, const PAGE_SIZE: usize> RefTable<'a, PAGE_SIZE> {
    /// Creates a table whose first entry counts the page at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not page-aligned.
    #[must_use]
    pub const fn new(base: usize, counts: &'a [AtomicU32]) -> Self {
        assert!(base % PAGE_SIZE == 0, "table base is not page-aligned");
        Self { base, counts }
    }

    /// Returns the number of pages the table can count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if the table counts no page at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns `true` if every page in the address range `pa_range` has an
    /// entry.
    #[must_use]
    pub fn covers(&self, pa_range: &Range<usize>) -> bool {
        if pa_range.is_empty() {
            return true;
        }
        let table_end = self.base + self.counts.len() * PAGE_SIZE;
        self.base <= pa_range.start && pa_range.end <= table_end
    }

    #[track_caller]
    fn entry(&self, pa: usize) -> &AtomicU32 {
        assert_eq!(pa % PAGE_SIZE, 0, "pa = {pa:#x}");
        pa.checked_sub(self.base)
            .and_then(|offset| self.counts.get(offset / PAGE_SIZE))
            .unwrap_or_else(|| panic!("pa = {pa:#x} has no reference count entry"))
    }

    /// Resets every entry to `0`.
    pub(crate) fn clear(&self) {
        for count in self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }

    /// Returns the current reference count of the page at `pa`.
    #[track_caller]
    pub(crate) fn get(&self, pa: usize) -> u32 {
        self.entry(pa).load(Ordering::Acquire)
    }

    /// Records the first owner of a page just taken from the free pool.
    ///
    /// # Panics
    ///
    /// Panics if the page already had an owner.
    #[track_caller]
    pub(crate) fn set_allocated(&self, pa: usize) {
        if let Err(count) = self
            .entry(pa)
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!("free page pa = {pa:#x} has reference count {count}");
        }
    }

    /// Adds an owner to an in-use page.
    ///
    /// Returns the count before the increment.
    ///
    /// # Panics
    ///
    /// Panics if the page is free or the count would overflow.
    #[track_caller]
    pub(crate) fn increment(&self, pa: usize) -> u32 {
        let res = self
            .entry(pa)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    return None;
                }
                count.checked_add(1)
            });
        match res {
            Ok(prev) => prev,
            Err(0) => panic!("cannot share free page pa = {pa:#x}"),
            Err(_) => panic!("reference count overflow, pa = {pa:#x}"),
        }
    }

    /// Drops one owner of the page at `pa`.
    ///
    /// A count above `1` is decremented. A count of `0` or `1` becomes `0`,
    /// which means the caller must return the page to the free pool.
    ///
    /// Returns the count before the update.
    #[track_caller]
    pub(crate) fn release(&self, pa: usize) -> u32 {
        let (Ok(prev) | Err(prev)) =
            self.entry(pa)
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                    Some(count.saturating_sub(1))
                });
        prev
    }
}

impl<'a> RefTable<'a, KERNEL_PAGE_SIZE> {
    /// Creates a table counting every page from [`KERNEL_BASE`] up to
    /// [`kalloc_params::PHYS_TOP`].
    #[must_use]
    pub const fn for_kernel(counts: &'a [AtomicU32; MAX_PHYS_PAGES]) -> Self {
        Self::new(KERNEL_BASE, counts)
    }
}
