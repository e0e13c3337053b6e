use core::ptr::NonNull;

/// Link stored in the first bytes of every free page.
struct Run {
    /// Next free page, or `None` at the tail.
    next: Option<NonNull<Run>>,
}

/// The free pool: a LIFO list of free pages threaded through the pages
/// themselves.
///
/// The list owns no storage of its own. Each free page holds a [`Run`] in its
/// first bytes; the rest of the page is junk. The list does not validate
/// pages, that is the job of [`PageAllocator`](crate::PageAllocator), which
/// also keeps the list behind a lock.
#[derive(Debug)]
pub struct FreeList<const PAGE_SIZE: usize> {
    /// The most recently pushed page.
    head: Option<NonNull<Run>>,
    /// Number of pages currently on the list.
    len: usize,
}

// The pages on the list are exclusively owned by the list.
unsafe impl<const PAGE_SIZE: usize> Send for FreeList<PAGE_SIZE> {}

impl<const PAGE_SIZE: usize> Default for FreeList<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGE_SIZE: usize> FreeList<PAGE_SIZE> {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        const {
            assert!(size_of::<Run>() <= PAGE_SIZE);
            assert!(PAGE_SIZE % align_of::<Run>() == 0);
        }

        Self { head: None, len: 0 }
    }

    /// Returns the number of pages on the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no page is available.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Removes the most recently pushed page.
    ///
    /// Returns `None` if the list is empty.
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let page = self.head.take()?;
        self.head = unsafe { page.as_ref().next };
        self.len -= 1;
        Some(page.cast())
    }

    /// Pushes `page` onto the list head.
    ///
    /// # Safety
    ///
    /// `page` must be aligned to `PAGE_SIZE`, point to `PAGE_SIZE` writable
    /// bytes, and not be accessed by anyone else until it is popped again.
    /// It must not already be on the list.
    pub unsafe fn push(&mut self, page: NonNull<u8>) {
        let run = page.cast::<Run>();
        unsafe {
            run.write(Run { next: self.head });
        }
        self.head = Some(run);
        self.len += 1;
    }
}
