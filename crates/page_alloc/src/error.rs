/// Recoverable failures of the page allocator.
///
/// Invariant violations (freeing a bad pointer, sharing a free page) are not
/// represented here: they panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageAllocError {
    /// The free pool is empty.
    #[error("no free page")]
    NoFreePage,
}
