use alloc::vec::Vec;
use core::fmt;
use core::ptr::{self, NonNull};

use crate::block::Block;

/// Per-thread state threaded through every operation that can drop a
/// block.
///
/// A context owns the work lists that keep the drop and mark engines'
/// recursion bounded, and counts the blocks allocated and freed through
/// it. It is deliberately not `Send`: blocks managed by one context may
/// cross threads only after [`block_mark_shared`] has promoted them, and
/// the work lists themselves never leave their thread.
///
/// The context is passed explicitly rather than kept in thread-local
/// storage so the runtime composes with custom schedulers; create one per
/// thread and thread it by `&mut` through every call.
///
/// [`block_mark_shared`]: crate::block_mark_shared
pub struct Context {
    /// Blocks whose descent the drop engine deferred, linked through their
    /// own headers.
    pub(crate) delayed_free: *mut Block,

    /// Blocks the mark engine postponed when its recursion got too deep.
    /// Always drained before `block_mark_shared` returns; kept here so the
    /// backing storage is reused across calls.
    pub(crate) mark_overflow: Vec<NonNull<Block>>,

    pub(crate) allocated: u64,
    pub(crate) freed: u64,
}

impl Context {
    /// Creates a fresh context with empty work lists.
    pub fn new() -> Context {
        Context {
            delayed_free: ptr::null_mut(),
            mark_overflow: Vec::new(),
            allocated: 0,
            freed: 0,
        }
    }

    /// Number of blocks allocated through this context.
    #[inline]
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Number of blocks freed through this context.
    #[inline]
    pub fn freed(&self) -> u64 {
        self.freed
    }

    /// Blocks allocated through this context and not yet freed.
    ///
    /// A block promoted to thread-shared may be freed through another
    /// thread's context, so for shared workloads this is an upper bound
    /// rather than an exact live count.
    #[inline]
    pub fn live(&self) -> u64 {
        self.allocated.saturating_sub(self.freed)
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("delayed_free", &self.delayed_free)
            .field("allocated", &self.allocated)
            .field("freed", &self.freed)
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Both work lists are drained before any operation returns.
        debug_assert!(self.delayed_free.is_null());
        debug_assert!(self.mark_overflow.is_empty());
    }
}
