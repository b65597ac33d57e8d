//! Allocation shim with `free(ptr)`-style deallocation.
//!
//! The drop engine frees blocks generically (tail loops, delayed-free
//! list) without knowing their allocation size, but the global allocator
//! wants the layout back at dealloc time. Each allocation therefore
//! records its total size in one word ahead of the payload, the way a
//! malloc header would.

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use core::mem;
use core::ptr::NonNull;

const PREFIX: usize = mem::size_of::<usize>();

// Payloads hold the block header and `Value` words; word alignment covers
// both, and the one-word prefix preserves it.
const ALIGN: usize = mem::align_of::<usize>();

/// Allocates `size` bytes. Allocation failure and size overflow are fatal.
pub(crate) fn alloc_prefixed(size: usize) -> NonNull<u8> {
    let total = match size.checked_add(PREFIX) {
        Some(total) => total,
        None => crate::abort(),
    };
    let layout = match Layout::from_size_align(total, ALIGN) {
        Ok(layout) => layout,
        Err(_) => crate::abort(),
    };
    unsafe {
        let raw = alloc(layout);
        if raw.is_null() {
            handle_alloc_error(layout);
        }
        raw.cast::<usize>().write(total);
        NonNull::new_unchecked(raw.add(PREFIX))
    }
}

/// Releases an allocation made by [`alloc_prefixed`].
///
/// # Safety
///
/// `p` must come from [`alloc_prefixed`] and not have been freed already.
pub(crate) unsafe fn free_prefixed(p: NonNull<u8>) {
    let raw = p.as_ptr().sub(PREFIX);
    let total = raw.cast::<usize>().read();
    dealloc(raw, Layout::from_size_align_unchecked(total, ALIGN));
}
