#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

//! Reference-counted heap blocks and byte buffers for language runtimes.
//!
//! This crate provides the memory-management core of a functional-language
//! runtime: heap [`Block`]s carrying a 64-bit header with a checked
//! reference count, a recursive drop engine that frees arbitrarily deep
//! structures with bounded native stack, transitive promotion of blocks to
//! thread-shared, and a [`Bytes`] datatype built on top of those
//! primitives.
//!
//! # Blocks
//!
//! A block is a header followed by a tail of one-word [`Value`] slots. The
//! leading `scan_fsize` slots hold child references and are traced when the
//! block is dropped; the rest of the payload is opaque. Blocks whose
//! [`Tag`] classifies as *raw* carry a finalizer instead and are never
//! scanned.
//!
//! The reference count starts at zero, meaning *unique*: the sole owner may
//! mutate the block in place. Counts in the high ranges mark blocks that
//! have been promoted to thread-shared by [`block_mark_shared`] (counted
//! atomically from then on) or that are sticky, i.e. immortal.
//!
//! # Contexts
//!
//! Every operation that can drop a block takes a [`Context`]: the
//! per-thread holder of the delayed-free work list that bounds the drop
//! engine's recursion. Contexts are threaded explicitly rather than hidden
//! in thread-local storage so the runtime composes with custom schedulers.
//!
//! # Bytes
//!
//! [`Bytes`] is a reference-counted byte buffer with small-buffer and
//! normal variants. Its mutating operations detect unique handles and
//! update buffers in place where the contract allows.
//!
//! ```
//! use blockrc::{Bytes, Context};
//!
//! let mut ctx = Context::new();
//! let b = Bytes::from_slice(b"hello world", &mut ctx);
//! assert_eq!(b.index_of(b"world"), 7);
//!
//! let b = b.replace_all(b"world", b"there", &mut ctx);
//! assert_eq!(b.as_slice(), b"hello there");
//!
//! b.drop(&mut ctx);
//! assert_eq!(ctx.live(), 0);
//! ```
//!
//! # Limitations
//!
//! Reference counting does not collect cycles. The source language this
//! runtime serves rules them out by construction; a cycle built through
//! the raw block API leaks.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod block;
mod bytes;
mod context;
mod header;
mod heap;
mod rc;
mod sync;
mod value;

#[cfg(feature = "serde")]
mod serde;

pub use crate::block::{
    block_alloc, block_alloc_raw, block_alloc_reuse, block_field, block_free, block_is_thread_shared,
    block_is_unique, block_scan_fsize, block_scan_start, block_set_field, block_tag, Block, RawBlock,
    RawFree, Reuse,
};
pub use crate::bytes::{Bytes, SMALL_MAX};
pub use crate::context::Context;
pub use crate::header::{Header, Tag, SCAN_FSIZE_MAX};
pub use crate::rc::{
    block_decref, block_drop, block_drop_reuse, block_dup, block_make_shared, block_mark_shared,
    value_drop, value_dup, value_mark_shared,
};
pub use crate::value::Value;

/// Abort the process.
///
/// Used instead of panicking when a length computation overflows the
/// address space: the runtime contract treats that as fatal, not
/// recoverable.
#[inline(never)]
#[cold]
pub(crate) fn abort() -> ! {
    #[cfg(feature = "std")]
    {
        std::process::abort();
    }

    #[cfg(not(feature = "std"))]
    {
        // Cause an abort by panicking during a panic.
        struct Abort;
        impl Drop for Abort {
            fn drop(&mut self) {
                panic!();
            }
        }
        let _a = Abort;
        panic!("abort");
    }
}
