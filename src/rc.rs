//! The reference-count state machine and the recursive drop engine.
//!
//! The refcount word encodes both the count and the block's lifecycle
//! state (see the range table in `header.rs`). Unique and locally shared
//! blocks are counted with plain relaxed loads and stores; once a block is
//! promoted to thread-shared the count moves into the high range and every
//! mutation is a relaxed atomic. Relaxed is enough: shared payloads are
//! immutable, and the hand-off that publishes a block to another thread
//! must itself carry release/acquire ordering (channel send, lock
//! release).
//!
//! Dropping the last reference frees the block and decrements its
//! children. Chains of single-field blocks free in a loop with no stack
//! growth; wider blocks recurse up to [`MAX_RECURSE_DEPTH`] and then park
//! on the context's delayed-free list, which is encoded in the block
//! headers themselves and drained to a fixpoint before the drop returns.

use core::mem;
use core::ptr::{self, NonNull};

use crate::block::{
    block_field, block_free, block_free_raw, block_scan_fsize, header, Block, Reuse,
};
use crate::context::Context;
use crate::header::{Header, RC_INVALID, RC_SHARED, RC_STICKY_HI, RC_STICKY_LO, SCAN_FSIZE_MAX};
use crate::value::Value;

const MAX_RECURSE_DEPTH: usize = 100;

/// Adds one reference to `b` and returns it.
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_dup(b: NonNull<Block>) -> NonNull<Block> {
    let rc = header(b).rc();
    if (rc as i32) >= 0 {
        // unique or locally shared
        header(b).rc_set(rc + 1);
        b
    } else {
        block_check_dup(b, rc)
    }
}

#[cold]
unsafe fn block_check_dup(b: NonNull<Block>, rc0: u32) -> NonNull<Block> {
    debug_assert!(rc0 >= RC_SHARED && rc0 < RC_INVALID);
    if rc0 < RC_STICKY_HI {
        header(b).atomic_incr();
    }
    // else sticky: no longer increment (or decrement)
    b
}

/// Removes one reference from `b`, freeing it and dropping its children
/// when it was the last.
///
/// # Safety
///
/// `b` must be a live block; the reference is consumed and must not be
/// used afterwards.
#[inline]
pub unsafe fn block_drop(b: NonNull<Block>, ctx: &mut Context) {
    let rc = header(b).rc();
    if (rc as i32) <= 0 {
        block_check_drop(b, rc, ctx);
    } else {
        header(b).rc_set(rc - 1);
    }
}

#[cold]
unsafe fn block_check_drop(b: NonNull<Block>, rc0: u32, ctx: &mut Context) {
    debug_assert!(rc0 == 0 || (rc0 >= RC_SHARED && rc0 < RC_INVALID));
    if rc0 == 0 {
        // no more references, free it
        block_drop_free(b, ctx);
    } else if rc0 >= RC_STICKY_LO {
        // sticky: do not decrement further
    } else {
        let rc = header(b).atomic_decr();
        if rc == RC_SHARED && header(b).is_thread_shared() {
            // dropping to RC_SHARED on a shared block means no references
            // remain
            header(b).rc_set(0);
            header(b).set_thread_shared(false);
            block_drop_free(b, ctx);
        }
    }
}

/// Like [`block_drop`], but when the block would be freed on the unique
/// path, its children are dropped individually and the storage is handed
/// back as a [`Reuse`] token instead.
///
/// Shared and sticky references behave exactly as [`block_drop`] and
/// yield [`Reuse::NULL`].
///
/// # Safety
///
/// As [`block_drop`].
#[inline]
pub unsafe fn block_drop_reuse(b: NonNull<Block>, ctx: &mut Context) -> Reuse {
    let rc = header(b).rc();
    if (rc as i32) <= 0 {
        block_check_drop_reuse(b, rc, ctx)
    } else {
        header(b).rc_set(rc - 1);
        Reuse::NULL
    }
}

#[cold]
unsafe fn block_check_drop_reuse(b: NonNull<Block>, rc0: u32, ctx: &mut Context) -> Reuse {
    debug_assert!(rc0 == 0 || (rc0 >= RC_SHARED && rc0 < RC_INVALID));
    if rc0 == 0 {
        // no more references: consume the children, hand back the storage
        let scan_fsize = block_scan_fsize(b);
        for i in 0..scan_fsize {
            value_drop(block_field(b, i), ctx);
        }
        ptr::write_bytes(b.cast::<u8>().as_ptr(), 0, mem::size_of::<Header>());
        Reuse::from_block(b)
    } else {
        block_check_drop(b, rc0, ctx);
        Reuse::NULL
    }
}

/// Removes one reference without visiting children, freeing only the
/// block itself on reaching zero. For callers that have already consumed
/// the fields.
///
/// # Safety
///
/// As [`block_drop`]; every scanned slot must already be dead.
#[inline]
pub unsafe fn block_decref(b: NonNull<Block>, ctx: &mut Context) {
    let rc = header(b).rc();
    if (rc as i32) <= 0 {
        block_check_decref(b, rc, ctx);
    } else {
        header(b).rc_set(rc - 1);
    }
}

#[cold]
unsafe fn block_check_decref(b: NonNull<Block>, rc0: u32, ctx: &mut Context) {
    debug_assert!(rc0 == 0 || (rc0 >= RC_SHARED && rc0 < RC_INVALID));
    if rc0 == 0 {
        block_free(b, ctx);
    } else if rc0 >= RC_STICKY_LO {
        // sticky: do not decrement further
    } else {
        let rc = header(b).atomic_decr();
        if rc == RC_SHARED && header(b).is_thread_shared() {
            header(b).rc_set(0);
            header(b).set_thread_shared(false);
            block_free(b, ctx);
        }
    }
}

/// Sets `thread_shared` and moves the local count into the shared range.
///
/// This promotes a single block; [`block_mark_shared`] promotes a whole
/// reachable subgraph and is what runtimes call before sending a value to
/// another thread.
///
/// # Safety
///
/// `b` must be live and not yet thread-shared (promotion is one-way and
/// must happen at most once per block).
#[inline]
pub unsafe fn block_make_shared(b: NonNull<Block>) {
    debug_assert!(!header(b).is_thread_shared());
    header(b).set_thread_shared(true);
    header(b).atomic_add(RC_SHARED + 1);
}

/// [`block_drop`] lifted to boxed values: a no-op unless `v` holds a
/// block pointer.
///
/// # Safety
///
/// A pointer value must reference a live block.
#[inline]
pub unsafe fn value_drop(v: Value, ctx: &mut Context) {
    if let Some(b) = v.as_block() {
        block_drop(b, ctx);
    }
}

/// [`block_dup`] lifted to boxed values.
///
/// # Safety
///
/// A pointer value must reference a live block.
#[inline]
pub unsafe fn value_dup(v: Value) -> Value {
    if let Some(b) = v.as_block() {
        block_dup(b);
    }
    v
}

// Decrement a refcount without freeing the block yet; true when no
// references remain.
#[inline]
unsafe fn block_decref_no_free(b: NonNull<Block>) -> bool {
    let rc = header(b).rc();
    if rc == 0 {
        true
    } else if rc >= RC_SHARED {
        block_check_decref_no_free(b)
    } else {
        header(b).rc_set(rc - 1);
        false
    }
}

unsafe fn block_check_decref_no_free(b: NonNull<Block>) -> bool {
    let rc = header(b).atomic_decr();
    if rc == RC_SHARED && header(b).is_thread_shared() {
        header(b).rc_set(0);
        header(b).set_thread_shared(false);
        return true;
    }
    if rc > RC_STICKY_LO {
        // sticky: undo the decrement to never free
        header(b).atomic_incr();
    }
    false
}

// Free a block whose refcount reached zero, decrementing its children
// recursively.
unsafe fn block_drop_free(b: NonNull<Block>, ctx: &mut Context) {
    debug_assert_eq!(header(b).rc(), 0);
    let scan_fsize = header(b).scan_fsize();
    if scan_fsize == 0 {
        // nothing to scan, deallocate directly
        if header(b).tag().is_raw() {
            block_free_raw(b, ctx);
        }
        block_free(b, ctx);
    } else {
        block_drop_free_rec(b, scan_fsize as usize, 0, ctx);
        block_drop_free_delayed(ctx);
    }
}

// Free recursively. Single-field blocks continue in the loop without a
// new stack frame; wider blocks recurse until MAX_RECURSE_DEPTH and then
// park on the delayed-free list.
unsafe fn block_drop_free_rec(
    mut b: NonNull<Block>,
    mut scan_fsize: usize,
    depth: usize,
    ctx: &mut Context,
) {
    loop {
        debug_assert_eq!(header(b).rc(), 0);
        if scan_fsize == 0 {
            if header(b).tag().is_raw() {
                block_free_raw(b, ctx);
            }
            block_free(b, ctx);
            return;
        } else if scan_fsize == 1 {
            let v = block_field(b, 0);
            block_free(b, ctx);
            if let Some(child) = v.as_block() {
                if block_decref_no_free(child) {
                    // continue freeing on the child
                    b = child;
                    scan_fsize = header(b).scan_fsize() as usize;
                    continue;
                }
            }
            return;
        } else if depth < MAX_RECURSE_DEPTH {
            let mut i = 0;
            if scan_fsize >= SCAN_FSIZE_MAX as usize {
                scan_fsize = block_field(b, 0).as_int() as usize + 1;
                i += 1; // slot 0 holds the count itself
            }
            // free the children up to the last one
            while i < scan_fsize - 1 {
                let v = block_field(b, i);
                if let Some(child) = v.as_block() {
                    if block_decref_no_free(child) {
                        let child_scan = header(child).scan_fsize() as usize;
                        block_drop_free_rec(child, child_scan, depth + 1, ctx);
                    }
                }
                i += 1;
            }
            // and take the last one in place of recursion
            let v = block_field(b, scan_fsize - 1);
            block_free(b, ctx);
            if let Some(child) = v.as_block() {
                if block_decref_no_free(child) {
                    b = child;
                    scan_fsize = header(b).scan_fsize() as usize;
                    continue;
                }
            }
            return;
        } else {
            // recursed too deep; park the block for later
            block_push_delayed_free(b, ctx);
            return;
        }
    }
}

// Stash a block on the context's delayed-free list. The next pointer is
// encoded in the header itself: the low 32 bits in the refcount, the rest
// in the tag. `scan_fsize` stays valid so the drop can resume. Addresses
// must fit 48 bits.
unsafe fn block_push_delayed_free(b: NonNull<Block>, ctx: &mut Context) {
    debug_assert_eq!(header(b).rc(), 0);
    let delayed = ctx.delayed_free as usize;
    header(b).rc_set(delayed as u32);
    #[cfg(target_pointer_width = "64")]
    {
        debug_assert_eq!(delayed >> 48, 0);
        ptr::addr_of_mut!((*b.as_ptr()).header.tag).write((delayed >> 32) as u16);
    }
    ctx.delayed_free = b.as_ptr();
}

// Drain the delayed-free list to a fixpoint: freeing a parked block can
// park further blocks.
unsafe fn block_drop_free_delayed(ctx: &mut Context) {
    loop {
        let mut delayed = ctx.delayed_free;
        if delayed.is_null() {
            return;
        }
        ctx.delayed_free = ptr::null_mut();
        while let Some(b) = NonNull::new(delayed) {
            #[cfg(target_pointer_width = "64")]
            let next =
                (header(b).rc() as usize) + (((*b.as_ptr()).header.tag as usize) << 32);
            #[cfg(not(target_pointer_width = "64"))]
            let next = header(b).rc() as usize;
            header(b).rc_set(0);
            delayed = next as *mut Block;
            block_drop_free_rec(b, header(b).scan_fsize() as usize, 0, ctx);
        }
    }
}

/// Promotes `b` and every block transitively reachable from it to
/// thread-shared. Subgraphs that are already shared are skipped.
///
/// Promotion only makes the reference counting atomic; publishing the
/// block to another thread still requires external release/acquire
/// synchronization (channel send, lock release).
///
/// # Safety
///
/// `b` must be a live block owned by the current thread.
pub unsafe fn block_mark_shared(b: NonNull<Block>, ctx: &mut Context) {
    if header(b).is_thread_shared() {
        return;
    }
    debug_assert!(ctx.mark_overflow.is_empty());
    block_mark_shared_rec(b, header(b).scan_fsize() as usize, 0, ctx);
    // blocks parked on depth overflow restart at depth 0
    while let Some(b) = ctx.mark_overflow.pop() {
        block_mark_shared_rec(b, header(b).scan_fsize() as usize, 0, ctx);
    }
}

/// [`block_mark_shared`] lifted to boxed values.
///
/// # Safety
///
/// A pointer value must reference a live block owned by this thread.
#[inline]
pub unsafe fn value_mark_shared(v: Value, ctx: &mut Context) {
    if let Some(b) = v.as_block() {
        block_mark_shared(b, ctx);
    }
}

// Same traversal shape as the drop engine: tail loop on single-field
// blocks, bounded recursion on wider ones. Blocks hit by the depth limit
// are parked *unmarked* on the context's overflow list and restarted at
// depth 0 by block_mark_shared.
unsafe fn block_mark_shared_rec(
    mut b: NonNull<Block>,
    mut scan_fsize: usize,
    depth: usize,
    ctx: &mut Context,
) {
    loop {
        if header(b).is_thread_shared() {
            // already shared, and so is everything below it
            return;
        }
        if scan_fsize > 1 && depth >= MAX_RECURSE_DEPTH {
            ctx.mark_overflow.push(b);
            return;
        }
        block_make_shared(b);
        if scan_fsize == 0 {
            return;
        } else if scan_fsize == 1 {
            let v = block_field(b, 0);
            if let Some(child) = v.as_block() {
                b = child;
                scan_fsize = header(b).scan_fsize() as usize;
                continue;
            }
            return;
        } else {
            let mut i = 0;
            if scan_fsize >= SCAN_FSIZE_MAX as usize {
                scan_fsize = block_field(b, 0).as_int() as usize + 1;
                i += 1;
            }
            while i < scan_fsize - 1 {
                if let Some(child) = block_field(b, i).as_block() {
                    let child_scan = header(child).scan_fsize() as usize;
                    block_mark_shared_rec(child, child_scan, depth + 1, ctx);
                }
                i += 1;
            }
            if let Some(child) = block_field(b, scan_fsize - 1).as_block() {
                b = child;
                scan_fsize = header(b).scan_fsize() as usize;
                continue;
            }
            return;
        }
    }
}
