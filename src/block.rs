use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use crate::context::Context;
use crate::header::{Header, Tag, SCAN_FSIZE_MAX};
use crate::heap;
use crate::value::Value;

/// A heap block: a 64-bit [`Header`] followed by a tail of [`Value`]
/// slots.
///
/// Blocks are always manipulated through `NonNull<Block>`; the type is
/// never held by value. The leading `scan_fsize` slots hold child
/// references traced on drop, the remaining slots are opaque payload.
#[repr(C)]
pub struct Block {
    pub(crate) header: Header,
    fields: [Value; 0],
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block").field("header", &self.header).finish()
    }
}

/// Finalizer invoked on a raw block before its backing memory is
/// released.
///
/// Finalizers run post-order, left-to-right among siblings, and must not
/// fail.
pub type RawFree = unsafe fn(cptr: *mut (), b: NonNull<Block>, ctx: &mut Context);

/// Layout shared by every raw block variant: an opaque foreign pointer
/// with an optional finalizer in place of scannable slots.
#[repr(C)]
pub struct RawBlock {
    pub(crate) header: Header,
    pub(crate) free: Option<RawFree>,
    pub(crate) cptr: *mut (),
}

impl fmt::Debug for RawBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlock")
            .field("header", &self.header)
            .field("cptr", &self.cptr)
            .finish()
    }
}

#[inline]
pub(crate) unsafe fn header<'a>(b: NonNull<Block>) -> &'a Header {
    &(*b.as_ptr()).header
}

#[inline]
pub(crate) unsafe fn fields_ptr(b: NonNull<Block>) -> *mut Value {
    ptr::addr_of_mut!((*b.as_ptr()).fields).cast::<Value>()
}

/// The block's [`Tag`].
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_tag(b: NonNull<Block>) -> Tag {
    header(b).tag()
}

/// Whether this is the only reference to the block. Only unique blocks may
/// be mutated in place.
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_is_unique(b: NonNull<Block>) -> bool {
    header(b).rc() == 0
}

/// Whether the block has been promoted to thread-shared.
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_is_thread_shared(b: NonNull<Block>) -> bool {
    header(b).is_thread_shared()
}

/// Reads slot `i`.
///
/// # Safety
///
/// `b` must be a live block with more than `i` slots.
#[inline]
pub unsafe fn block_field(b: NonNull<Block>, i: usize) -> Value {
    fields_ptr(b).add(i).read()
}

/// Writes slot `i`. The previous value is overwritten without being
/// dropped.
///
/// # Safety
///
/// As [`block_field`]; additionally the block must not be shared yet.
#[inline]
pub unsafe fn block_set_field(b: NonNull<Block>, i: usize, v: Value) {
    fields_ptr(b).add(i).write(v)
}

/// Number of scannable leading slots, with the [`SCAN_FSIZE_MAX`]
/// extension decoded (the boxed count slot itself included).
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_scan_fsize(b: NonNull<Block>) -> usize {
    let sf = header(b).scan_fsize();
    if sf < SCAN_FSIZE_MAX {
        sf as usize
    } else {
        block_field(b, 0).as_int() as usize + 1
    }
}

/// Index of the first child slot: 1 when the scan count is boxed in slot
/// 0, else 0.
///
/// # Safety
///
/// `b` must be a live block.
#[inline]
pub unsafe fn block_scan_start(b: NonNull<Block>) -> usize {
    (header(b).scan_fsize() == SCAN_FSIZE_MAX) as usize
}

// Encode a scan count into the header byte; `true` when the count goes to
// slot 0 instead.
#[inline]
fn scan_encode(scan_fsize: usize) -> (u8, bool) {
    if scan_fsize < SCAN_FSIZE_MAX as usize {
        (scan_fsize as u8, false)
    } else {
        (SCAN_FSIZE_MAX, true)
    }
}

#[inline]
fn slots_for(scan_fsize: usize, field_count: usize) -> usize {
    if scan_fsize < SCAN_FSIZE_MAX as usize {
        field_count
    } else {
        // one extra leading slot for the boxed scan count
        match field_count.checked_add(1) {
            Some(slots) => slots,
            None => crate::abort(),
        }
    }
}

pub(crate) unsafe fn block_alloc_any(size: usize, tag: Tag, scan_fsize: u8, ctx: &mut Context) -> NonNull<Block> {
    debug_assert!(size >= mem::size_of::<Header>());
    ctx.allocated += 1;
    let b = heap::alloc_prefixed(size).cast::<Block>();
    ptr::addr_of_mut!((*b.as_ptr()).header).write(Header::new(tag, scan_fsize));
    b
}

unsafe fn block_init(b: NonNull<Block>, tag: Tag, scan_fsize: usize, slots: usize) {
    let (sf, extended) = scan_encode(scan_fsize);
    ptr::addr_of_mut!((*b.as_ptr()).header).write(Header::new(tag, sf));
    // Null the slots so a partially initialized block can still be
    // dropped.
    ptr::write_bytes(fields_ptr(b), 0, slots);
    if extended {
        block_set_field(b, 0, Value::from_int(scan_fsize as isize));
    }
}

/// Allocates a block with `field_count` slots, the first `scan_fsize` of
/// which are scanned on drop. The refcount starts unique and every slot
/// starts as [`Value::NULL`].
///
/// When `scan_fsize` does not fit the header byte, an extra leading slot
/// is allocated for the boxed count and the caller's slots live at
/// `1..=field_count` (see [`block_scan_start`]).
///
/// # Safety
///
/// `scan_fsize <= field_count`, and every scanned slot must hold a valid
/// [`Value`] whenever the block can be dropped.
pub unsafe fn block_alloc(tag: Tag, scan_fsize: usize, field_count: usize, ctx: &mut Context) -> NonNull<Block> {
    debug_assert!(scan_fsize <= field_count);
    debug_assert!(!tag.is_raw());
    let slots = slots_for(scan_fsize, field_count);
    let payload = match slots.checked_mul(mem::size_of::<Value>()) {
        Some(payload) => payload,
        None => crate::abort(),
    };
    let b = block_alloc_any(mem::size_of::<Header>() + payload, tag, 0, ctx);
    block_init(b, tag, scan_fsize, slots);
    b
}

/// Allocates a raw block wrapping `cptr`. `free`, when present, runs
/// before the block's memory is released.
///
/// # Safety
///
/// `tag` must classify as raw, and the finalizer must tolerate being
/// called with `cptr` exactly once.
pub unsafe fn block_alloc_raw(
    tag: Tag,
    cptr: *mut (),
    free: Option<RawFree>,
    ctx: &mut Context,
) -> NonNull<Block> {
    debug_assert!(tag.is_raw());
    let b = block_alloc_any(mem::size_of::<RawBlock>(), tag, 0, ctx);
    let raw = b.cast::<RawBlock>().as_ptr();
    ptr::addr_of_mut!((*raw).free).write(free);
    ptr::addr_of_mut!((*raw).cptr).write(cptr);
    b
}

// Run the finalizer of a raw block, if any.
pub(crate) unsafe fn block_free_raw(b: NonNull<Block>, ctx: &mut Context) {
    debug_assert!(header(b).tag().is_raw());
    let raw = b.cast::<RawBlock>().as_ptr();
    if let Some(free) = (*raw).free {
        free((*raw).cptr, b, ctx);
    }
}

/// Releases the block's backing memory. No children are visited and no
/// finalizer runs; the drop engine or the caller must have consumed them.
///
/// # Safety
///
/// `b` must be live with no remaining references.
#[inline]
pub unsafe fn block_free(b: NonNull<Block>, ctx: &mut Context) {
    ctx.freed += 1;
    heap::free_prefixed(b.cast::<u8>())
}

/// Token returned by [`block_drop_reuse`]: the storage of a block whose
/// refcount reached zero, handed back instead of being freed.
///
/// The header of the storage is zeroed, so the token is not a live block
/// and cannot be dereferenced as one; consume it with
/// [`block_alloc_reuse`]. A non-null token that is never consumed leaks
/// its storage.
///
/// [`block_drop_reuse`]: crate::block_drop_reuse
#[derive(Debug)]
pub struct Reuse {
    raw: *mut Block,
}

impl Reuse {
    /// The empty token.
    pub const NULL: Reuse = Reuse { raw: ptr::null_mut() };

    /// Whether the token carries no storage.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    #[inline]
    pub(crate) fn from_block(b: NonNull<Block>) -> Reuse {
        Reuse { raw: b.as_ptr() }
    }

    #[inline]
    fn take(self) -> Option<NonNull<Block>> {
        NonNull::new(self.raw)
    }
}

/// Like [`block_alloc`], but reinitializes the storage carried by `reuse`
/// when the token is non-null, skipping the allocator round trip.
///
/// # Safety
///
/// As [`block_alloc`]; additionally the reused storage must have belonged
/// to a block of at least `field_count` slots (one more when `scan_fsize`
/// needs the boxed-count extension).
pub unsafe fn block_alloc_reuse(
    reuse: Reuse,
    tag: Tag,
    scan_fsize: usize,
    field_count: usize,
    ctx: &mut Context,
) -> NonNull<Block> {
    debug_assert!(scan_fsize <= field_count);
    debug_assert!(!tag.is_raw());
    match reuse.take() {
        Some(b) => {
            debug_assert_eq!(header(b).rc(), 0);
            block_init(b, tag, scan_fsize, slots_for(scan_fsize, field_count));
            b
        }
        None => block_alloc(tag, scan_fsize, field_count, ctx),
    }
}
