//! Atomic types backing the refcount word.
//!
//! With the `extra-platforms` feature the atomics come from
//! `portable-atomic`, which supports targets without native atomic CAS.
//! Both implementations guarantee the same in-memory representation as the
//! underlying integer, which the bit-exact block header relies on.

#[cfg(not(feature = "extra-platforms"))]
pub(crate) use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

#[cfg(feature = "extra-platforms")]
pub(crate) use extra_platforms::{AtomicU32, AtomicU8, Ordering};
