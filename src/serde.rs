//! Serde support: [`Bytes`] serializes as a byte string.
//!
//! `Deserialize` is deliberately not implemented: constructing a `Bytes`
//! needs a `&mut Context`, which the serde traits cannot thread.
//! Deserialize into a `Vec<u8>` and rebuild with [`Bytes::from_slice`].
//!
//! [`Bytes::from_slice`]: crate::Bytes::from_slice

use serde::{Serialize, Serializer};

use crate::bytes::Bytes;

impl Serialize for Bytes {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.as_slice())
    }
}
