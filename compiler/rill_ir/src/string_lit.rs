//! Interned string literal payloads.
//!
//! Unlike identifiers, string literals are identity-keyed: every insert gets
//! its own handle even when the bytes repeat. Escape processing happens in
//! the lexer, so the stored payload is the final runtime text.

use std::fmt;

crate::define_index!(
    /// Handle to a stored string literal payload.
    StringLit
);

/// Append-only store for string literal payloads.
#[derive(Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct StringLitStore {
    payloads: Vec<String>,
}

impl StringLitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload, returning its handle.
    pub fn insert(&mut self, payload: String) -> StringLit {
        let raw = crate::to_u32(self.payloads.len(), "string literals");
        self.payloads.push(payload);
        StringLit::new(raw)
    }

    /// Borrow the payload for a handle. O(1).
    ///
    /// # Panics
    /// Panics if `lit` did not come from this store.
    #[inline]
    pub fn text(&self, lit: StringLit) -> &str {
        &self.payloads[lit.index()]
    }

    /// Number of stored payloads.
    #[inline]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Whether the store is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Produce a compact byte image of the store.
    #[cfg(feature = "cache")]
    pub fn to_image(&self) -> Vec<u8> {
        match bincode::serialize(self) {
            Ok(bytes) => bytes,
            Err(e) => panic!("string literal store serialization failed: {e}"),
        }
    }

    /// Rebuild a store from a byte image produced by [`StringLitStore::to_image`].
    #[cfg(feature = "cache")]
    pub fn from_image(bytes: &[u8]) -> Option<Self> {
        bincode::deserialize(bytes).ok()
    }
}

impl fmt::Debug for StringLitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringLitStore({} literals)", self.payloads.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_are_identity_keyed() {
        let mut store = StringLitStore::new();
        let a = store.insert("hello".to_owned());
        let b = store.insert("hello".to_owned());
        assert_ne!(a, b);
        assert_eq!(store.text(a), "hello");
        assert_eq!(store.text(b), "hello");
        assert_eq!(store.len(), 2);
    }
}
