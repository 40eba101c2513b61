//! Interned identifiers and module handles.
//!
//! [`IdentStore`] deduplicates identifier text: interning equal text twice
//! returns equal [`Ident`] handles, so name comparison anywhere in the
//! pipeline is a `u32` equality. The store also records, for imported
//! identifiers, which module they came from.
//!
//! [`ModuleStore`] hands out [`ModuleId`]s keyed by `(name, package
//! shorthand)` pairs for import resolution.
//!
//! Both stores are append-only and owned by one `ModuleEnv`; there is no
//! deletion and no cross-thread sharing.

use rustc_hash::FxHashMap;
use std::fmt;

crate::define_index!(
    /// Handle to interned identifier text.
    ///
    /// Two identifiers with the same text always have equal handles.
    Ident
);

crate::define_index!(
    /// Handle to an imported module, resolved by `(name, shorthand)`.
    ModuleId
);

/// Deduplicating store for identifier text.
///
/// Interned text is leaked to get `'static` lifetime; the strings live as
/// long as the process, which is the lifetime interning assumes.
pub struct IdentStore {
    map: FxHashMap<&'static str, u32>,
    texts: Vec<&'static str>,
    /// Originating module for imported idents, parallel to `texts`.
    origins: Vec<Option<ModuleId>>,
}

impl IdentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        IdentStore {
            map: FxHashMap::default(),
            texts: Vec::with_capacity(64),
            origins: Vec::new(),
        }
    }

    /// Intern identifier text, returning its handle.
    ///
    /// Equal text returns an equal handle; at most one allocation happens per
    /// distinct text.
    pub fn intern(&mut self, text: &str) -> Ident {
        if let Some(&raw) = self.map.get(text) {
            return Ident::new(raw);
        }
        let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
        let raw = crate::to_u32(self.texts.len(), "identifiers");
        self.texts.push(leaked);
        self.origins.push(None);
        self.map.insert(leaked, raw);
        Ident::new(raw)
    }

    /// Look up the text for a handle. O(1).
    ///
    /// # Panics
    /// Panics if `ident` did not come from this store.
    #[inline]
    pub fn text(&self, ident: Ident) -> &str {
        self.texts[ident.index()]
    }

    /// Record that `ident` was introduced by an import from `module`.
    pub fn set_origin(&mut self, ident: Ident, module: ModuleId) {
        self.origins[ident.index()] = Some(module);
    }

    /// The originating module for an imported ident, if any.
    #[inline]
    pub fn origin(&self, ident: Ident) -> Option<ModuleId> {
        self.origins[ident.index()]
    }

    /// Number of distinct interned identifiers.
    #[inline]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether nothing has been interned yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Produce a compact byte image of the store.
    ///
    /// The image can be loaded back with [`IdentStore::from_image`]; handles
    /// remain valid across the round trip.
    #[cfg(feature = "cache")]
    pub fn to_image(&self) -> Vec<u8> {
        let image: (Vec<&str>, &Vec<Option<ModuleId>>) =
            (self.texts.iter().copied().collect(), &self.origins);
        match bincode::serialize(&image) {
            Ok(bytes) => bytes,
            Err(e) => panic!("ident store serialization failed: {e}"),
        }
    }

    /// Rebuild a store from a byte image produced by [`IdentStore::to_image`].
    ///
    /// Returns `None` if the image is malformed. Handles interned before the
    /// image was taken remain valid against the rebuilt store.
    #[cfg(feature = "cache")]
    pub fn from_image(bytes: &[u8]) -> Option<Self> {
        let (texts, origins): (Vec<String>, Vec<Option<ModuleId>>) =
            bincode::deserialize(bytes).ok()?;
        let mut store = IdentStore::new();
        for text in &texts {
            store.intern(text);
        }
        store.origins = origins;
        Some(store)
    }
}

impl Default for IdentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentStore({} idents)", self.texts.len())
    }
}

/// Key identifying a module: dotted name plus optional package shorthand.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct ModuleKey {
    name: String,
    shorthand: Option<String>,
}

/// Store handing out stable handles for imported modules.
#[derive(Default)]
pub struct ModuleStore {
    map: FxHashMap<ModuleKey, u32>,
    names: Vec<String>,
}

impl ModuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the handle for `(name, shorthand)`.
    pub fn get_or_insert(&mut self, name: &str, shorthand: Option<&str>) -> ModuleId {
        let key = ModuleKey {
            name: name.to_owned(),
            shorthand: shorthand.map(str::to_owned),
        };
        if let Some(&raw) = self.map.get(&key) {
            return ModuleId::new(raw);
        }
        let raw = crate::to_u32(self.names.len(), "modules");
        self.names.push(name.to_owned());
        self.map.insert(key, raw);
        ModuleId::new(raw)
    }

    /// Dotted module name for a handle.
    #[inline]
    pub fn name(&self, id: ModuleId) -> &str {
        &self.names[id.index()]
    }

    /// Number of known modules.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no modules are known.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for ModuleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleStore({} modules)", self.names.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_equal_handle() {
        let mut store = IdentStore::new();
        let a = store.intern("foo");
        let b = store.intern("bar");
        let c = store.intern("foo");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(store.text(a), "foo");
        assert_eq!(store.text(b), "bar");
    }

    #[test]
    fn origin_tracking() {
        let mut idents = IdentStore::new();
        let mut modules = ModuleStore::new();
        let decode = idents.intern("decode");
        assert_eq!(idents.origin(decode), None);

        let json = modules.get_or_insert("Json", Some("pf"));
        idents.set_origin(decode, json);
        assert_eq!(idents.origin(decode), Some(json));
        assert_eq!(modules.name(json), "Json");
    }

    #[test]
    fn module_keyed_by_name_and_shorthand() {
        let mut modules = ModuleStore::new();
        let a = modules.get_or_insert("Http", None);
        let b = modules.get_or_insert("Http", Some("cli"));
        let c = modules.get_or_insert("Http", None);
        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}
