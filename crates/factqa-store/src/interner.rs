//! Names as dense ids. Entity names, predicate names and attribute values
//! share one id space so entity bitmaps and predicate indexes can key on `u32`.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Ids are handed out densely from 0 in first-seen order; `names[id]` is the
/// name behind `id`.
#[derive(Debug, Default, Clone)]
pub struct StringInterner {
    ids: AHashMap<String, StrId>,
    names: Vec<String>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> StrId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        // More than u32::MAX distinct names does not fit a roaring bitmap anyway.
        let id = StrId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Existing id for `name`, without inserting.
    pub fn id_of(&self, name: &str) -> Option<StrId> {
        self.ids.get(name).copied()
    }

    pub fn resolve(&self, id: StrId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut interner = StringInterner::new();
        let a = interner.intern("ana");
        let b = interner.intern("bob");
        assert_eq!((a.raw(), b.raw()), (0, 1));
        assert_eq!(interner.intern("ana"), a);
        assert_eq!(interner.resolve(b), Some("bob"));
        assert_eq!(interner.resolve(StrId::new(7)), None);
        assert_eq!(interner.id_of("cleo"), None);
        assert_eq!(interner.len(), 2);
    }
}
