//! String interner for efficient string storage and comparison.
//!
//! Every schema identifier and repeated literal is stored once; identical
//! strings share the same allocation, so identifier equality can be checked
//! by pointer equality. Uses `Arc<str>` so a fully compiled context can be
//! shared read-only between threads.

use std::collections::HashSet;
use std::sync::Arc;

/// An interned string - cheap to clone (just an Arc increment)
pub type IStr = Arc<str>;

/// String interner that deduplicates strings.
///
/// Interning a string returns an `Arc<str>` that can be cheaply cloned.
/// If the same string is interned multiple times, the same `Arc` is returned.
#[derive(Debug, Default, Clone)]
pub struct Interner {
    strings: HashSet<Arc<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning a cheap-to-clone reference.
    ///
    /// If the string was already interned, returns the existing `Arc`.
    /// Otherwise, creates a new `Arc` and stores it.
    pub fn intern(&mut self, s: &str) -> IStr {
        if let Some(existing) = self.strings.get(s) {
            Arc::clone(existing)
        } else {
            let arc: Arc<str> = Arc::from(s);
            self.strings.insert(Arc::clone(&arc));
            arc
        }
    }

    /// Intern an owned string, avoiding allocation if possible.
    pub fn intern_string(&mut self, s: String) -> IStr {
        if let Some(existing) = self.strings.get(s.as_str()) {
            Arc::clone(existing)
        } else {
            let arc: Arc<str> = Arc::from(s);
            self.strings.insert(Arc::clone(&arc));
            arc
        }
    }

    /// Get an interned string if it exists, without creating it.
    pub fn get(&self, s: &str) -> Option<IStr> {
        self.strings.get(s).cloned()
    }

    /// Number of unique strings interned.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if no strings have been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Drop entries that are only referenced by the interner itself.
    ///
    /// Handles held by callers keep their entries alive; everything else is
    /// released. Returns the number of entries removed.
    pub fn collect(&mut self) -> usize {
        let before = self.strings.len();
        self.strings.retain(|s| Arc::strong_count(s) > 1);
        before - self.strings.len()
    }

    /// Clear all interned strings.
    pub fn clear(&mut self) {
        self.strings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_same_arc() {
        let mut interner = Interner::new();
        let a = interner.intern("leaf");
        let b = interner.intern("leaf");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_intern_different_strings() {
        let mut interner = Interner::new();
        let a = interner.intern("container");
        let b = interner.intern("leaf-list");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(&*a, "container");
        assert_eq!(&*b, "leaf-list");
    }

    #[test]
    fn test_clone_is_cheap() {
        let mut interner = Interner::new();
        let a = interner.intern("test");
        let b = a.clone(); // Just increments ref count
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(Arc::strong_count(&a), 3); // interner + a + b
    }

    #[test]
    fn test_get_existing() {
        let mut interner = Interner::new();
        interner.intern("exists");
        assert!(interner.get("exists").is_some());
        assert!(interner.get("missing").is_none());
    }

    #[test]
    fn test_collect_drops_unreferenced() {
        let mut interner = Interner::new();
        let keep = interner.intern("keep");
        interner.intern("drop");
        assert_eq!(interner.collect(), 1);
        assert_eq!(interner.len(), 1);
        assert!(interner.get("keep").is_some());
        drop(keep);
    }
}
