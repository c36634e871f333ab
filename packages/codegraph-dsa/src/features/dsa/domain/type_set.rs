//! Per-offset type tags
//!
//! `TypeSet` is a persistent set: clones share one tree, `insert` copies
//! only the path to the new tag, and `union` hands back an existing set
//! whenever one side already contains the other. Repeated re-insertion of
//! known types never allocates.

use im::OrdSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Interned type name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(Arc<str>);

impl TypeTag {
    pub fn new(name: &str) -> Self {
        TypeTag(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        TypeTag::new(name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable set of type tags, backed by a persistent ordered set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(OrdSet<TypeTag>);

impl TypeSet {
    /// Empty set
    pub fn empty() -> Self {
        TypeSet(OrdSet::new())
    }

    /// Singleton set
    pub fn single(tag: TypeTag) -> Self {
        TypeSet(OrdSet::unit(tag))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeTag> {
        self.0.iter()
    }

    /// Whether every tag of `self` is in `other`
    pub fn is_subset(&self, other: &TypeSet) -> bool {
        self.0.ptr_eq(&other.0) || self.0.is_subset(&other.0)
    }

    /// Set with `tag` added; the same set when `tag` is already present
    pub fn insert(&self, tag: TypeTag) -> TypeSet {
        if self.contains(&tag) {
            return self.clone();
        }
        TypeSet(self.0.update(tag))
    }

    /// Union; the containing side itself when one side contains the other
    pub fn union(&self, other: &TypeSet) -> TypeSet {
        if other.is_subset(self) {
            return self.clone();
        }
        if self.is_subset(other) {
            return other.clone();
        }
        TypeSet(self.0.clone().union(other.0.clone()))
    }

    /// Whether both sets are one shared tree
    pub fn shares_storage_with(&self, other: &TypeSet) -> bool {
        !self.is_empty() && self.0.ptr_eq(&other.0)
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|t| t.as_str()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_existing_shares_storage() {
        let a = TypeSet::single(TypeTag::new("i32"));
        let b = a.insert(TypeTag::new("i32"));
        assert!(a.shares_storage_with(&b));

        let c = a.insert(TypeTag::new("i8*"));
        assert!(!a.shares_storage_with(&c));
        assert_eq!(c.len(), 2);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_union_reuses_superset() {
        let small = TypeSet::single(TypeTag::new("i32"));
        let big = small.insert(TypeTag::new("i64"));

        assert!(big.union(&small).shares_storage_with(&big));
        assert!(small.union(&big).shares_storage_with(&big));
        assert!(TypeSet::empty().union(&big).shares_storage_with(&big));
    }

    #[test]
    fn test_union_of_disjoint_sets() {
        let a = TypeSet::single(TypeTag::new("a"));
        let b = TypeSet::single(TypeTag::new("b"));
        let u = a.union(&b);
        assert_eq!(u.to_string(), "{a,b}");
        assert!(a.is_subset(&u) && b.is_subset(&u));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_growing_set_keeps_earlier_versions() {
        let mut versions = vec![TypeSet::empty()];
        for i in 0..64 {
            let next = versions[i].insert(TypeTag::new(&format!("t{i}")));
            versions.push(next);
        }
        for (i, set) in versions.iter().enumerate() {
            assert_eq!(set.len(), i);
        }
        let last = &versions[64];
        assert!(versions[10].is_subset(last));
        assert!(last.union(&versions[10]).shares_storage_with(last));
    }
}
