//! Indexed lookup of objects by classification.
//!
//! `CategoricalIndex` maps a key (a class tag, a definition, an ownership
//! pair, a flag) to the set of live objects carrying that classification.
//! "All objects of kind K" becomes a bucket lookup instead of a scan over
//! every object on the map.
//!
//! Members are non-owning handles. The index never infers that an object
//! has gone away: the host removes it with an explicit event.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;

/// Builds the empty bucket for a key the first time it is touched.
pub type BucketInit<K, M> = Box<dyn Fn(&K) -> IndexSet<M>>;

/// Map from classification key to member set.
pub struct CategoricalIndex<K, M> {
    buckets: HashMap<K, IndexSet<M>>,
    init: BucketInit<K, M>,
    empty: IndexSet<M>,
}

impl<K, M> CategoricalIndex<K, M>
where
    K: Eq + Hash + Clone,
    M: Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self::with_initializer(|_| IndexSet::new())
    }

    /// Use `init` to create missing buckets, e.g. to presize buckets for
    /// broad keys that are expected to hold many members.
    pub fn with_initializer(init: impl Fn(&K) -> IndexSet<M> + 'static) -> Self {
        Self {
            buckets: HashMap::new(),
            init: Box::new(init),
            empty: IndexSet::new(),
        }
    }

    /// Bucket for `key`, created empty if missing.
    pub fn get_or_create(&mut self, key: K) -> &IndexSet<M> {
        let init = &self.init;
        self.buckets.entry(key).or_insert_with_key(|k| init(k))
    }

    /// Bucket for `key` without creating it. Missing keys read as empty.
    pub fn get(&self, key: &K) -> &IndexSet<M> {
        self.buckets.get(key).unwrap_or(&self.empty)
    }

    /// Returns `false` if `member` was already present.
    pub fn add(&mut self, key: K, member: M) -> bool {
        let init = &self.init;
        self.buckets
            .entry(key)
            .or_insert_with_key(|k| init(k))
            .insert(member)
    }

    /// Removing a non-member is a no-op and returns `false`.
    pub fn remove(&mut self, key: &K, member: &M) -> bool {
        match self.buckets.get_mut(key) {
            Some(bucket) => bucket.shift_remove(member),
            None => false,
        }
    }

    pub fn contains(&self, key: &K, member: &M) -> bool {
        self.buckets.get(key).is_some_and(|b| b.contains(member))
    }

    /// Register `member` under every key in `keys`.
    pub fn add_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>, member: M)
    where
        K: 'a,
    {
        for key in keys {
            self.add(key.clone(), member);
        }
    }

    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a K>, member: &M)
    where
        K: 'a,
    {
        for key in keys {
            self.remove(key, member);
        }
    }

    /// Move `member` from bucket `from` to bucket `to`. Both buckets are
    /// updated inside this call, so no caller can observe the member in
    /// neither or both. Returns `false` if it was not in `from`; it is
    /// still added to `to`.
    pub fn move_member(&mut self, from: &K, to: K, member: M) -> bool {
        let was_present = self.remove(from, &member);
        self.add(to, member);
        was_present
    }

    /// Number of non-empty buckets.
    pub fn key_count(&self) -> usize {
        self.buckets.values().filter(|b| !b.is_empty()).count()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl<K, M> Default for CategoricalIndex<K, M>
where
    K: Eq + Hash + Clone,
    M: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, M: fmt::Debug> fmt::Debug for CategoricalIndex<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoricalIndex")
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::ClassTag;

    #[test]
    fn test_get_or_create_makes_empty_bucket() {
        let mut index: CategoricalIndex<&str, u32> = CategoricalIndex::new();
        assert!(index.get_or_create("walls").is_empty());
        assert_eq!(index.key_count(), 0, "empty buckets are not counted");
    }

    #[test]
    fn test_add_and_lookup() {
        let mut index = CategoricalIndex::new();
        assert!(index.add(ClassTag::Building, 1u64));
        assert!(index.add(ClassTag::Building, 2));
        assert!(!index.add(ClassTag::Building, 1), "duplicate add reports false");
        assert_eq!(index.get(&ClassTag::Building).len(), 2);
        assert!(index.contains(&ClassTag::Building, &2));
        assert!(index.get(&ClassTag::Item).is_empty());
    }

    #[test]
    fn test_remove_non_member_is_noop() {
        let mut index: CategoricalIndex<bool, u64> = CategoricalIndex::new();
        assert!(!index.remove(&true, &7), "missing bucket");
        index.add(true, 1);
        assert!(!index.remove(&true, &7), "missing member");
        assert_eq!(index.get(&true).len(), 1);
    }

    #[test]
    fn test_remove_keeps_other_members() {
        let mut index = CategoricalIndex::new();
        for m in 0..5u64 {
            index.add("k", m);
        }
        index.remove(&"k", &2);
        let members: Vec<u64> = index.get(&"k").iter().copied().collect();
        assert_eq!(members, vec![0, 1, 3, 4], "insertion order survives removal");
    }

    #[test]
    fn test_add_all_registers_ancestors() {
        let mut index = CategoricalIndex::new();
        let tags = ClassTag::Storage.with_ancestors();
        index.add_all(&tags, 10u64);
        assert!(index.contains(&ClassTag::Storage, &10));
        assert!(index.contains(&ClassTag::Building, &10));
        assert!(index.contains(&ClassTag::Thing, &10));
        assert!(!index.contains(&ClassTag::Item, &10));

        index.remove_all(&tags, &10);
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn test_move_member() {
        let mut index = CategoricalIndex::new();
        index.add((1u32, ClassTag::Building), 5u64);
        assert!(index.move_member(&(1, ClassTag::Building), (2, ClassTag::Building), 5));
        assert!(!index.contains(&(1, ClassTag::Building), &5));
        assert!(index.contains(&(2, ClassTag::Building), &5));
    }

    #[test]
    fn test_initializer_is_used() {
        let mut index: CategoricalIndex<u32, u64> =
            CategoricalIndex::with_initializer(|k| IndexSet::with_capacity(*k as usize));
        assert!(index.get_or_create(64).capacity() >= 64);
    }
}
