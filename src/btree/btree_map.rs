use std::fmt;
use std::iter::FusedIterator;

use super::compare::{Comparator, Less};
use super::core::{self, Tree};
use super::DEFAULT_TARGET_NODE_SIZE;

/// An ordered map backed by a B-tree of values.
///
/// `TARGET` is the byte budget for a single node (default 256); the number
/// of entries per node is derived from it and the entry size.  `C` orders
/// the keys; the default compares with `Ord`.
pub struct BTreeMap<K, V, C = Less<K>, const TARGET: usize = DEFAULT_TARGET_NODE_SIZE> {
    tree: Tree<K, V, C, TARGET>,
}

impl<K, V, C, const TARGET: usize> BTreeMap<K, V, C, TARGET> {
    /// Entries a full node holds.
    pub const NODE_VALUES: usize = Tree::<K, V, C, TARGET>::NODE_VALUES;

    pub fn new() -> Self
    where
        C: Default,
    {
        Self::with_comparator(C::default())
    }

    pub fn with_comparator(comp: C) -> Self {
        Self {
            tree: Tree::with_comparator(comp),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn max_size(&self) -> usize {
        usize::MAX
    }

    /// Destroys every entry and releases all node storage.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// O(1); trades the entire contents of the two maps.
    pub fn swap(&mut self, other: &mut Self) {
        self.tree.swap(&mut other.tree);
    }

    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next()
    }

    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.iter().next_back()
    }

    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first()
    }

    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last()
    }

    /// Iterates entries in key order.
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + FusedIterator {
        self.tree.iter().map(|e| (&e.0, &e.1))
    }

    /// Iterates in key order with mutable access to the values.
    pub fn iter_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = (&K, &mut V)> + ExactSizeIterator + FusedIterator {
        self.tree.iter_mut()
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + ExactSizeIterator + FusedIterator {
        self.tree.iter().map(|e| &e.0)
    }

    pub fn values(
        &self,
    ) -> impl DoubleEndedIterator<Item = &V> + ExactSizeIterator + FusedIterator {
        self.tree.iter().map(|e| &e.1)
    }

    // introspection

    /// Height of the tree; an empty map has height 0.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    pub fn nodes(&self) -> usize {
        self.tree.nodes()
    }

    pub fn leaf_nodes(&self) -> usize {
        self.tree.leaf_nodes()
    }

    pub fn internal_nodes(&self) -> usize {
        self.tree.internal_nodes()
    }

    /// Total bytes behind this map, including the undersized single-leaf
    /// root when there is one.
    pub fn bytes_used(&self) -> usize {
        self.tree.bytes_used()
    }

    pub fn average_bytes_per_value() -> f64 {
        Tree::<K, V, C, TARGET>::average_bytes_per_value()
    }

    /// Stored entries over entries the current nodes could hold.
    pub fn fullness(&self) -> f64 {
        self.tree.fullness()
    }

    /// Structural bytes per stored entry.
    pub fn overhead(&self) -> f64 {
        self.tree.overhead()
    }

    /// Writes one key per line, indented by depth, left subtree first.
    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result
    where
        K: fmt::Display,
    {
        self.tree.dump(w)
    }
}

impl<K, V, C: Comparator<K>, const TARGET: usize> BTreeMap<K, V, C, TARGET> {
    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.find_unique(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let cur = self.tree.find_unique(key)?;
        Some(&self.tree.entry_at(cur).1)
    }

    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let cur = self.tree.find_unique(key)?;
        let e = self.tree.entry_at(cur);
        Some((&e.0, &e.1))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let cur = self.tree.find_unique(key)?;
        Some(&mut self.tree.entry_at_mut(cur).1)
    }

    /// Inserts, returning the previous value when the key was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut value = Some(value);
        let (cur, inserted) = self.tree.insert_unique(key, |k| (k, value.take().unwrap()));
        if inserted {
            None
        } else {
            let old = std::mem::replace(&mut self.tree.entry_at_mut(cur).1, value.take().unwrap());
            Some(old)
        }
    }

    /// The value for key, inserting `make()` first if absent.  `make` runs
    /// only when the key is missing.
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, key: K, make: F) -> &mut V {
        let (cur, _) = self.tree.insert_unique(key, |k| (k, make()));
        &mut self.tree.entry_at_mut(cur).1
    }

    /// The value for key, inserting the default first if absent.  The
    /// default is not constructed when the key exists.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.tree.erase_unique(key).map(|e| e.1)
    }

    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        self.tree.erase_unique(key)
    }

    /// Entries from the first key not less than `key` onward.
    pub fn lower_bound(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        self.tree
            .range(self.tree.lower_bound(key), self.tree.end())
            .map(|e| (&e.0, &e.1))
    }

    /// Entries from the first key greater than `key` onward.
    pub fn upper_bound(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        self.tree
            .range(self.tree.upper_bound(key), self.tree.end())
            .map(|e| (&e.0, &e.1))
    }

    /// The entries whose keys compare equal to `key` (at most one here).
    pub fn equal_range(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        let (b, e) = self.tree.equal_range(key);
        self.tree.range(b, e).map(|e| (&e.0, &e.1))
    }

    /// Panics if any structural invariant is broken.
    pub fn verify(&self) {
        self.tree.verify();
    }
}

impl<K, V, C: Default, const TARGET: usize> Default for BTreeMap<K, V, C, TARGET> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, const TARGET: usize> Clone for BTreeMap<K, V, C, TARGET>
where
    K: Clone,
    V: Clone,
    C: Comparator<K> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K, V, C, const TARGET: usize> fmt::Debug for BTreeMap<K, V, C, TARGET>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C, const TARGET: usize> PartialEq for BTreeMap<K, V, C, TARGET>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K, V, C, const TARGET: usize> Eq for BTreeMap<K, V, C, TARGET>
where
    K: Eq,
    V: Eq,
{
}

impl<K, V, C: Comparator<K>, const TARGET: usize> Extend<(K, V)> for BTreeMap<K, V, C, TARGET> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        // sorted input lands through the end-of-tree fast path; a repeated
        // key keeps its entry and takes the new value
        for (k, v) in iter {
            let end = self.tree.end();
            let mut v = Some(v);
            let (cur, inserted) = self.tree.insert_unique_hint(end, k, |k| (k, v.take().unwrap()));
            if !inserted {
                self.tree.entry_at_mut(cur).1 = v.take().unwrap();
            }
        }
    }
}

impl<K, V, C, const TARGET: usize> FromIterator<(K, V)> for BTreeMap<K, V, C, TARGET>
where
    C: Comparator<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::new();
        m.extend(iter);
        m
    }
}

/// Owning iterator; drains the map in key order.
pub struct IntoIter<K, V, C, const TARGET: usize>(core::IntoIter<K, V, C, TARGET>);

impl<K, V, C, const TARGET: usize> Iterator for IntoIter<K, V, C, TARGET> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V, C, const TARGET: usize> DoubleEndedIterator for IntoIter<K, V, C, TARGET> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back()
    }
}

impl<K, V, C, const TARGET: usize> ExactSizeIterator for IntoIter<K, V, C, TARGET> {}
impl<K, V, C, const TARGET: usize> FusedIterator for IntoIter<K, V, C, TARGET> {}

impl<K, V, C, const TARGET: usize> IntoIterator for BTreeMap<K, V, C, TARGET> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, C, TARGET>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(core::IntoIter::new(self.tree))
    }
}
