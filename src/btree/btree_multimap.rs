use std::fmt;
use std::iter::FusedIterator;

use super::compare::{Comparator, Less};
use super::core::{self, Tree};
use super::DEFAULT_TARGET_NODE_SIZE;

/// An ordered multimap: one key may map to many values, and entries with
/// equal keys iterate in insertion order.
pub struct BTreeMultiMap<K, V, C = Less<K>, const TARGET: usize = DEFAULT_TARGET_NODE_SIZE> {
    tree: Tree<K, V, C, TARGET>,
}

impl<K, V, C, const TARGET: usize> BTreeMultiMap<K, V, C, TARGET> {
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

    pub fn clear(&mut self) {
        self.tree.clear();
    }

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

    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + FusedIterator {
        self.tree.iter().map(|e| (&e.0, &e.1))
    }

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

    pub fn bytes_used(&self) -> usize {
        self.tree.bytes_used()
    }

    pub fn fullness(&self) -> f64 {
        self.tree.fullness()
    }

    pub fn overhead(&self) -> f64 {
        self.tree.overhead()
    }

    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result
    where
        K: fmt::Display,
    {
        self.tree.dump(w)
    }
}

impl<K, V, C: Comparator<K>, const TARGET: usize> BTreeMultiMap<K, V, C, TARGET> {
    pub fn contains_key(&self, key: &K) -> bool {
        self.tree.find_multi(key).is_some()
    }

    /// The value of the first entry with this key, if any.
    pub fn get(&self, key: &K) -> Option<&V> {
        let cur = self.tree.find_multi(key)?;
        Some(&self.tree.entry_at(cur).1)
    }

    /// How many entries carry this key.
    pub fn count(&self, key: &K) -> usize {
        self.tree.count_multi(key)
    }

    /// Always inserts; an equal key lands after its duplicates.
    pub fn insert(&mut self, key: K, value: V) {
        self.tree.insert_multi((key, value));
    }

    /// Removes every entry with this key, returning how many there were.
    pub fn remove_all(&mut self, key: &K) -> usize {
        self.tree.erase_multi(key)
    }

    /// The values stored under `key`, oldest first.
    pub fn get_all(&self, key: &K) -> impl DoubleEndedIterator<Item = &V> + FusedIterator {
        let (b, e) = self.tree.equal_range(key);
        self.tree.range(b, e).map(|e| &e.1)
    }

    pub fn lower_bound(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        self.tree
            .range(self.tree.lower_bound(key), self.tree.end())
            .map(|e| (&e.0, &e.1))
    }

    pub fn upper_bound(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        self.tree
            .range(self.tree.upper_bound(key), self.tree.end())
            .map(|e| (&e.0, &e.1))
    }

    /// All entries whose keys compare equal to `key`, oldest first.
    pub fn equal_range(
        &self,
        key: &K,
    ) -> impl DoubleEndedIterator<Item = (&K, &V)> + FusedIterator {
        let (b, e) = self.tree.equal_range(key);
        self.tree.range(b, e).map(|e| (&e.0, &e.1))
    }

    pub fn verify(&self) {
        self.tree.verify();
    }
}

impl<K, V, C: Default, const TARGET: usize> Default for BTreeMultiMap<K, V, C, TARGET> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C, const TARGET: usize> Clone for BTreeMultiMap<K, V, C, TARGET>
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

impl<K, V, C, const TARGET: usize> fmt::Debug for BTreeMultiMap<K, V, C, TARGET>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, C, const TARGET: usize> PartialEq for BTreeMultiMap<K, V, C, TARGET>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K, V, C, const TARGET: usize> Eq for BTreeMultiMap<K, V, C, TARGET>
where
    K: Eq,
    V: Eq,
{
}

impl<K, V, C: Comparator<K>, const TARGET: usize> Extend<(K, V)> for BTreeMultiMap<K, V, C, TARGET> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        // sorted input lands through the end-of-tree fast path
        for (k, v) in iter {
            let end = self.tree.end();
            self.tree.insert_multi_hint(end, (k, v));
        }
    }
}

impl<K, V, C, const TARGET: usize> FromIterator<(K, V)> for BTreeMultiMap<K, V, C, TARGET>
where
    C: Comparator<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::new();
        m.extend(iter);
        m
    }
}

/// Owning iterator; drains the multimap in key order.
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

impl<K, V, C, const TARGET: usize> IntoIterator for BTreeMultiMap<K, V, C, TARGET> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, C, TARGET>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter(core::IntoIter::new(self.tree))
    }
}
