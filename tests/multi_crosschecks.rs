use packed_btree::{BTreeMultiMap, BTreeMultiSet, Less};
use proptest::prelude::*;

mod common;
use common::*;

type NarrowMultiSet<T> = BTreeMultiSet<T, Less<T>, 1>;
type NarrowMultiMap<K, V> = BTreeMultiMap<K, V, Less<K>, 1>;

// Reference model: a vector kept sorted by key with insertion-stable order
// (new entries go after their equal keys).
#[derive(Clone, Default)]
struct Model<V> {
    entries: Vec<(u16, V)>,
}

impl<V: Clone> Model<V> {
    fn insert(&mut self, k: u16, v: V) {
        let at = self.entries.partition_point(|e| e.0 <= k);
        self.entries.insert(at, (k, v));
    }

    fn count(&self, k: u16) -> usize {
        self.entries.iter().filter(|e| e.0 == k).count()
    }

    fn remove_all(&mut self, k: u16) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.0 != k);
        before - self.entries.len()
    }
}

fn check_multiset_insert(u: U16Seq) {
    let mut ms: BTreeMultiSet<u16> = BTreeMultiSet::new();
    let mut narrow = NarrowMultiSet::new();
    let mut model = Model::default();

    for x in u {
        ms.insert(x);
        narrow.insert(x);
        model.insert(x, ());
    }

    ms.verify();
    narrow.verify();
    assert_eq_all!(model.entries.len(), ms.len(), narrow.len());
    assert_eq_iters(ms.iter(), model.entries.iter().map(|e| &e.0));
    assert_eq_iters(narrow.iter(), model.entries.iter().map(|e| &e.0));
}

fn check_multiset_count_remove(u: U16Seq, tgts: U16Seq) {
    let mut narrow = NarrowMultiSet::new();
    let mut model = Model::default();
    for x in u {
        narrow.insert(x);
        model.insert(x, ());
    }

    for t in tgts {
        assert_eq!(narrow.count(&t), model.count(t));
        assert_eq!(narrow.remove_all(&t), model.remove_all(t));
        narrow.verify();
    }
    assert_eq_iters(narrow.iter(), model.entries.iter().map(|e| &e.0));
}

// Equal keys must surface their values oldest-first: multi insertion goes
// through the upper bound.
fn check_multimap_fifo(pairs: SmallIntPairs) {
    let mut mm = NarrowMultiMap::new();
    let mut model = Model::default();

    for (i, (k, _)) in pairs.iter().enumerate() {
        mm.insert(*k, i as u32);
        model.insert(*k, i as u32);
    }

    mm.verify();
    assert_eq_iters(
        mm.iter().map(|(k, v)| (*k, *v)),
        model.entries.iter().map(|(k, v)| (*k, *v)),
    );

    for k in 0..64u16 {
        assert_eq!(mm.count(&k), model.count(k));
        let got: Vec<u32> = mm.get_all(&k).copied().collect();
        let want: Vec<u32> = model
            .entries
            .iter()
            .filter(|e| e.0 == k)
            .map(|e| e.1)
            .collect();
        assert_eq!(got, want);
    }
}

fn check_multimap_remove(pairs: SmallIntPairs, tgts: U16Seq) {
    let mut mm = NarrowMultiMap::new();
    let mut model = Model::default();
    for (k, v) in pairs {
        mm.insert(k, v);
        model.insert(k, v);
    }

    for t in tgts {
        assert_eq!(mm.remove_all(&t), model.remove_all(t));
    }
    mm.verify();
    assert_eq_iters(
        mm.iter().map(|(k, v)| (*k, *v)),
        model.entries.iter().map(|(k, v)| (*k, *v)),
    );
}

#[test]
fn test_equal_range_spans_duplicates() {
    let mut ms = NarrowMultiSet::new();
    for x in [5u16, 3, 5, 7, 3] {
        ms.insert(x);
    }

    assert_eq!(ms.count(&5), 2);
    assert_eq!(ms.count(&3), 2);
    assert_eq!(ms.count(&7), 1);
    assert_eq!(ms.equal_range(&5).count(), 2);
    assert!(ms.equal_range(&5).all(|v| *v == 5));

    assert_eq!(ms.remove_all(&5), 2);
    let left: Vec<u16> = ms.iter().copied().collect();
    assert_eq!(left, vec![3, 3, 7]);
}

#[test]
fn test_multimap_get_is_first_inserted() {
    let mut mm = NarrowMultiMap::new();
    mm.insert(1u16, "a");
    mm.insert(1, "b");
    mm.insert(0, "z");
    assert_eq!(mm.get(&1), Some(&"a"));
    assert_eq!(mm.count(&1), 2);
    assert_eq!(mm.get(&2), None);
}

#[test]
fn test_multiset_clone_eq() {
    let ms: NarrowMultiSet<u16> = [1u16, 1, 2, 2, 2, 9].into_iter().collect();
    let other = ms.clone();
    other.verify();
    assert!(ms == other);
    assert_eq!(other.len(), 6);
}

#[test]
fn test_multiset_pop_both_ends() {
    let mut ms: NarrowMultiSet<u16> = [4u16, 4, 1, 9].into_iter().collect();
    assert_eq!(ms.pop_first(), Some(1));
    assert_eq!(ms.pop_last(), Some(9));
    assert_eq!(ms.pop_first(), Some(4));
    assert_eq!(ms.pop_first(), Some(4));
    assert_eq!(ms.pop_first(), None);
    ms.verify();
}

proptest! {
    #[test]
    fn test_multiset_insert(u in u16_seq()) {
        check_multiset_insert(u);
    }

    #[test]
    fn test_multiset_count_remove(u in u16_seq(), tgts in u16_seq()) {
        check_multiset_count_remove(u, tgts);
    }

    #[test]
    fn test_multimap_fifo(pairs in small_int_pairs()) {
        check_multimap_fifo(pairs);
    }

    #[test]
    fn test_multimap_remove(pairs in small_int_pairs(), tgts in u16_seq()) {
        check_multimap_remove(pairs, tgts);
    }
}
