use packed_btree::{BTreeMap, Less};
use proptest::prelude::*;
use std::collections::BTreeMap as StdMap;

mod common;
use common::*;

type NarrowMap<K, V> = BTreeMap<K, V, Less<K>, 1>;

#[derive(Clone)]
struct Maps<K: Ord, V> {
    btree_map: BTreeMap<K, V>,
    narrow_map: NarrowMap<K, V>,
    std_map: StdMap<K, V>,
}

impl<K, V> Maps<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn new(v: Vec<(K, V)>) -> Maps<K, V> {
        Maps {
            btree_map: BTreeMap::from_iter(v.clone()),
            narrow_map: NarrowMap::from_iter(v.clone()),
            std_map: StdMap::from_iter(v),
        }
    }

    fn insert(&mut self, k: K, v: V)
    where
        V: Eq + std::fmt::Debug,
    {
        assert_eq_all!(
            self.std_map.insert(k.clone(), v.clone()),
            self.btree_map.insert(k.clone(), v.clone()),
            self.narrow_map.insert(k, v),
        );
    }

    fn remove(&mut self, k: &K)
    where
        V: Eq + std::fmt::Debug,
    {
        assert_eq_all!(
            self.std_map.remove(k),
            self.btree_map.remove(k),
            self.narrow_map.remove(k),
        );
    }

    fn chk(&self)
    where
        K: Eq + std::fmt::Debug,
        V: Eq + std::fmt::Debug,
    {
        self.btree_map.verify();
        self.narrow_map.verify();

        assert_eq_all!(self.std_map.len(), self.btree_map.len(), self.narrow_map.len());

        assert_eq_iters(self.btree_map.iter(), self.std_map.iter());
        assert_eq_iters(self.narrow_map.iter(), self.std_map.iter());
    }
}

fn check_insert(elems: SmallIntPairs) {
    // insert replaces: the last value for a duplicated key must win in all
    // three maps
    let mut maps = Maps::new(Vec::new());
    for (k, v) in elems {
        maps.insert(k, v);
    }
    maps.chk();
}

fn check_get(elems: SmallIntPairs, tgts: U16Seq) {
    let maps = Maps::new(elems);
    for t in tgts {
        assert_eq_all!(
            maps.std_map.get(&t),
            maps.btree_map.get(&t),
            maps.narrow_map.get(&t),
        );
        assert_eq_all!(
            maps.std_map.get_key_value(&t),
            maps.btree_map.get_key_value(&t),
            maps.narrow_map.get_key_value(&t),
        );
        assert_eq_all!(
            maps.std_map.contains_key(&t),
            maps.btree_map.contains_key(&t),
            maps.narrow_map.contains_key(&t),
        );
    }
}

fn check_remove(elems: SmallIntPairs, tgts: U16Seq) {
    let mut maps = Maps::new(elems);
    for t in tgts {
        maps.remove(&t);
    }
    maps.chk();
}

fn check_get_mut(elems: SmallIntPairs, tgts: U16Seq) {
    let mut maps = Maps::new(elems);
    for t in tgts {
        if let Some(v) = maps.std_map.get_mut(&t) {
            *v ^= 0xff;
        }
        if let Some(v) = maps.btree_map.get_mut(&t) {
            *v ^= 0xff;
        }
        if let Some(v) = maps.narrow_map.get_mut(&t) {
            *v ^= 0xff;
        }
    }
    maps.chk();
}

fn check_iter_mut(elems: SmallIntPairs) {
    let mut maps = Maps::new(elems);

    for (_, v) in maps.std_map.iter_mut() {
        *v = v.wrapping_add(7);
    }
    for (_, v) in maps.btree_map.iter_mut() {
        *v = v.wrapping_add(7);
    }
    for (_, v) in maps.narrow_map.iter_mut() {
        *v = v.wrapping_add(7);
    }

    maps.chk();
}

fn check_keys_values(elems: SmallIntPairs) {
    let maps = Maps::new(elems);
    assert_eq_iters(maps.btree_map.keys(), maps.std_map.keys());
    assert_eq_iters(maps.narrow_map.keys(), maps.std_map.keys());
    assert_eq_iters(maps.btree_map.values(), maps.std_map.values());
    assert_eq_iters(maps.narrow_map.values().rev(), maps.std_map.values().rev());
}

fn check_into_iter(elems: SmallIntPairs) {
    let maps = Maps::new(elems);
    let want: Vec<(u16, u16)> = maps.std_map.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq_iters(maps.btree_map.clone().into_iter(), want.clone().into_iter());
    assert_eq_iters(maps.narrow_map.clone().into_iter(), want.into_iter());
}

fn check_strings(elems: Vec<(String, u16)>) {
    let mut narrow = NarrowMap::new();
    let mut std_map = StdMap::new();
    for (k, v) in elems {
        assert_eq!(narrow.insert(k.clone(), v), std_map.insert(k, v));
    }
    narrow.verify();
    assert_eq_iters(narrow.iter(), std_map.iter());
}

#[test]
fn test_lazy_default_not_built_for_present_key() {
    let mut m: NarrowMap<u16, u16> = NarrowMap::new();
    m.insert(1, 10);

    let v = m.get_or_insert_with(1, || panic!("value built for a present key"));
    assert_eq!(*v, 10);

    // and the absent case does build
    assert_eq!(*m.get_or_insert_with(2, || 20), 20);
    assert_eq!(*m.get_or_insert_default(3), 0);
    assert_eq!(m.len(), 3);
}

#[test]
fn test_remove_entry() {
    let mut m: NarrowMap<u16, u16> = (0..50).map(|i| (i, i * 2)).collect();
    assert_eq!(m.remove_entry(&7), Some((7, 14)));
    assert_eq!(m.remove_entry(&7), None);
    m.verify();
}

#[test]
fn test_equal_range_unique() {
    let m: NarrowMap<u16, u16> = (0..50).map(|i| (i, i)).collect();
    let hits: Vec<(&u16, &u16)> = m.equal_range(&20).collect();
    assert_eq!(hits, vec![(&20, &20)]);
    assert_eq!(m.equal_range(&100).count(), 0);
}

#[test]
fn test_extend_sorted_replaces_duplicates() {
    // sorted batches ride the end-of-tree hint; overlapping keys still
    // take the newest value
    let mut m: NarrowMap<u16, u16> = NarrowMap::new();
    m.extend((0..100).map(|k| (k, 1)));
    m.extend((50..150).map(|k| (k, 2)));
    m.verify();
    assert_eq!(m.len(), 150);
    assert_eq!(m.get(&10), Some(&1));
    assert_eq!(m.get(&60), Some(&2));
    assert_eq!(m.get(&149), Some(&2));
}

#[test]
fn test_insert_regr_replaces_value() {
    let mut maps = Maps::new(vec![(1u16, 1u16)]);
    maps.insert(1, 2);
    maps.chk();
    assert_eq!(maps.btree_map.get(&1), Some(&2));
}

proptest! {
    #[test]
    fn test_insert(elems in small_int_pairs()) {
        check_insert(elems);
    }

    #[test]
    fn test_get(elems in small_int_pairs(), tgts in u16_seq()) {
        check_get(elems, tgts);
    }

    #[test]
    fn test_remove(elems in small_int_pairs(), tgts in u16_seq()) {
        check_remove(elems, tgts);
    }

    #[test]
    fn test_get_mut(elems in small_int_pairs(), tgts in u16_seq()) {
        check_get_mut(elems, tgts);
    }

    #[test]
    fn test_iter_mut(elems in small_int_pairs()) {
        check_iter_mut(elems);
    }

    #[test]
    fn test_keys_values(elems in small_int_pairs()) {
        check_keys_values(elems);
    }

    #[test]
    fn test_into_iter(elems in small_int_pairs()) {
        check_into_iter(elems);
    }

    #[test]
    fn test_strings(elems in string_u16_pairs()) {
        check_strings(elems);
    }
}
