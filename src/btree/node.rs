use std::cmp::Ordering;

use super::compare::{compare_keys, Comparator, UpperBoundAdapter, UpperBoundCompareToAdapter};
use super::fixed::FixedVec;

// Nodes are referenced by 32-bit indices into a per-tree arena.
pub(crate) type NodeId = u32;

pub(crate) const NIL: NodeId = u32::MAX;

// A node search returns the position in the low bits.  The three-way
// searches additionally set EXACT_MATCH when the probe key was found, which
// lets the descent short-circuit without a confirming comparison.
pub(crate) const EXACT_MATCH: i32 = 1 << 30;
pub(crate) const MATCH_MASK: i32 = EXACT_MATCH - 1;

// One node of the tree.  Leaves hold no child array at all, which is what
// keeps them dense; internal nodes hold `capacity + 1` child slots of which
// the first `count + 1` are live (the rest are NIL).
//
// `parent` is the position of this node in its parent, except at the root,
// where it holds the leftmost-leaf back-edge: the root's parent is the
// leftmost leaf and that leaf's parent is the root again (a single-leaf
// tree points at itself).  `is_leaf(parent)` is therefore the root test,
// and `begin()` is O(1) without a dedicated field.
pub(crate) struct Node<T> {
    pub parent: NodeId,
    pub position: u16,
    pub values: FixedVec<T>,
    pub children: Option<Box<[NodeId]>>,
}

impl<T> Node<T> {
    pub fn new_leaf(cap: usize, parent: NodeId) -> Self {
        Self {
            parent,
            position: 0,
            values: FixedVec::with_capacity(cap),
            children: None,
        }
    }

    pub fn new_internal(cap: usize, parent: NodeId) -> Self {
        Self {
            parent,
            position: 0,
            values: FixedVec::with_capacity(cap),
            children: Some(vec![NIL; cap + 1].into_boxed_slice()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn max_count(&self) -> usize {
        self.values.capacity()
    }

    pub fn child(&self, i: usize) -> NodeId {
        let c = self.children.as_ref().expect("leaf has no children")[i];
        assert!(c != NIL);
        c
    }

    pub fn children_mut(&mut self) -> &mut [NodeId] {
        self.children.as_mut().expect("leaf has no children")
    }
}

impl<K, D> Node<(K, D)> {
    pub fn key(&self, i: usize) -> &K {
        &self.values.get(i).0
    }

    /// Position of the first value whose key is not less than `k`.
    pub fn lower_bound<C: Comparator<K>>(&self, k: &K, comp: &C) -> i32 {
        if C::COMPARE_TO {
            if C::LINEAR {
                self.linear_search_compare_to(k, comp)
            } else {
                self.binary_search_compare_to(k, comp, 0, self.count() as i32)
            }
        } else if C::LINEAR {
            self.linear_search_plain(k, comp)
        } else {
            self.binary_search_plain(k, comp)
        }
    }

    /// Position of the first value whose key is greater than `k`.  Never
    /// sets the exact-match bit.
    pub fn upper_bound<C: Comparator<K>>(&self, k: &K, comp: &C) -> i32 {
        if C::COMPARE_TO {
            let upper = UpperBoundCompareToAdapter(comp);
            if C::LINEAR {
                self.linear_search_plain(k, &upper)
            } else {
                self.binary_search_plain(k, &upper)
            }
        } else {
            let upper = UpperBoundAdapter(comp);
            if C::LINEAR {
                self.linear_search_plain(k, &upper)
            } else {
                self.binary_search_plain(k, &upper)
            }
        }
    }

    fn linear_search_plain<C: Comparator<K>>(&self, k: &K, comp: &C) -> i32 {
        let mut s = 0;
        let e = self.count();
        while s < e {
            if !compare_keys(comp, self.key(s), k) {
                break;
            }
            s += 1;
        }
        s as i32
    }

    fn linear_search_compare_to<C: Comparator<K>>(&self, k: &K, comp: &C) -> i32 {
        let mut s = 0;
        let e = self.count();
        while s < e {
            match comp.compare_to(self.key(s), k) {
                Ordering::Equal => return s as i32 | EXACT_MATCH,
                Ordering::Greater => break,
                Ordering::Less => s += 1,
            }
        }
        s as i32
    }

    fn binary_search_plain<C: Comparator<K>>(&self, k: &K, comp: &C) -> i32 {
        let mut s = 0i32;
        let mut e = self.count() as i32;
        while s != e {
            let mid = (s + e) / 2;
            if compare_keys(comp, self.key(mid as usize), k) {
                s = mid + 1;
            } else {
                e = mid;
            }
        }
        s
    }

    fn binary_search_compare_to<C: Comparator<K>>(
        &self,
        k: &K,
        comp: &C,
        mut s: i32,
        mut e: i32,
    ) -> i32 {
        while s != e {
            let mid = (s + e) / 2;
            match comp.compare_to(self.key(mid as usize), k) {
                Ordering::Less => s = mid + 1,
                Ordering::Greater => e = mid,
                Ordering::Equal => {
                    // Lower-bound semantics under duplicates: keep searching
                    // the left half for the first equal position.
                    return self.binary_search_compare_to(k, comp, s, mid) | EXACT_MATCH;
                }
            }
        }
        s
    }
}

// Slotted node storage with index reuse.  Nothing here walks the tree; the
// arena only owns slots and hands out disjoint borrows.
pub(crate) struct Arena<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<NodeId>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn alloc(&mut self, node: Node<T>) -> NodeId {
        if let Some(id) = self.free.pop() {
            assert!(self.slots[id as usize].is_none());
            self.slots[id as usize] = Some(node);
            id
        } else {
            let id = self.slots.len();
            assert!(id < NIL as usize, "arena exhausted");
            self.slots.push(Some(node));
            id as NodeId
        }
    }

    pub fn release(&mut self, id: NodeId) {
        let n = self.slots[id as usize].take();
        assert!(n.is_some(), "released a dead node");
        self.free.push(id);
    }

    pub fn node(&self, id: NodeId) -> &Node<T> {
        self.slots[id as usize].as_ref().expect("dead node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.slots[id as usize].as_mut().expect("dead node")
    }

    pub fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Node<T>, &mut Node<T>) {
        assert!(a != b);
        let (a_ix, b_ix) = (a as usize, b as usize);
        if a_ix < b_ix {
            let (lo, hi) = self.slots.split_at_mut(b_ix);
            (
                lo[a_ix].as_mut().expect("dead node"),
                hi[0].as_mut().expect("dead node"),
            )
        } else {
            let (lo, hi) = self.slots.split_at_mut(a_ix);
            (
                hi[0].as_mut().expect("dead node"),
                lo[b_ix].as_mut().expect("dead node"),
            )
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = &Node<T>> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::btree::compare::{CompareTo, Less, LinearLess};

    fn leaf_of(keys: &[u32]) -> Node<(u32, ())> {
        let mut n = Node::new_leaf(16, NIL);
        for &k in keys {
            n.values.push((k, ()));
        }
        n
    }

    #[test]
    fn test_lower_bound_all_strategies() {
        let n = leaf_of(&[2, 4, 4, 6, 8]);
        for probe in 0..10u32 {
            let want = [2, 4, 4, 6, 8].iter().position(|&k| k >= probe).unwrap_or(5) as i32;

            assert_eq!(n.lower_bound(&probe, &Less::default()), want);
            assert_eq!(n.lower_bound(&probe, &LinearLess::default()), want);

            let res = n.lower_bound(&probe, &CompareTo::default());
            assert_eq!(res & MATCH_MASK, want);
            assert_eq!(res & EXACT_MATCH != 0, [2, 4, 6, 8].contains(&probe));
        }
    }

    #[test]
    fn test_exact_match_lands_on_first_duplicate() {
        let n = leaf_of(&[1, 4, 4, 4, 9]);
        let res = n.lower_bound(&4, &CompareTo::default());
        assert_eq!(res & MATCH_MASK, 1);
        assert!(res & EXACT_MATCH != 0);
    }

    #[test]
    fn test_upper_bound_all_strategies() {
        let n = leaf_of(&[2, 4, 4, 6, 8]);
        for probe in 0..10u32 {
            let want = [2u32, 4, 4, 6, 8].iter().position(|&k| k > probe).unwrap_or(5) as i32;

            assert_eq!(n.upper_bound(&probe, &Less::default()), want);
            assert_eq!(n.upper_bound(&probe, &LinearLess::default()), want);
            assert_eq!(n.upper_bound(&probe, &CompareTo::default()), want);
        }
    }

    #[test]
    fn test_arena_reuse() {
        let mut a: Arena<(u32, ())> = Arena::new();
        let x = a.alloc(leaf_of(&[1]));
        let y = a.alloc(leaf_of(&[2]));
        assert_ne!(x, y);
        a.release(x);
        let z = a.alloc(leaf_of(&[3]));
        assert_eq!(x, z);
        assert_eq!(a.node(z).key(0), &3);
        assert_eq!(a.slot_count(), 2);
    }
}
