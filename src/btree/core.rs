use std::fmt;
use std::marker::PhantomData;

use super::compare::{compare_keys, Comparator};
use super::node::{Arena, Node, NodeId, EXACT_MATCH, MATCH_MASK, NIL};
use super::node_values;

// A position in the tree: a node and an index into its values.  pos == -1
// is the transient pre-begin state produced by decrementing begin(); pos ==
// count is the transient post-last state used while walking between nodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Cursor {
    pub node: NodeId,
    pub pos: i32,
}

// The B-tree engine.  Values live in every node (leaves and internals); the
// container façades decide what a value is (the set variant stores (K, ())).
//
// Nodes live in a per-tree arena and reference each other by index.  The
// root-only bookkeeping (size, rightmost) sits here next to the arena; the
// leftmost leaf is still reached through the root's parent back-edge.
pub(crate) struct Tree<K, D, C, const TARGET: usize> {
    arena: Arena<(K, D)>,
    root: NodeId,
    rightmost: NodeId,
    size: usize,
    // bumped by every mutation; the hook for generation-validated cursors
    generation: u64,
    comp: C,
}

impl<K, D, C, const TARGET: usize> Tree<K, D, C, TARGET> {
    // How many values fit in a full node, derived from the target node size.
    pub const NODE_VALUES: usize = node_values(TARGET, std::mem::size_of::<(K, D)>());

    // Erase rebalances a non-root node once it drops below this.
    pub const MIN_NODE_VALUES: usize = Self::NODE_VALUES / 2;

    pub fn with_comparator(comp: C) -> Self {
        assert!(Self::NODE_VALUES < u16::MAX as usize, "target node size too large");
        Self {
            arena: Arena::new(),
            root: NIL,
            rightmost: NIL,
            size: 0,
            generation: 0,
            comp,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    // Mutation counter; a revalidating cursor layer would key off this.
    #[allow(dead_code)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = NIL;
        self.rightmost = NIL;
        self.size = 0;
        self.generation += 1;
    }

    /// O(1): exchanges the arenas and bookkeeping of two trees.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
        self.generation += 1;
        other.generation += 1;
    }

    fn leftmost(&self) -> NodeId {
        if self.root == NIL {
            NIL
        } else {
            self.arena.node(self.root).parent
        }
    }

    fn is_root(&self, id: NodeId) -> bool {
        self.arena.node(self.arena.node(id).parent).is_leaf()
    }

    pub fn begin(&self) -> Cursor {
        Cursor { node: self.leftmost(), pos: 0 }
    }

    pub fn end(&self) -> Cursor {
        if self.rightmost == NIL {
            Cursor { node: NIL, pos: 0 }
        } else {
            Cursor {
                node: self.rightmost,
                pos: self.arena.node(self.rightmost).count() as i32,
            }
        }
    }

    pub fn key_at(&self, c: Cursor) -> &K {
        self.arena.node(c.node).key(c.pos as usize)
    }

    pub fn entry_at(&self, c: Cursor) -> &(K, D) {
        self.arena.node(c.node).values.get(c.pos as usize)
    }

    pub fn entry_at_mut(&mut self, c: Cursor) -> &mut (K, D) {
        self.arena.node_mut(c.node).values.get_mut(c.pos as usize)
    }

    // ---- cursor movement ----

    pub fn cursor_increment(&self, iter: &mut Cursor) {
        if self.arena.node(iter.node).is_leaf() {
            iter.pos += 1;
            if iter.pos < self.arena.node(iter.node).count() as i32 {
                return;
            }
        }
        self.cursor_increment_slow(iter);
    }

    fn cursor_increment_slow(&self, iter: &mut Cursor) {
        if self.arena.node(iter.node).is_leaf() {
            assert!(iter.pos >= self.arena.node(iter.node).count() as i32);
            let save = *iter;
            while iter.pos == self.arena.node(iter.node).count() as i32
                && !self.is_root(iter.node)
            {
                let n = self.arena.node(iter.node);
                assert_eq!(self.arena.node(n.parent).child(n.position as usize), iter.node);
                iter.pos = n.position as i32;
                iter.node = n.parent;
            }
            if iter.pos == self.arena.node(iter.node).count() as i32 {
                // we were at end; restore
                *iter = save;
            }
        } else {
            assert!(iter.pos < self.arena.node(iter.node).count() as i32);
            iter.node = self.arena.node(iter.node).child((iter.pos + 1) as usize);
            while !self.arena.node(iter.node).is_leaf() {
                iter.node = self.arena.node(iter.node).child(0);
            }
            iter.pos = 0;
        }
    }

    pub fn cursor_decrement(&self, iter: &mut Cursor) {
        if self.arena.node(iter.node).is_leaf() {
            iter.pos -= 1;
            if iter.pos >= 0 {
                return;
            }
        }
        self.cursor_decrement_slow(iter);
    }

    fn cursor_decrement_slow(&self, iter: &mut Cursor) {
        if self.arena.node(iter.node).is_leaf() {
            assert!(iter.pos <= -1);
            let save = *iter;
            while iter.pos < 0 && !self.is_root(iter.node) {
                let n = self.arena.node(iter.node);
                assert_eq!(self.arena.node(n.parent).child(n.position as usize), iter.node);
                iter.pos = n.position as i32 - 1;
                iter.node = n.parent;
            }
            if iter.pos < 0 {
                *iter = save;
            }
        } else {
            assert!(iter.pos >= 0);
            iter.node = self.arena.node(iter.node).child(iter.pos as usize);
            while !self.arena.node(iter.node).is_leaf() {
                let n = self.arena.node(iter.node);
                iter.node = n.child(n.count());
            }
            iter.pos = self.arena.node(iter.node).count() as i32 - 1;
        }
    }

    // ---- node allocation ----

    fn new_leaf_node(&mut self, parent: NodeId) -> NodeId {
        self.arena.alloc(Node::new_leaf(Self::NODE_VALUES, parent))
    }

    fn new_internal_node(&mut self, parent: NodeId) -> NodeId {
        self.arena.alloc(Node::new_internal(Self::NODE_VALUES, parent))
    }

    // A root leaf points at itself through the leftmost back-edge.
    fn new_leaf_root_node(&mut self, max_count: usize) -> NodeId {
        let id = self.arena.alloc(Node::new_leaf(max_count, NIL));
        self.arena.node_mut(id).parent = id;
        id
    }

    fn set_child(&mut self, parent: NodeId, i: usize, child: NodeId) {
        self.arena.node_mut(parent).children_mut()[i] = child;
        let c = self.arena.node_mut(child);
        c.parent = parent;
        c.position = i as u16;
    }

    // ---- single-node structural edits ----

    // Insert x at position i; for internal nodes a child gap opens at i + 1
    // for the caller to fill.
    fn node_insert_value(&mut self, id: NodeId, i: usize, x: (K, D)) {
        let n = self.arena.node_mut(id);
        n.values.insert(i, x);
        if !n.is_leaf() {
            let count = n.count();
            let ch = n.children_mut();
            for j in (i + 2..=count).rev() {
                ch[j] = ch[j - 1];
            }
            ch[i + 1] = NIL;
            for j in i + 2..=count {
                let c = self.arena.node(id).child(j);
                self.arena.node_mut(c).position = j as u16;
            }
        }
    }

    // Remove and return the value at position i; for internal nodes the
    // caller has already dealt with the subtree at children[i + 1].
    fn node_remove_value(&mut self, id: NodeId, i: usize) -> (K, D) {
        let n = self.arena.node_mut(id);
        let x = n.values.remove(i);
        if !n.is_leaf() {
            let count = n.count();
            let ch = n.children_mut();
            for j in i + 1..=count {
                ch[j] = ch[j + 1];
            }
            ch[count + 1] = NIL;
            for j in i + 1..=count {
                let c = self.arena.node(id).child(j);
                self.arena.node_mut(c).position = j as u16;
            }
        }
        x
    }

    // ---- sibling rebalancing, splitting, merging ----

    fn rebalance_right_to_left(&mut self, left_id: NodeId, right_id: NodeId, to_move: usize) {
        let (parent_id, pos) = {
            let l = self.arena.node(left_id);
            (l.parent, l.position as usize)
        };
        assert_eq!(self.arena.node(right_id).parent, parent_id);
        assert_eq!(self.arena.node(right_id).position as usize, pos + 1);
        assert!(to_move >= 1);
        assert!(to_move <= self.arena.node(right_id).count());

        let old_left = self.arena.node(left_id).count();

        // rotate the delimiter down-left and its replacement up from the right
        let new_delim = self.arena.node_mut(right_id).values.remove(to_move - 1);
        let old_delim = self.arena.node_mut(parent_id).values.replace(pos, new_delim);
        {
            let (left, right) = self.arena.pair_mut(left_id, right_id);
            left.values.push(old_delim);
            right.values.move_prefix_to(to_move - 1, &mut left.values);
        }

        if !self.arena.node(left_id).is_leaf() {
            for i in 0..to_move {
                let c = self.arena.node(right_id).child(i);
                self.set_child(left_id, old_left + 1 + i, c);
            }
            let right = self.arena.node_mut(right_id);
            let rcount = right.count();
            let ch = right.children_mut();
            for i in 0..=rcount {
                ch[i] = ch[i + to_move];
            }
            for i in rcount + 1..=rcount + to_move {
                ch[i] = NIL;
            }
            for i in 0..=rcount {
                let c = self.arena.node(right_id).child(i);
                self.arena.node_mut(c).position = i as u16;
            }
        }
    }

    fn rebalance_left_to_right(&mut self, left_id: NodeId, right_id: NodeId, to_move: usize) {
        let (parent_id, pos) = {
            let l = self.arena.node(left_id);
            (l.parent, l.position as usize)
        };
        assert_eq!(self.arena.node(right_id).parent, parent_id);
        assert_eq!(self.arena.node(right_id).position as usize, pos + 1);
        assert!(to_move >= 1);
        assert!(to_move <= self.arena.node(left_id).count());

        let old_left = self.arena.node(left_id).count();
        let old_right = self.arena.node(right_id).count();

        let new_delim = self.arena.node_mut(left_id).values.remove(old_left - to_move);
        let old_delim = self.arena.node_mut(parent_id).values.replace(pos, new_delim);
        {
            let (left, right) = self.arena.pair_mut(left_id, right_id);
            let at = left.values.len() - (to_move - 1);
            right.values.prepend_from(&mut left.values, at, old_delim);
        }

        if !self.arena.node(left_id).is_leaf() {
            // make room at the front of the right node
            {
                let right = self.arena.node_mut(right_id);
                let ch = right.children_mut();
                for i in (0..=old_right).rev() {
                    ch[i + to_move] = ch[i];
                }
            }
            for i in 1..=to_move {
                let c = self.arena.node(left_id).child(old_left - to_move + i);
                self.set_child(right_id, i - 1, c);
                self.arena.node_mut(left_id).children_mut()[old_left - to_move + i] = NIL;
            }
            for i in to_move..=old_right + to_move {
                let c = self.arena.node(right_id).child(i);
                self.arena.node_mut(c).position = i as u16;
            }
        }
    }

    // Move a biased share of node's values onto the empty dest (its new
    // right sibling) and promote the split key into the parent.  The bias
    // favors the pending insertion: splits at the edges leave the target
    // side nearly empty so bulk sequential inserts fill nodes completely.
    fn split_node(&mut self, node_id: NodeId, dest_id: NodeId, insert_position: i32) {
        assert_eq!(self.arena.node(dest_id).count(), 0);

        let (node_pos, node_count, node_max, is_leaf) = {
            let n = self.arena.node(node_id);
            (n.position as usize, n.count(), n.max_count(), n.is_leaf())
        };

        let dest_count = if insert_position == 0 {
            node_count - 1
        } else if insert_position == node_max as i32 {
            0
        } else {
            node_count / 2
        };
        let new_left = node_count - dest_count;
        assert!(new_left >= 1);
        {
            let (node, dest) = self.arena.pair_mut(node_id, dest_id);
            node.values.move_tail_to(new_left, &mut dest.values);
        }

        // the split key is the largest value left of the split
        let split_val = self.arena.node_mut(node_id).values.pop();
        let parent_id = self.arena.node(node_id).parent;
        self.node_insert_value(parent_id, node_pos, split_val);
        self.set_child(parent_id, node_pos + 1, dest_id);

        if !is_leaf {
            let final_left = new_left - 1;
            for i in 0..=dest_count {
                let c = self.arena.node(node_id).child(final_left + 1 + i);
                self.set_child(dest_id, i, c);
                self.arena.node_mut(node_id).children_mut()[final_left + 1 + i] = NIL;
            }
        }
    }

    // Absorb right (and the delimiter in the parent) into left, then free
    // right.
    fn merge_nodes(&mut self, left_id: NodeId, right_id: NodeId) {
        let (parent_id, pos) = {
            let l = self.arena.node(left_id);
            (l.parent, l.position as usize)
        };
        assert_eq!(self.arena.node(right_id).parent, parent_id);
        assert_eq!(self.arena.node(right_id).position as usize, pos + 1);

        let old_left = self.arena.node(left_id).count();
        let old_right = self.arena.node(right_id).count();

        let delim = self.node_remove_value(parent_id, pos);
        {
            let (left, right) = self.arena.pair_mut(left_id, right_id);
            left.values.push(delim);
            right.values.append_to(&mut left.values);
        }

        if !self.arena.node(left_id).is_leaf() {
            for i in 0..=old_right {
                let c = self.arena.node(right_id).child(i);
                self.set_child(left_id, old_left + 1 + i, c);
            }
        }

        assert!(self.arena.node(right_id).values.is_empty());
        if self.rightmost == right_id {
            self.rightmost = left_id;
        }
        self.arena.release(right_id);
    }

    // ---- insertion plumbing ----

    // Make room in the full node at iter by shifting into a sibling, or
    // split it; iter tracks where the pending insertion must go.
    fn rebalance_or_split(&mut self, iter: &mut Cursor) {
        {
            let n = self.arena.node(iter.node);
            assert_eq!(n.count(), n.max_count());
        }

        if iter.node != self.root {
            let parent = self.arena.node(iter.node).parent;
            let node_position = self.arena.node(iter.node).position as usize;

            if node_position > 0 {
                // try to shift values into the left sibling
                let left = self.arena.node(parent).child(node_position - 1);
                let (lcount, lmax) = {
                    let l = self.arena.node(left);
                    (l.count(), l.max_count())
                };
                if lcount < lmax {
                    // bias: an insert at the far end wants the left filled up
                    let mut to_move =
                        (lmax - lcount) / (1 + usize::from(iter.pos < lmax as i32));
                    to_move = to_move.max(1);

                    if iter.pos - to_move as i32 >= 0 || lcount + to_move < lmax {
                        self.rebalance_right_to_left(left, iter.node, to_move);
                        {
                            let n = self.arena.node(iter.node);
                            assert_eq!(n.max_count() - n.count(), to_move);
                        }
                        iter.pos -= to_move as i32;
                        if iter.pos < 0 {
                            iter.pos += self.arena.node(left).count() as i32 + 1;
                            iter.node = left;
                        }
                        return;
                    }
                }
            }

            if node_position < self.arena.node(parent).count() {
                // try to shift values into the right sibling
                let right = self.arena.node(parent).child(node_position + 1);
                let (rcount, rmax) = {
                    let r = self.arena.node(right);
                    (r.count(), r.max_count())
                };
                if rcount < rmax {
                    let mut to_move = (rmax - rcount) / (1 + usize::from(iter.pos > 0));
                    to_move = to_move.max(1);

                    let node_count = self.arena.node(iter.node).count();
                    if iter.pos <= node_count as i32 - to_move as i32
                        || rcount + to_move < rmax
                    {
                        self.rebalance_left_to_right(iter.node, right, to_move);
                        if iter.pos > self.arena.node(iter.node).count() as i32 {
                            iter.pos -= self.arena.node(iter.node).count() as i32 + 1;
                            iter.node = right;
                        }
                        return;
                    }
                }
            }

            // no sibling slack; make sure the parent can take the split key
            let (pcount, pmax) = {
                let p = self.arena.node(parent);
                (p.count(), p.max_count())
            };
            if pcount == pmax {
                let mut parent_iter = Cursor {
                    node: parent,
                    pos: self.arena.node(iter.node).position as i32,
                };
                self.rebalance_or_split(&mut parent_iter);
            }
        } else {
            // splitting the root: hang it under a fresh internal root; the
            // leftmost back-edge moves up with the root role
            let leftmost = self.arena.node(self.root).parent;
            let old_root = self.root;
            let new_root = self.arena.alloc(Node::new_internal(Self::NODE_VALUES, leftmost));
            self.root = new_root;
            self.set_child(new_root, 0, old_root);
        }

        let parent = self.arena.node(iter.node).parent;
        let is_leaf = self.arena.node(iter.node).is_leaf();
        let dest = if is_leaf {
            self.new_leaf_node(parent)
        } else {
            self.new_internal_node(parent)
        };
        self.split_node(iter.node, dest, iter.pos);
        if is_leaf && self.rightmost == iter.node {
            self.rightmost = dest;
        }

        if iter.pos > self.arena.node(iter.node).count() as i32 {
            iter.pos -= self.arena.node(iter.node).count() as i32 + 1;
            iter.node = dest;
        }
    }

    // Insert v immediately before iter.  Requires (--iter).key <= key(v) <=
    // iter.key.
    fn internal_insert(&mut self, mut iter: Cursor, v: (K, D)) -> Cursor {
        if !self.arena.node(iter.node).is_leaf() {
            // insertion must land in a leaf: step to the previous value,
            // which is the rightmost of the left subtree
            self.cursor_decrement(&mut iter);
            iter.pos += 1;
        }

        let (count, max_count) = {
            let n = self.arena.node(iter.node);
            (n.count(), n.max_count())
        };
        if count == max_count {
            if max_count < Self::NODE_VALUES {
                // the undersized single-leaf root: grow it in place of the
                // old one and release the old storage
                assert_eq!(iter.node, self.root);
                let old_root = self.root;
                let new_root =
                    self.new_leaf_root_node((2 * max_count).min(Self::NODE_VALUES));
                {
                    let (old, new) = self.arena.pair_mut(old_root, new_root);
                    old.values.append_to(&mut new.values);
                }
                self.arena.release(old_root);
                self.root = new_root;
                self.rightmost = new_root;
                iter.node = new_root;
            } else {
                self.rebalance_or_split(&mut iter);
            }
        }

        self.node_insert_value(iter.node, iter.pos as usize, v);
        self.size += 1;
        self.generation += 1;
        iter
    }

    // ---- erase plumbing ----

    fn try_merge_or_rebalance(&mut self, iter: &mut Cursor) -> bool {
        let parent = self.arena.node(iter.node).parent;
        let pos = self.arena.node(iter.node).position as usize;

        if pos > 0 {
            let left = self.arena.node(parent).child(pos - 1);
            let (lcount, lmax) = {
                let l = self.arena.node(left);
                (l.count(), l.max_count())
            };
            if 1 + lcount + self.arena.node(iter.node).count() <= lmax {
                iter.pos += 1 + lcount as i32;
                self.merge_nodes(left, iter.node);
                iter.node = left;
                return true;
            }
        }

        if pos < self.arena.node(parent).count() {
            let right = self.arena.node(parent).child(pos + 1);
            let (rcount, rmax) = {
                let r = self.arena.node(right);
                (r.count(), r.max_count())
            };
            if 1 + self.arena.node(iter.node).count() + rcount <= rmax {
                self.merge_nodes(iter.node, right);
                return true;
            }
            // Skip the rebalance when the erase came off the front of a
            // non-empty node: repeated front erases would shuttle values
            // left only to erase them next.
            let node_count = self.arena.node(iter.node).count();
            if rcount > Self::MIN_NODE_VALUES && (node_count == 0 || iter.pos > 0) {
                let mut to_move = (rcount - node_count) / 2;
                to_move = to_move.min(rcount - 1);
                self.rebalance_right_to_left(iter.node, right, to_move);
                return false;
            }
        }

        if pos > 0 {
            // mirror image of the case above, for back-of-tree erases
            let left = self.arena.node(parent).child(pos - 1);
            let lcount = self.arena.node(left).count();
            let node_count = self.arena.node(iter.node).count();
            if lcount > Self::MIN_NODE_VALUES
                && (node_count == 0 || iter.pos < node_count as i32)
            {
                let mut to_move = (lcount - node_count) / 2;
                to_move = to_move.min(lcount - 1);
                self.rebalance_left_to_right(left, iter.node, to_move);
                iter.pos += to_move as i32;
                return false;
            }
        }

        false
    }

    // Shrink the height by one when the root has been emptied.
    fn try_shrink(&mut self) {
        if self.arena.node(self.root).count() > 0 {
            return;
        }
        if self.arena.node(self.root).is_leaf() {
            assert_eq!(self.size, 0);
            self.arena.release(self.root);
            self.arena.clear();
            self.root = NIL;
            self.rightmost = NIL;
        } else {
            // promote the only child; it inherits the leftmost back-edge
            let child = self.arena.node(self.root).child(0);
            let leftmost = self.arena.node(self.root).parent;
            {
                let c = self.arena.node_mut(child);
                c.parent = leftmost;
                c.position = 0;
            }
            self.arena.release(self.root);
            self.root = child;
        }
    }

    /// Erase the value at iter.  Returns the removed value and the cursor of
    /// its in-order successor.
    pub fn erase(&mut self, mut iter: Cursor) -> ((K, D), Cursor) {
        let mut internal_delete = false;
        if !self.arena.node(iter.node).is_leaf() {
            // swap with the predecessor, which sits in a leaf, and erase
            // there instead
            let tmp = iter;
            self.cursor_decrement(&mut iter);
            assert!(self.arena.node(iter.node).is_leaf());
            {
                let (a, b) = self.arena.pair_mut(iter.node, tmp.node);
                std::mem::swap(
                    a.values.get_mut(iter.pos as usize),
                    b.values.get_mut(tmp.pos as usize),
                );
            }
            internal_delete = true;
        }
        self.size -= 1;
        self.generation += 1;

        let removed = self.node_remove_value(iter.node, iter.pos as usize);

        // merge or rebalance as we walk back up
        let mut res = iter;
        loop {
            if iter.node == self.root {
                self.try_shrink();
                if self.is_empty() {
                    return (removed, self.end());
                }
                break;
            }
            if self.arena.node(iter.node).count() >= Self::MIN_NODE_VALUES {
                break;
            }
            let merged = self.try_merge_or_rebalance(&mut iter);
            if self.arena.node(iter.node).is_leaf() {
                res = iter;
            }
            if !merged {
                break;
            }
            iter.node = self.arena.node(iter.node).parent;
        }

        // land on the successor of the erased value
        if res.pos == self.arena.node(res.node).count() as i32 {
            res.pos = self.arena.node(res.node).count() as i32 - 1;
            self.cursor_increment(&mut res);
        }
        if internal_delete {
            self.cursor_increment(&mut res);
        }
        (removed, res)
    }

    pub fn pop_first(&mut self) -> Option<(K, D)> {
        if self.is_empty() {
            return None;
        }
        Some(self.erase(self.begin()).0)
    }

    pub fn pop_last(&mut self) -> Option<(K, D)> {
        if self.is_empty() {
            return None;
        }
        let mut last = self.end();
        self.cursor_decrement(&mut last);
        Some(self.erase(last).0)
    }

    pub fn distance(&self, mut b: Cursor, e: Cursor) -> usize {
        let mut n = 0;
        while b != e {
            n += 1;
            self.cursor_increment(&mut b);
        }
        n
    }

    /// Erase [begin, end).  Every cursor into the range is invalidated by
    /// the first erase; we continue from the returned successor.
    pub fn erase_range(&mut self, begin: Cursor, end: Cursor) -> usize {
        let count = self.distance(begin, end);
        let mut iter = begin;
        for _ in 0..count {
            iter = self.erase(iter).1;
        }
        count
    }

    // ---- introspection ----

    pub fn height(&self) -> usize {
        // the leftmost back-edge closes the root-to-leaf chain into a cycle
        // whose length is the height
        let mut h = 0;
        if self.root != NIL {
            let mut n = self.root;
            loop {
                h += 1;
                n = self.arena.node(n).parent;
                if n == self.root {
                    break;
                }
            }
        }
        h
    }

    pub fn leaf_nodes(&self) -> usize {
        self.arena.live_nodes().filter(|n| n.is_leaf()).count()
    }

    pub fn internal_nodes(&self) -> usize {
        self.arena.live_nodes().filter(|n| !n.is_leaf()).count()
    }

    pub fn nodes(&self) -> usize {
        self.arena.live_nodes().count()
    }

    pub fn bytes_used(&self) -> usize {
        use std::mem::size_of;
        let mut total = size_of::<Self>()
            + self.arena.slot_count() * size_of::<Option<Node<(K, D)>>>();
        for n in self.arena.live_nodes() {
            total += n.values.capacity() * size_of::<(K, D)>();
            if let Some(ch) = &n.children {
                total += ch.len() * size_of::<NodeId>();
            }
        }
        total
    }

    pub fn average_bytes_per_value() -> f64 {
        // bytes per value in a leaf that is 75% full, which matches the
        // observed occupancy of randomly filled trees
        let leaf = std::mem::size_of::<Option<Node<(K, D)>>>()
            + Self::NODE_VALUES * std::mem::size_of::<(K, D)>();
        leaf as f64 / (Self::NODE_VALUES as f64 * 0.75)
    }

    pub fn fullness(&self) -> f64 {
        if self.nodes() == 0 {
            return 0.0;
        }
        self.size as f64 / (self.nodes() * Self::NODE_VALUES) as f64
    }

    pub fn overhead(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.bytes_used() - self.size * std::mem::size_of::<(K, D)>()) as f64
            / self.size as f64
    }

    pub fn iter(&self) -> Iter<'_, K, D, C, TARGET> {
        Iter {
            tree: self,
            front: self.begin(),
            back: self.end(),
            remaining: self.size,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, D, C, TARGET> {
        let front = self.begin();
        let back = self.end();
        let remaining = self.size;
        IterMut {
            tree: self,
            front,
            back,
            remaining,
            marker: PhantomData,
        }
    }

    pub fn range(&self, front: Cursor, back: Cursor) -> Range<'_, K, D, C, TARGET> {
        Range { tree: self, front, back }
    }

    pub fn dump<W: fmt::Write>(&self, w: &mut W) -> fmt::Result
    where
        K: fmt::Display,
    {
        if self.root != NIL {
            self.internal_dump(w, self.root, 0)?;
        }
        Ok(())
    }

    fn internal_dump<W: fmt::Write>(&self, w: &mut W, id: NodeId, level: usize) -> fmt::Result
    where
        K: fmt::Display,
    {
        let n = self.arena.node(id);
        for i in 0..n.count() {
            if !n.is_leaf() {
                self.internal_dump(w, n.child(i), level + 1)?;
            }
            for _ in 0..level {
                w.write_str("  ")?;
            }
            writeln!(w, "{} [{}]", n.key(i), level)?;
        }
        if !n.is_leaf() {
            self.internal_dump(w, n.child(n.count()), level + 1)?;
        }
        Ok(())
    }
}

impl<K, D, C: Comparator<K>, const TARGET: usize> Tree<K, D, C, TARGET> {
    fn internal_end(&self, iter: Cursor) -> Cursor {
        if iter.node != NIL {
            iter
        } else {
            self.end()
        }
    }

    // Walk up out of any node we fell off the end of; lands on the next
    // in-order value or a NIL cursor when the key is past everything.
    fn internal_last(&self, mut iter: Cursor) -> Cursor {
        while iter.node != NIL && iter.pos == self.arena.node(iter.node).count() as i32 {
            iter.pos = self.arena.node(iter.node).position as i32;
            iter.node = self.arena.node(iter.node).parent;
            if self.arena.node(iter.node).is_leaf() {
                iter.node = NIL;
            }
        }
        iter
    }

    // Descend to the leaf position where key would live.  With a three-way
    // comparator the descent reports an exact match the moment it sees one;
    // the flag is EXACT_MATCH / -EXACT_MATCH, or 0 for boolean comparators
    // (which cannot tell and leave the equality check to the caller).
    fn internal_locate(&self, key: &K) -> (Cursor, i32) {
        let mut iter = Cursor { node: self.root, pos: 0 };
        if C::COMPARE_TO {
            loop {
                let res = self.arena.node(iter.node).lower_bound(key, &self.comp);
                iter.pos = res & MATCH_MASK;
                if res & EXACT_MATCH != 0 {
                    return (iter, EXACT_MATCH);
                }
                if self.arena.node(iter.node).is_leaf() {
                    break;
                }
                iter.node = self.arena.node(iter.node).child(iter.pos as usize);
            }
            (iter, -EXACT_MATCH)
        } else {
            loop {
                iter.pos = self.arena.node(iter.node).lower_bound(key, &self.comp);
                if self.arena.node(iter.node).is_leaf() {
                    break;
                }
                iter.node = self.arena.node(iter.node).child(iter.pos as usize);
            }
            (iter, 0)
        }
    }

    fn internal_lower_bound(&self, key: &K) -> Cursor {
        let mut iter = Cursor { node: self.root, pos: 0 };
        if iter.node != NIL {
            loop {
                iter.pos = self.arena.node(iter.node).lower_bound(key, &self.comp) & MATCH_MASK;
                if self.arena.node(iter.node).is_leaf() {
                    break;
                }
                iter.node = self.arena.node(iter.node).child(iter.pos as usize);
            }
            iter = self.internal_last(iter);
        }
        iter
    }

    fn internal_upper_bound(&self, key: &K) -> Cursor {
        let mut iter = Cursor { node: self.root, pos: 0 };
        if iter.node != NIL {
            loop {
                iter.pos = self.arena.node(iter.node).upper_bound(key, &self.comp);
                if self.arena.node(iter.node).is_leaf() {
                    break;
                }
                iter.node = self.arena.node(iter.node).child(iter.pos as usize);
            }
            iter = self.internal_last(iter);
        }
        iter
    }

    /// First position whose key is not less than key.
    pub fn lower_bound(&self, key: &K) -> Cursor {
        self.internal_end(self.internal_lower_bound(key))
    }

    /// First position whose key is greater than key.
    pub fn upper_bound(&self, key: &K) -> Cursor {
        self.internal_end(self.internal_upper_bound(key))
    }

    pub fn equal_range(&self, key: &K) -> (Cursor, Cursor) {
        (self.lower_bound(key), self.upper_bound(key))
    }

    pub fn find_unique(&self, key: &K) -> Option<Cursor> {
        if self.root == NIL {
            return None;
        }
        let (iter, flag) = self.internal_locate(key);
        if flag == EXACT_MATCH {
            return Some(iter);
        }
        if flag == 0 {
            let last = self.internal_last(iter);
            if last.node != NIL && !compare_keys(&self.comp, key, self.key_at(last)) {
                return Some(last);
            }
        }
        None
    }

    pub fn find_multi(&self, key: &K) -> Option<Cursor> {
        if self.root == NIL {
            return None;
        }
        let iter = self.internal_lower_bound(key);
        if iter.node != NIL && !compare_keys(&self.comp, key, self.key_at(iter)) {
            Some(iter)
        } else {
            None
        }
    }

    pub fn count_unique(&self, key: &K) -> usize {
        usize::from(self.find_unique(key).is_some())
    }

    pub fn count_multi(&self, key: &K) -> usize {
        self.distance(self.lower_bound(key), self.upper_bound(key))
    }

    /// Insert the entry for key unless the key is already present.  The
    /// entry is built by `make` only on the insert path, so an existing key
    /// never constructs a value (the substrate of the map's lazy defaults).
    pub fn insert_unique<F>(&mut self, key: K, make: F) -> (Cursor, bool)
    where
        F: FnOnce(K) -> (K, D),
    {
        if self.is_empty() {
            let id = self.new_leaf_root_node(1);
            self.root = id;
            self.rightmost = id;
        }

        let (iter, flag) = self.internal_locate(&key);
        if flag == EXACT_MATCH {
            return (self.internal_last(iter), false);
        }
        if flag == 0 {
            let last = self.internal_last(iter);
            if last.node != NIL && !compare_keys(&self.comp, &key, self.key_at(last)) {
                return (last, false);
            }
        }
        (self.internal_insert(iter, make(key)), true)
    }

    /// Hinted unique insert: O(1) when the key belongs immediately before
    /// the hint; otherwise falls back to the plain insert.  Like
    /// `insert_unique`, the entry is built only when the key is new.
    pub fn insert_unique_hint<F>(&mut self, position: Cursor, key: K, make: F) -> (Cursor, bool)
    where
        F: FnOnce(K) -> (K, D),
    {
        if !self.is_empty() {
            if position == self.end() || compare_keys(&self.comp, &key, self.key_at(position)) {
                let fits = position == self.begin() || {
                    let mut prev = position;
                    self.cursor_decrement(&mut prev);
                    compare_keys(&self.comp, self.key_at(prev), &key)
                };
                if fits {
                    // prev.key < key < position.key
                    return (self.internal_insert(position, make(key)), true);
                }
            } else if compare_keys(&self.comp, self.key_at(position), &key) {
                let mut next = position;
                self.cursor_increment(&mut next);
                if next == self.end() || compare_keys(&self.comp, &key, self.key_at(next)) {
                    // position.key < key < next.key
                    return (self.internal_insert(next, make(key)), true);
                }
            } else {
                // the hint is an equal key
                return (position, false);
            }
        }
        self.insert_unique(key, make)
    }

    /// Multi insert lands at the upper bound, so equal keys keep their
    /// insertion order.
    pub fn insert_multi(&mut self, v: (K, D)) -> Cursor {
        if self.is_empty() {
            let id = self.new_leaf_root_node(1);
            self.root = id;
            self.rightmost = id;
        }
        let iter = self.internal_upper_bound(&v.0);
        let iter = if iter.node == NIL { self.end() } else { iter };
        self.internal_insert(iter, v)
    }

    pub fn insert_multi_hint(&mut self, position: Cursor, v: (K, D)) -> Cursor {
        if !self.is_empty() {
            if position == self.end() || !compare_keys(&self.comp, self.key_at(position), &v.0) {
                let fits = position == self.begin() || {
                    let mut prev = position;
                    self.cursor_decrement(&mut prev);
                    !compare_keys(&self.comp, &v.0, self.key_at(prev))
                };
                if fits {
                    // prev.key <= key <= position.key
                    return self.internal_insert(position, v);
                }
            } else {
                let mut next = position;
                self.cursor_increment(&mut next);
                if next == self.end() || !compare_keys(&self.comp, self.key_at(next), &v.0) {
                    // position.key < key <= next.key
                    return self.internal_insert(next, v);
                }
            }
        }
        self.insert_multi(v)
    }

    pub fn erase_unique(&mut self, key: &K) -> Option<(K, D)> {
        let iter = self.find_unique(key)?;
        Some(self.erase(iter).0)
    }

    pub fn erase_multi(&mut self, key: &K) -> usize {
        if self.root == NIL {
            return 0;
        }
        let begin = self.internal_lower_bound(key);
        if begin.node == NIL {
            return 0;
        }
        let end = self.internal_end(self.internal_upper_bound(key));
        self.erase_range(begin, end)
    }

    // In-order append of a clone of every entry in other.  Source order is
    // already sorted, so no key comparisons happen.
    fn append_in_order(&mut self, other: &Self)
    where
        K: Clone,
        D: Clone,
    {
        let mut c = other.begin();
        let e = other.end();
        while c != e {
            let v = other.entry_at(c).clone();
            if self.is_empty() {
                self.insert_multi(v);
            } else {
                let end_cur = self.end();
                self.internal_insert(end_cur, v);
            }
            other.cursor_increment(&mut c);
        }
    }

    pub fn assign(&mut self, other: &Self)
    where
        K: Clone,
        D: Clone,
        C: Clone,
    {
        self.clear();
        self.comp = other.comp.clone();
        self.append_in_order(other);
    }

    /// Check every structural invariant; panics on violation.
    pub fn verify(&self) {
        if self.root != NIL {
            assert_eq!(self.size, self.internal_verify(self.root, None, None));

            let mut pre_begin = Cursor { node: self.root, pos: -1 };
            self.cursor_increment(&mut pre_begin);
            assert_eq!(self.leftmost(), pre_begin.node);

            let mut post_end = Cursor {
                node: self.root,
                pos: self.arena.node(self.root).count() as i32,
            };
            self.cursor_decrement(&mut post_end);
            assert_eq!(self.rightmost, post_end.node);

            assert!(self.arena.node(self.leftmost()).is_leaf());
            assert!(self.arena.node(self.rightmost).is_leaf());
        } else {
            assert_eq!(self.size, 0);
            assert_eq!(self.rightmost, NIL);
        }
    }

    fn internal_verify(&self, id: NodeId, lo: Option<&K>, hi: Option<&K>) -> usize {
        let n = self.arena.node(id);
        assert!(n.count() > 0);
        assert!(n.count() <= n.max_count());
        if let Some(lo) = lo {
            assert!(!compare_keys(&self.comp, n.key(0), lo));
        }
        if let Some(hi) = hi {
            assert!(!compare_keys(&self.comp, hi, n.key(n.count() - 1)));
        }
        for i in 1..n.count() {
            assert!(!compare_keys(&self.comp, n.key(i), n.key(i - 1)));
        }

        let mut count = n.count();
        if !n.is_leaf() {
            for i in 0..=n.count() {
                let c = n.child(i);
                let cn = self.arena.node(c);
                assert_eq!(cn.parent, id);
                assert_eq!(cn.position as usize, i);
                count += self.internal_verify(
                    c,
                    if i == 0 { lo } else { Some(n.key(i - 1)) },
                    if i == n.count() { hi } else { Some(n.key(i)) },
                );
            }
        }
        count
    }
}

impl<K, D, C, const TARGET: usize> Clone for Tree<K, D, C, TARGET>
where
    K: Clone,
    D: Clone,
    C: Comparator<K> + Clone,
{
    fn clone(&self) -> Self {
        let mut t = Tree::with_comparator(self.comp.clone());
        t.append_in_order(self);
        t
    }
}

impl<K, D, C: Default, const TARGET: usize> Default for Tree<K, D, C, TARGET> {
    fn default() -> Self {
        Tree::with_comparator(C::default())
    }
}

// ---- iterators ----

pub(crate) struct Iter<'a, K, D, C, const TARGET: usize> {
    tree: &'a Tree<K, D, C, TARGET>,
    front: Cursor,
    back: Cursor,
    remaining: usize,
}

impl<'a, K, D, C, const TARGET: usize> Iterator for Iter<'a, K, D, C, TARGET> {
    type Item = &'a (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.tree.entry_at(self.front);
        self.tree.cursor_increment(&mut self.front);
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, D, C, const TARGET: usize> DoubleEndedIterator for Iter<'_, K, D, C, TARGET> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.tree.cursor_decrement(&mut self.back);
        self.remaining -= 1;
        Some(self.tree.entry_at(self.back))
    }
}

impl<K, D, C, const TARGET: usize> ExactSizeIterator for Iter<'_, K, D, C, TARGET> {}
impl<K, D, C, const TARGET: usize> std::iter::FusedIterator for Iter<'_, K, D, C, TARGET> {}

pub(crate) struct IterMut<'a, K, D, C, const TARGET: usize> {
    tree: *mut Tree<K, D, C, TARGET>,
    front: Cursor,
    back: Cursor,
    remaining: usize,
    marker: PhantomData<&'a mut Tree<K, D, C, TARGET>>,
}

impl<'a, K, D, C, const TARGET: usize> Iterator for IterMut<'a, K, D, C, TARGET> {
    type Item = (&'a K, &'a mut D);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        unsafe {
            let entry: *mut (K, D) = (*self.tree).entry_at_mut(self.front);
            (*self.tree).cursor_increment(&mut self.front);
            self.remaining -= 1;
            let e = &mut *entry;
            Some((&e.0, &mut e.1))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, D, C, const TARGET: usize> DoubleEndedIterator for IterMut<'_, K, D, C, TARGET> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        unsafe {
            (*self.tree).cursor_decrement(&mut self.back);
            self.remaining -= 1;
            let entry: *mut (K, D) = (*self.tree).entry_at_mut(self.back);
            let e = &mut *entry;
            Some((&e.0, &mut e.1))
        }
    }
}

impl<K, D, C, const TARGET: usize> ExactSizeIterator for IterMut<'_, K, D, C, TARGET> {}
impl<K, D, C, const TARGET: usize> std::iter::FusedIterator for IterMut<'_, K, D, C, TARGET> {}

// A half-open span of the tree between two cursors.
pub(crate) struct Range<'a, K, D, C, const TARGET: usize> {
    tree: &'a Tree<K, D, C, TARGET>,
    front: Cursor,
    back: Cursor,
}

impl<'a, K, D, C, const TARGET: usize> Iterator for Range<'a, K, D, C, TARGET> {
    type Item = &'a (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let item = self.tree.entry_at(self.front);
        self.tree.cursor_increment(&mut self.front);
        Some(item)
    }
}

impl<K, D, C, const TARGET: usize> DoubleEndedIterator for Range<'_, K, D, C, TARGET> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.tree.cursor_decrement(&mut self.back);
        Some(self.tree.entry_at(self.back))
    }
}

impl<K, D, C, const TARGET: usize> std::iter::FusedIterator for Range<'_, K, D, C, TARGET> {}

pub(crate) struct IntoIter<K, D, C, const TARGET: usize> {
    tree: Tree<K, D, C, TARGET>,
}

impl<K, D, C, const TARGET: usize> IntoIter<K, D, C, TARGET> {
    pub fn new(tree: Tree<K, D, C, TARGET>) -> Self {
        Self { tree }
    }
}

impl<K, D, C, const TARGET: usize> Iterator for IntoIter<K, D, C, TARGET> {
    type Item = (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        self.tree.pop_first()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.tree.size(), Some(self.tree.size()))
    }
}

impl<K, D, C, const TARGET: usize> DoubleEndedIterator for IntoIter<K, D, C, TARGET> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.tree.pop_last()
    }
}

impl<K, D, C, const TARGET: usize> ExactSizeIterator for IntoIter<K, D, C, TARGET> {}
impl<K, D, C, const TARGET: usize> std::iter::FusedIterator for IntoIter<K, D, C, TARGET> {}
