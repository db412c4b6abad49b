//! # Ordered containers on a B-tree of values
//!
//! `packed-btree` provides [`BTreeSet`], [`BTreeMap`], [`BTreeMultiSet`]
//! and [`BTreeMultiMap`], all backed by one B-tree engine that stores the
//! values themselves in every node.  Nodes are sized to a byte budget
//! (256 by default) and leaves carry no child pointers, so the per-entry
//! overhead and the number of cache lines touched per lookup are far lower
//! than in a red-black tree.
//!
//! The node budget is a type parameter, and the comparator is a type with
//! two optional capabilities: a three-way comparison (worth it for string
//! keys, see [`CompareTo`]) and a linear per-node search (worth it for
//! integer keys, see [`LinearLess`]).
//!
//! Multi-variants keep every insertion; equal keys iterate in insertion
//! order.  Mutation invalidates outstanding iterators, which the borrow
//! checker enforces at compile time.

pub mod btree;

pub use btree::btree_map::BTreeMap;
pub use btree::btree_multimap::BTreeMultiMap;
pub use btree::btree_multiset::BTreeMultiSet;
pub use btree::btree_set::BTreeSet;
pub use btree::compare::{Comparator, CompareTo, Greater, Less, LinearLess, Reverse};
pub use btree::DEFAULT_TARGET_NODE_SIZE;
