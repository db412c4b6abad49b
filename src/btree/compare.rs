use std::cmp::Ordering;
use std::marker::PhantomData;

/// Key ordering for the tree.
///
/// Every comparator supplies the boolean shape, `less`.  A comparator may
/// additionally advertise a three-way comparison by setting `COMPARE_TO`
/// and implementing `compare_to`; the tree then resolves exact matches
/// during descent instead of re-comparing at the leaf, which is the faster
/// path for expensive keys such as strings.  The two shapes must agree:
/// `less(a, b)` iff `compare_to(a, b) == Ordering::Less`.
///
/// A boolean comparator is never silently promoted to three-way.
pub trait Comparator<K> {
    /// True when `compare_to` is implemented.
    const COMPARE_TO: bool = false;

    /// True when per-node lookups should scan linearly instead of binary
    /// searching.  Worth setting for integer and floating-point keys,
    /// where the scan is friendlier to the branch predictor than a binary
    /// search over a short array.
    const LINEAR: bool = false;

    fn less(&self, a: &K, b: &K) -> bool;

    fn compare_to(&self, _a: &K, _b: &K) -> Ordering {
        unreachable!("comparator does not advertise a three-way comparison")
    }
}

// Boolean comparison through whichever shape the comparator advertises.
pub(crate) fn compare_keys<K, C: Comparator<K>>(comp: &C, x: &K, y: &K) -> bool {
    if C::COMPARE_TO {
        comp.compare_to(x, y) == Ordering::Less
    } else {
        comp.less(x, y)
    }
}

/// The default comparator: `Ord`-based, boolean, binary search.
pub struct Less<K>(PhantomData<fn(&K)>);

/// `Ord`-based boolean comparator that selects linear per-node search.
/// Use for integer and floating-point-like keys.
pub struct LinearLess<K>(PhantomData<fn(&K)>);

/// `Ord`-based three-way comparator.  The preferred comparator for string
/// keys: descent can stop on an exact match without a second comparison.
pub struct CompareTo<K>(PhantomData<fn(&K)>);

/// Reverses the order of any comparator, preserving its advertised
/// capabilities.
#[derive(Default, Clone, Copy, Debug)]
pub struct Reverse<C>(pub C);

/// Descending `Ord`-based comparator.
pub type Greater<K> = Reverse<Less<K>>;

macro_rules! stateless_comparator {
    ($name:ident) => {
        impl<K> Default for $name<K> {
            fn default() -> Self {
                Self(PhantomData)
            }
        }

        impl<K> Clone for $name<K> {
            fn clone(&self) -> Self {
                Self(PhantomData)
            }
        }

        impl<K> Copy for $name<K> {}

        impl<K> std::fmt::Debug for $name<K> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

stateless_comparator!(Less);
stateless_comparator!(LinearLess);
stateless_comparator!(CompareTo);

impl<K: Ord> Comparator<K> for Less<K> {
    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }
}

impl<K: Ord> Comparator<K> for LinearLess<K> {
    const LINEAR: bool = true;

    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }
}

impl<K: Ord> Comparator<K> for CompareTo<K> {
    const COMPARE_TO: bool = true;

    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }

    fn compare_to(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K, C: Comparator<K>> Comparator<K> for Reverse<C> {
    const COMPARE_TO: bool = C::COMPARE_TO;
    const LINEAR: bool = C::LINEAR;

    fn less(&self, a: &K, b: &K) -> bool {
        self.0.less(b, a)
    }

    fn compare_to(&self, a: &K, b: &K) -> Ordering {
        self.0.compare_to(b, a)
    }
}

// Turns a lower-bound comparator into an upper-bound one:
// upper(a, b) := !less(b, a).
pub(crate) struct UpperBoundAdapter<'a, C>(pub &'a C);

impl<K, C: Comparator<K>> Comparator<K> for UpperBoundAdapter<'_, C> {
    const LINEAR: bool = C::LINEAR;

    fn less(&self, a: &K, b: &K) -> bool {
        !self.0.less(b, a)
    }
}

// The three-way equivalent, collapsed to a boolean comparator so the plain
// searches can run it: upper(a, b) := compare_to(b, a) != Less.
pub(crate) struct UpperBoundCompareToAdapter<'a, C>(pub &'a C);

impl<K, C: Comparator<K>> Comparator<K> for UpperBoundCompareToAdapter<'_, C> {
    const LINEAR: bool = C::LINEAR;

    fn less(&self, a: &K, b: &K) -> bool {
        self.0.compare_to(b, a) != Ordering::Less
    }
}
