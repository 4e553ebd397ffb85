//! Index trait definitions for Tessel.

use core::ops::Bound;
use tessel_core::RowNumber;

/// A key range for index queries.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyRange<K> {
    /// All keys
    All,
    /// A single key (equality)
    Only(K),
    /// Keys >= lower bound
    LowerBound { value: K, exclusive: bool },
    /// Keys <= upper bound
    UpperBound { value: K, exclusive: bool },
    /// Keys between lower and upper bounds
    Bound {
        lower: K,
        upper: K,
        lower_exclusive: bool,
        upper_exclusive: bool,
    },
}

impl<K: Clone + Ord> KeyRange<K> {
    pub fn all() -> Self {
        KeyRange::All
    }

    pub fn only(key: K) -> Self {
        KeyRange::Only(key)
    }

    pub fn lower_bound(value: K, exclusive: bool) -> Self {
        KeyRange::LowerBound { value, exclusive }
    }

    pub fn upper_bound(value: K, exclusive: bool) -> Self {
        KeyRange::UpperBound { value, exclusive }
    }

    pub fn bound(lower: K, upper: K, lower_exclusive: bool, upper_exclusive: bool) -> Self {
        KeyRange::Bound {
            lower,
            upper,
            lower_exclusive,
            upper_exclusive,
        }
    }

    /// Returns true if no key can fall in this range.
    pub fn is_empty(&self) -> bool {
        match self {
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => lower > upper || (lower == upper && (*lower_exclusive || *upper_exclusive)),
            _ => false,
        }
    }

    /// Converts the range to `std::ops::Bound` pairs for ordered map lookups.
    pub fn bounds(&self) -> (Bound<&K>, Bound<&K>) {
        fn edge<K>(value: &K, exclusive: bool) -> Bound<&K> {
            if exclusive {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            }
        }
        match self {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(k) => (Bound::Included(k), Bound::Included(k)),
            KeyRange::LowerBound { value, exclusive } => (edge(value, *exclusive), Bound::Unbounded),
            KeyRange::UpperBound { value, exclusive } => (Bound::Unbounded, edge(value, *exclusive)),
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => (edge(lower, *lower_exclusive), edge(upper, *upper_exclusive)),
        }
    }

    /// Checks if a key is within this range.
    pub fn contains(&self, key: &K) -> bool {
        use core::ops::RangeBounds;
        !self.is_empty() && self.bounds().contains(key)
    }
}

/// Core trait for keyed index implementations.
pub trait Index<K> {
    /// Adds a key/row pair. Adding an existing pair is a no-op.
    fn insert(&mut self, key: K, row: RowNumber);

    /// Removes a key/row pair. Returns whether the pair was present.
    fn remove(&mut self, key: &K, row: RowNumber) -> bool;

    /// Gets all rows associated with a key, in row order.
    fn get(&self, key: &K) -> Vec<RowNumber>;

    fn contains_key(&self, key: &K) -> bool;

    /// Number of key/row pairs.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// Trait for indexes that support range queries.
pub trait RangeIndex<K>: Index<K> {
    /// Gets all rows within the given key range, ordered by key then row.
    fn get_range(
        &self,
        range: Option<&KeyRange<K>>,
        reverse: bool,
        limit: Option<usize>,
        skip: usize,
    ) -> Vec<RowNumber>;
}
