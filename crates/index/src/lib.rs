//! Tessel Index - copy-on-write indexes for the Tessel transaction engine.
//!
//! This crate provides:
//!
//! - `RowIndex`: the ordered set of visible row numbers of a table
//! - `ColumnIndex`: value → row numbers for one column, with range queries
//! - `IndexSet`: a point-in-time snapshot of every index of one table
//!
//! All three are persistent: cloning shares storage and the first write to
//! a shared copy detaches it, so transactions can hold snapshots without
//! observing each other's uncommitted changes.
//!
//! # Example
//!
//! ```rust
//! use tessel_core::Value;
//! use tessel_index::{Index, IndexSet, KeyRange, RangeIndex};
//!
//! let mut committed = IndexSet::new(1);
//! committed.insert_row(1, &[Value::Int64(10)]);
//!
//! let mut private = committed.clone();
//! private.insert_row(2, &[Value::Int64(20)]);
//!
//! assert_eq!(committed.row_count(), 1);
//! let range = KeyRange::lower_bound(Value::Int64(15), false);
//! assert_eq!(private.column(0).unwrap().get_range(Some(&range), false, None, 0), vec![2]);
//! assert_eq!(committed.column(0).unwrap().get(&Value::Int64(10)), vec![1]);
//! ```

mod column;
mod set;
mod traits;

pub use column::ColumnIndex;
pub use set::{IndexSet, RowIndex};
pub use traits::{Index, KeyRange, RangeIndex};
