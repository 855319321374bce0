use std::cmp::Ordering;
use crate::datastore::entry_ref::EntryRef;

/// Orders dictionary keys by the values they refer to.
///
/// Keys are entry refs; the comparator resolves them through the backing store. The
/// invalid ref stands for the comparator's own probe value, so lookups can compare a
/// value that has not been stored yet against stored keys.
pub trait EntryComparator {
    fn compare(&self, lhs: EntryRef, rhs: EntryRef) -> Ordering;

    /// Ordering that ignores case for strings. Numeric values order as in `compare`.
    fn compare_folded(&self, lhs: EntryRef, rhs: EntryRef) -> Ordering;

    /// Must agree with `compare_folded` equality, which implies `compare` equality.
    fn hash(&self, r: EntryRef) -> u64;

    fn less(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.compare(lhs, rhs) == Ordering::Less
    }

    fn equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.compare(lhs, rhs) == Ordering::Equal
    }

    fn folded_equal(&self, lhs: EntryRef, rhs: EntryRef) -> bool {
        self.compare_folded(lhs, rhs) == Ordering::Equal
    }
}
