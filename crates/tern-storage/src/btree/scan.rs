//! Range scan operators and cursor state.

use tern_common::page::PageId;

/// Comparison operator for a scan endpoint.
///
/// Only `GT`/`GTE` are accepted as the low-bound operator and only
/// `LT`/`LTE` as the high-bound operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Strictly greater than the low bound.
    GT,
    /// Greater than or equal to the low bound.
    GTE,
    /// Strictly less than the high bound.
    LT,
    /// Less than or equal to the high bound.
    LTE,
}

impl Operator {
    /// Returns true if this operator may bound a scan from below.
    pub fn is_low_op(&self) -> bool {
        matches!(self, Operator::GT | Operator::GTE)
    }

    /// Returns true if this operator may bound a scan from above.
    pub fn is_high_op(&self) -> bool {
        matches!(self, Operator::LT | Operator::LTE)
    }
}

/// Returns true if a key satisfies the scan's low bound.
pub(crate) fn satisfies_low(key: i32, low: i32, op: Operator) -> bool {
    match op {
        Operator::GT => key > low,
        Operator::GTE => key >= low,
        _ => false,
    }
}

/// Returns true if a key satisfies the scan's high bound.
pub(crate) fn satisfies_high(key: i32, high: i32, op: Operator) -> bool {
    match op {
        Operator::LT => key < high,
        Operator::LTE => key <= high,
        _ => false,
    }
}

/// Cursor state of a live scan.
///
/// `next_entry` is the slot of the next match in `current_page`; `None`
/// means the cursor is exhausted and the next advance fails with
/// `IndexScanCompleted`. The cursor never holds a page pinned between
/// calls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanState {
    /// Leaf the cursor is positioned on.
    pub(crate) current_page: PageId,
    /// Slot of the next entry to emit, or None when done.
    pub(crate) next_entry: Option<usize>,
    /// Inclusive-or-exclusive lower key bound.
    pub(crate) low: i32,
    /// Inclusive-or-exclusive upper key bound.
    pub(crate) high: i32,
    /// Operator applied to the low bound.
    pub(crate) low_op: Operator,
    /// Operator applied to the high bound.
    pub(crate) high_op: Operator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_sets() {
        assert!(Operator::GT.is_low_op());
        assert!(Operator::GTE.is_low_op());
        assert!(!Operator::LT.is_low_op());
        assert!(!Operator::LTE.is_low_op());

        assert!(Operator::LT.is_high_op());
        assert!(Operator::LTE.is_high_op());
        assert!(!Operator::GT.is_high_op());
        assert!(!Operator::GTE.is_high_op());
    }

    #[test]
    fn test_satisfies_low() {
        assert!(!satisfies_low(10, 10, Operator::GT));
        assert!(satisfies_low(11, 10, Operator::GT));
        assert!(satisfies_low(10, 10, Operator::GTE));
        assert!(!satisfies_low(9, 10, Operator::GTE));
    }

    #[test]
    fn test_satisfies_high() {
        assert!(!satisfies_high(10, 10, Operator::LT));
        assert!(satisfies_high(9, 10, Operator::LT));
        assert!(satisfies_high(10, 10, Operator::LTE));
        assert!(!satisfies_high(11, 10, Operator::LTE));
    }

    #[test]
    fn test_bounds_reject_wrong_kind() {
        // A high operator never satisfies a low bound and vice versa.
        assert!(!satisfies_low(100, 0, Operator::LT));
        assert!(!satisfies_high(0, 100, Operator::GTE));
    }
}
