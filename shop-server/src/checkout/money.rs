//! Money arithmetic for checkout
//!
//! All monetary math runs on `rust_decimal::Decimal`. Binary floating
//! point never touches a price, so line totals and subtotals are exact
//! and the persisted NUMERIC values round-trip without drift.

use rust_decimal::Decimal;

/// Total for one order line: unit price times quantity, exact.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Exact sum of line totals.
pub fn subtotal(line_totals: impl IntoIterator<Item = Decimal>) -> Decimal {
    line_totals.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_line_total_exact() {
        // f64 would give 19.99 * 2 = 39.980000000000004
        assert_eq!(line_total(dec("19.99"), 2), dec("39.98"));
        assert_eq!(line_total(dec("5.00"), 1), dec("5.00"));
    }

    #[test]
    fn test_reference_order_subtotal() {
        // 19.99 x2 + 5.00 x1 = 44.98
        let lines = vec![line_total(dec("19.99"), 2), line_total(dec("5.00"), 1)];
        assert_eq!(subtotal(lines), dec("44.98"));
    }

    #[test]
    fn test_accumulation_precision() {
        // Sum 0.01 one thousand times
        let lines = std::iter::repeat_n(dec("0.01"), 1000);
        assert_eq!(subtotal(lines), dec("10.00"));
    }

    #[test]
    fn test_subtotal_of_empty_is_zero() {
        assert_eq!(subtotal(std::iter::empty()), Decimal::ZERO);
    }
}
