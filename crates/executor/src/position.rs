use rust_decimal::Decimal;

/// Quantity-weighted mean of an existing position and a new fill,
/// applied on add-to-position (spec invariant I4, scenario S2).
/// Mirrors the cost-basis recomputation the teacher's portfolio
/// manager used for reducing/increasing positions, specialised here
/// to the always-increasing add-buy case.
pub fn weighted_average_entry(
    existing_qty: Decimal,
    existing_entry: Decimal,
    fill_qty: Decimal,
    fill_price: Decimal,
) -> Decimal {
    let total_qty = existing_qty + fill_qty;
    if total_qty.is_zero() {
        return Decimal::ZERO;
    }
    let existing_value = existing_entry * existing_qty;
    let new_value = fill_price * fill_qty;
    (existing_value + new_value) / total_qty
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn matches_scenario_s2() {
        let entry = weighted_average_entry(dec!(0.02), dec!(4366.87), dec!(0.0166), dec!(4494.89));
        let rounded = entry.round_dp(2);
        assert_eq!(rounded, dec!(4424.93));
    }

    #[test]
    fn zero_total_quantity_is_zero() {
        let entry = weighted_average_entry(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, dec!(100));
        assert_eq!(entry, Decimal::ZERO);
    }
}
