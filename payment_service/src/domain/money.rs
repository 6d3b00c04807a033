use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::error::PaymentError;

/// Calcula la comisión plana de una operación.
///
/// `round_half_even(amount * fee_rate, 2)`: redondeo bancario a dos
/// decimales, nunca aritmética flotante binaria.
pub fn commission_for(amount: Decimal, fee_rate: Decimal) -> Decimal {
    (amount * fee_rate).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Valida un monto de entrada: positivo y con a lo sumo dos decimales.
pub fn validate_amount(amount: Decimal) -> Result<(), PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::ValidationError(
            "amount must be greater than zero".to_string(),
        ));
    }
    if amount != amount.round_dp(2) {
        return Err(PaymentError::ValidationError(
            "amount supports at most two decimal places".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[rstest]
    #[case("100.00", "0.02", "2.00")]
    #[case("10.00", "0.02", "0.20")]
    // Minimum positive amount: commission rounds down to zero.
    #[case("0.01", "0.02", "0.00")]
    // Banker's rounding on the half cent: 0.015 -> 0.02, 0.025 -> 0.02.
    #[case("0.75", "0.02", "0.02")]
    #[case("1.25", "0.02", "0.02")]
    #[case("50.00", "0.02", "1.00")]
    fn commission_rounds_half_even(#[case] amount: &str, #[case] rate: &str, #[case] expected: &str) {
        assert_eq!(commission_for(dec(amount), dec(rate)), dec(expected));
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(dec("-5.00")).is_err());
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert!(validate_amount(dec("1.001")).is_err());
        assert!(validate_amount(dec("0.015")).is_err());
    }

    #[test]
    fn accepts_two_decimal_amounts() {
        assert!(validate_amount(dec("0.01")).is_ok());
        assert!(validate_amount(dec("100.50")).is_ok());
    }
}
