//! Conversion between human decimal amounts and on-chain base units.

use crate::error::HtkError;
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;

/// Decimals assumed when a token's own value is unknown (ether-style units).
pub const DEFAULT_DECIMALS: u8 = 18;

/// Largest number of decimals whose scale factor still fits in a `U256`.
const MAX_DECIMALS: u8 = 77;

/// Checks that `input` is a non-negative decimal number, independent of any
/// token's decimals. Performs no I/O.
pub fn validate(input: &str) -> Result<(), HtkError> {
    split_decimal(input).map(|_| ())
}

fn split_decimal(input: &str) -> Result<(&str, &str), HtkError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(HtkError::invalid_amount(input, "amount is empty"));
    }
    if trimmed.starts_with('-') {
        return Err(HtkError::invalid_amount(input, "amount must not be negative"));
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(HtkError::invalid_amount(input, "amount has no digits"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(HtkError::invalid_amount(input, "amount is not a decimal number"));
    }
    Ok((whole, fraction))
}

/// Parses a non-negative decimal string such as `"12.5"` into base units.
///
/// Signs, exponents, separators, and more fractional digits than `decimals`
/// are all rejected with [`HtkError::InvalidAmount`].
pub fn to_base_units(input: &str, decimals: u8) -> Result<U256, HtkError> {
    let (whole, fraction) = split_decimal(input)?;
    if decimals > MAX_DECIMALS {
        return Err(HtkError::invalid_amount(
            input,
            format!("{decimals} decimals is out of range"),
        ));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(HtkError::invalid_amount(
            input,
            format!("more than {decimals} fractional digits"),
        ));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(fraction);
    digits.extend(std::iter::repeat_n('0', decimals as usize - fraction.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10)
        .map_err(|_| HtkError::invalid_amount(input, "amount exceeds the 256-bit range"))
}

/// Renders base units as a decimal string with exactly `decimals` fractional
/// digits, the inverse of [`to_base_units`].
pub fn from_base_units(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(s: &str) -> U256 {
        U256::from_str_radix(s, 10).unwrap()
    }

    #[test]
    fn whole_amount_scales_to_base_units() {
        assert_eq!(to_base_units("100", 18).unwrap(), wei("100000000000000000000"));
        assert_eq!(to_base_units("7", 0).unwrap(), U256::from(7));
    }

    #[test]
    fn fractional_amounts() {
        assert_eq!(to_base_units("1.5", 6).unwrap(), U256::from(1_500_000));
        assert_eq!(to_base_units(".25", 2).unwrap(), U256::from(25));
        assert_eq!(to_base_units("3.", 2).unwrap(), U256::from(300));
        assert_eq!(to_base_units("0.100", 1).unwrap(), U256::from(1));
        assert_eq!(to_base_units(" 0 ", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["-5", "", "   ", ".", "1e18", "1,000", "abc", "1.2.3", "+1", "0x10"] {
            let err = to_base_units(input, 18).unwrap_err();
            assert_eq!(err.kind(), "invalid_amount", "input {input:?}");
        }
    }

    #[test]
    fn validate_checks_shape_without_decimals() {
        assert!(validate("12.5").is_ok());
        assert!(validate("0.000000000000000000000001").is_ok());
        assert_eq!(validate("-5").unwrap_err().kind(), "invalid_amount");
        assert_eq!(validate("1e3").unwrap_err().kind(), "invalid_amount");
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(to_base_units("0.001", 2).is_err());
        assert!(to_base_units("1.5", 0).is_err());
    }

    #[test]
    fn rejects_overflow() {
        let too_big = format!("{}0", U256::MAX);
        assert!(to_base_units(&too_big, 0).is_err());
        assert!(to_base_units("1", 78).is_err());
    }

    #[test]
    fn formatting_then_parsing_is_lossless() {
        let samples = [
            U256::ZERO,
            U256::from(1),
            U256::from(999_999_999u64),
            wei("1000000000000000000"),
            wei("123456789012345678901234567890"),
            U256::MAX,
        ];
        for decimals in [0u8, 6, 18] {
            for value in samples {
                let text = from_base_units(value, decimals);
                assert_eq!(
                    to_base_units(&text, decimals).unwrap(),
                    value,
                    "value {value} at {decimals} decimals rendered as {text}"
                );
            }
        }
    }
}
