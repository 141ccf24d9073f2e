//! Default money conversion backed by ISO-4217 minor-unit exponents

use bigdecimal::{BigDecimal, ToPrimitive};
use std::collections::HashMap;

use crate::traits::MoneyConverter;
use crate::types::*;

const BUILTIN_EXPONENTS: &[(&str, u32)] = &[
    ("AED", 2),
    ("AUD", 2),
    ("BHD", 3),
    ("BRL", 2),
    ("CAD", 2),
    ("CHF", 2),
    ("CLP", 0),
    ("CNY", 2),
    ("EUR", 2),
    ("GBP", 2),
    ("HKD", 2),
    ("INR", 2),
    ("ISK", 0),
    ("JOD", 3),
    ("JPY", 0),
    ("KRW", 0),
    ("KWD", 3),
    ("MXN", 2),
    ("NZD", 2),
    ("OMR", 3),
    ("SEK", 2),
    ("SGD", 2),
    ("USD", 2),
    ("VND", 0),
    ("ZAR", 2),
];

/// Converts between minor units and decimal amounts.
///
/// Rates multiply when reading a decimal amount and divide when writing one;
/// both directions round half-even to a whole minor unit.
#[derive(Debug, Clone)]
pub struct Iso4217Converter {
    exponents: HashMap<String, u32>,
}

impl Iso4217Converter {
    pub fn new() -> Self {
        Self {
            exponents: BUILTIN_EXPONENTS
                .iter()
                .map(|(code, exp)| (code.to_string(), *exp))
                .collect(),
        }
    }

    /// Built-in table with `overrides` added on top
    pub fn with_exponents(overrides: &HashMap<String, u32>) -> Self {
        let mut converter = Self::new();
        for (code, exp) in overrides {
            converter.exponents.insert(code.trim().to_uppercase(), *exp);
        }
        converter
    }

    fn rate_or_one(rate: Option<&BigDecimal>) -> LedgerResult<BigDecimal> {
        match rate {
            None => Ok(BigDecimal::from(1)),
            Some(rate) if *rate > BigDecimal::from(0) => Ok(rate.clone()),
            Some(rate) => Err(LedgerError::Integrity(format!(
                "exchange rate must be greater than 0, got {}",
                rate
            ))),
        }
    }

    fn to_whole_units(value: &BigDecimal) -> LedgerResult<i64> {
        value.round(0).to_i64().ok_or_else(|| {
            LedgerError::Integrity(format!("amount {} does not fit in minor units", value))
        })
    }
}

impl Default for Iso4217Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl MoneyConverter for Iso4217Converter {
    fn minor_unit_exponent(&self, currency: &str) -> LedgerResult<u32> {
        self.exponents
            .get(&currency.trim().to_uppercase())
            .copied()
            .ok_or_else(|| LedgerError::UnsupportedCurrency(currency.to_string()))
    }

    fn minor_units_to_decimal(
        &self,
        amount_in_cents: i64,
        currency: &str,
        rate: Option<&BigDecimal>,
    ) -> LedgerResult<BigDecimal> {
        let exponent = self.minor_unit_exponent(currency)?;
        let rate = Self::rate_or_one(rate)?;
        let minor = Self::to_whole_units(&(BigDecimal::from(amount_in_cents) * rate))?;
        Ok(BigDecimal::new(minor.into(), i64::from(exponent)))
    }

    fn decimal_to_minor_units(
        &self,
        amount: &BigDecimal,
        currency: &str,
        rate: Option<&BigDecimal>,
    ) -> LedgerResult<i64> {
        let exponent = self.minor_unit_exponent(currency)?;
        let rate = Self::rate_or_one(rate)?;
        let scale = BigDecimal::new(1.into(), -i64::from(exponent));
        let minor = Self::to_whole_units(&(amount.clone() * scale))?;
        Self::to_whole_units(&(BigDecimal::from(minor) / rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_no_conversion_without_rate() {
        let converter = Iso4217Converter::new();
        assert_eq!(
            converter.minor_units_to_decimal(12_345, "USD", None).unwrap(),
            dec("123.45")
        );
        assert_eq!(
            converter.decimal_to_minor_units(&dec("543.21"), "usd", None).unwrap(),
            54_321
        );
    }

    #[test]
    fn test_conversion_with_rate() {
        let converter = Iso4217Converter::new();
        let rate = dec("0.81004");
        assert_eq!(
            converter
                .minor_units_to_decimal(12_345, "USD", Some(&rate))
                .unwrap(),
            dec("100.00")
        );
        assert_eq!(
            converter
                .decimal_to_minor_units(&dec("100"), "USD", Some(&rate))
                .unwrap(),
            12_345
        );
    }

    #[test]
    fn test_zero_exponent_currency() {
        let converter = Iso4217Converter::new();
        assert_eq!(
            converter.minor_units_to_decimal(-500, "JPY", None).unwrap(),
            dec("-500")
        );
    }

    #[test]
    fn test_unknown_currency_and_overrides() {
        let converter = Iso4217Converter::new();
        assert!(matches!(
            converter.minor_unit_exponent("XBT"),
            Err(LedgerError::UnsupportedCurrency(_))
        ));

        let overrides = HashMap::from([("xbt".to_string(), 8)]);
        let converter = Iso4217Converter::with_exponents(&overrides);
        assert_eq!(converter.minor_unit_exponent("XBT").unwrap(), 8);
        assert_eq!(
            converter.minor_units_to_decimal(1, "XBT", None).unwrap(),
            dec("0.00000001")
        );
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let converter = Iso4217Converter::new();
        let zero = BigDecimal::from(0);
        assert!(converter
            .minor_units_to_decimal(100, "USD", Some(&zero))
            .is_err());
    }
}
