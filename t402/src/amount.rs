//! Human-readable currency amount parsing.
//!
//! Server mechanisms accept prices like `"1.50"` or `"$0.01"` and must
//! produce atomic token amounts for payment requirements. [`MoneyAmount`]
//! does the decimal bookkeeping so mechanism implementations only supply
//! the token's decimal count.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// A price-like numeric value in human-readable currency format.
///
/// Accepts strings like `"$0.01"`, `"1,000"`, `"€20"`, or raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoneyAmount(Decimal);

/// Errors produced while parsing or scaling a [`MoneyAmount`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MoneyAmountError {
    /// The input is not a parseable number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// Negative amounts are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
    /// The amount carries more fractional digits than the token supports.
    #[error("Too much precision: {money} fractional digits vs {token} token decimals")]
    WrongPrecision {
        /// Fractional digits in the money amount.
        money: u32,
        /// Decimal places supported by the token.
        token: u32,
    },
    /// The scaled atomic value overflows.
    #[error("Amount out of range for token with {0} decimals")]
    OutOfRange(u32),
}

impl MoneyAmount {
    /// Parses a human-readable amount, ignoring currency symbols and
    /// thousands separators.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError`] if the remaining text is not a
    /// non-negative decimal number.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();

        let parsed = Decimal::from_str(&cleaned).map_err(|_| MoneyAmountError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountError::Negative);
        }

        Ok(Self(parsed))
    }

    /// Returns the number of digits after the decimal point.
    #[must_use]
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Scales the amount to an atomic integer string for a token with the
    /// given number of decimal places.
    ///
    /// `"1.50"` with 6 decimals becomes `"1500000"`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError::WrongPrecision`] if the amount has more
    /// fractional digits than the token supports, or
    /// [`MoneyAmountError::OutOfRange`] on overflow.
    pub fn to_atomic(&self, decimals: u32) -> Result<String, MoneyAmountError> {
        if self.scale() > decimals {
            return Err(MoneyAmountError::WrongPrecision {
                money: self.scale(),
                token: decimals,
            });
        }
        let mantissa = self.0.mantissa().unsigned_abs();
        let shift = decimals - self.scale();
        let factor = 10u128
            .checked_pow(shift)
            .ok_or(MoneyAmountError::OutOfRange(decimals))?;
        let atomic = mantissa
            .checked_mul(factor)
            .ok_or(MoneyAmountError::OutOfRange(decimals))?;
        Ok(atomic.to_string())
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let amount = MoneyAmount::parse("1.50").unwrap();
        assert_eq!(amount.to_string(), "1.50");
    }

    #[test]
    fn test_parse_currency_symbols() {
        assert_eq!(MoneyAmount::parse("$0.01").unwrap().to_string(), "0.01");
        assert_eq!(MoneyAmount::parse("1,000").unwrap().to_string(), "1000");
        assert_eq!(MoneyAmount::parse("€20").unwrap().to_string(), "20");
    }

    #[test]
    fn test_parse_rejects_negative() {
        assert!(matches!(
            MoneyAmount::parse("-1"),
            Err(MoneyAmountError::Negative)
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MoneyAmount::parse("abc").is_err());
    }

    #[test]
    fn test_to_atomic() {
        let amount = MoneyAmount::parse("1.50").unwrap();
        assert_eq!(amount.to_atomic(6).unwrap(), "1500000");

        let amount = MoneyAmount::parse("0.01").unwrap();
        assert_eq!(amount.to_atomic(6).unwrap(), "10000");

        let amount = MoneyAmount::parse("3").unwrap();
        assert_eq!(amount.to_atomic(0).unwrap(), "3");
    }

    #[test]
    fn test_to_atomic_precision_check() {
        let amount = MoneyAmount::parse("0.0000001").unwrap();
        assert!(matches!(
            amount.to_atomic(6),
            Err(MoneyAmountError::WrongPrecision { money: 7, token: 6 })
        ));
    }
}
