//! Posting primitives.
//!
//! A [`Posting`] is a single debit/credit line inside a
//! [`Transaction`](crate::Transaction): an account, a signed decimal amount
//! and a currency, optionally tagged with a lot cost (`{..}`) or a market
//! price (`@ ..`).
//!
//! All constraints are checked on construction; a `Posting` that exists is a
//! valid one.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, ResultLedger};

/// Directive flag: cleared (`*`) or pending (`!`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    #[default]
    Cleared,
    Pending,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cleared => "*",
            Self::Pending => "!",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Flag {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "*" => Ok(Self::Cleared),
            "!" => Ok(Self::Pending),
            other => Err(LedgerError::Validation(format!("invalid flag: {other}"))),
        }
    }
}

/// A decimal value paired with the currency it is denominated in.
///
/// Cost and price annotations use this type, which makes the spec's
/// "value and currency are present together or absent together" invariant
/// structural instead of checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: Decimal,
    pub currency: String,
}

impl Amount {
    pub fn new(value: Decimal, currency: &str) -> ResultLedger<Self> {
        if !survives_two_dp(value) {
            return Err(LedgerError::Validation(format!(
                "value finer than two decimal places: {value}"
            )));
        }
        Ok(Self {
            value,
            currency: normalize_currency(currency)?,
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// One debit/credit line of a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Colon-delimited hierarchical account key, e.g. `Expenses:Food:Dining`.
    pub account: String,
    /// Signed amount; positive is a debit, negative a credit. Never zero.
    pub amount: Decimal,
    /// Normalized uppercase currency code, 2-10 characters.
    pub currency: String,
    /// Lot cost per unit (`{COST CUR}`).
    pub cost: Option<Amount>,
    /// Market value per unit (`@ PRICE CUR`).
    pub price: Option<Amount>,
    pub flag: Option<Flag>,
    /// Free-form metadata attached to this posting line.
    pub meta: BTreeMap<String, String>,
}

impl Posting {
    pub fn new(account: &str, amount: Decimal, currency: &str) -> ResultLedger<Self> {
        validate_account(account)?;
        if amount.is_zero() {
            return Err(LedgerError::Validation(format!(
                "zero amount posting on {account}"
            )));
        }
        if !survives_two_dp(amount) {
            return Err(LedgerError::Validation(format!(
                "amount finer than two decimal places on {account}: {amount}"
            )));
        }
        Ok(Self {
            account: account.to_string(),
            amount,
            currency: normalize_currency(currency)?,
            cost: None,
            price: None,
            flag: None,
            meta: BTreeMap::new(),
        })
    }

    pub fn with_cost(mut self, value: Decimal, currency: &str) -> ResultLedger<Self> {
        self.cost = Some(Amount::new(value, currency)?);
        Ok(self)
    }

    pub fn with_price(mut self, value: Decimal, currency: &str) -> ResultLedger<Self> {
        self.price = Some(Amount::new(value, currency)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Root account category, e.g. `Expenses` for `Expenses:Food`.
    #[must_use]
    pub fn root(&self) -> &str {
        self.account.split(':').next().unwrap_or(&self.account)
    }

    #[must_use]
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_positive()
    }

    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.amount.is_sign_negative()
    }

    #[must_use]
    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    /// Total lot cost: `|amount| × cost`, in the cost currency.
    #[must_use]
    pub fn total_cost(&self) -> Option<Amount> {
        self.cost.as_ref().map(|cost| Amount {
            value: self.abs_amount() * cost.value,
            currency: cost.currency.clone(),
        })
    }

    /// Total market value: `|amount| × price`, in the price currency.
    #[must_use]
    pub fn total_value(&self) -> Option<Amount> {
        self.price.as_ref().map(|price| Amount {
            value: self.abs_amount() * price.value,
            currency: price.currency.clone(),
        })
    }
}

/// True when a value can be written with two decimal places and read back
/// unchanged. Ledger text is the authoritative store, so values the text
/// cannot hold are invalid.
pub(crate) fn survives_two_dp(value: Decimal) -> bool {
    value.normalize().scale() <= 2
}

/// Uppercases and validates a currency code (2-10 chars, `A-Z0-9`, letter
/// first).
pub(crate) fn normalize_currency(code: &str) -> ResultLedger<String> {
    let normalized = code.trim().to_ascii_uppercase();
    let len = normalized.chars().count();
    if !(2..=10).contains(&len) {
        return Err(LedgerError::Validation(format!(
            "currency must be 2-10 characters: {code:?}"
        )));
    }
    let mut chars = normalized.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    if !first_ok || !normalized.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(LedgerError::Validation(format!(
            "invalid currency code: {code:?}"
        )));
    }
    Ok(normalized)
}

pub(crate) fn validate_account(account: &str) -> ResultLedger<()> {
    if account.is_empty() {
        return Err(LedgerError::Validation("empty account".to_string()));
    }
    if account.chars().any(char::is_whitespace) {
        return Err(LedgerError::Validation(format!(
            "account contains whitespace: {account:?}"
        )));
    }
    if account.split(':').any(str::is_empty) {
        return Err(LedgerError::Validation(format!(
            "empty account segment: {account:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_zero_amount_and_bad_accounts() {
        assert!(Posting::new("Assets:Cash", Decimal::ZERO, "EUR").is_err());
        assert!(Posting::new("", dec("1"), "EUR").is_err());
        assert!(Posting::new("Assets::Cash", dec("1"), "EUR").is_err());
        assert!(Posting::new("Assets :Cash", dec("1"), "EUR").is_err());
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert!(Posting::new("Assets:Cash", dec("0.005"), "CNY").is_err());
        assert!(Posting::new("Assets:Cash", dec("10.004"), "CNY").is_err());
        // Trailing zeros are harmless, the normalized value fits.
        assert!(Posting::new("Assets:Cash", dec("10.500"), "CNY").is_ok());
        let err = Posting::new("Assets:Broker", dec("2.00"), "BTC")
            .unwrap()
            .with_cost(dec("30000.001"), "USD");
        assert!(err.is_err());
    }

    #[test]
    fn normalizes_currency() {
        let posting = Posting::new("Assets:Cash", dec("10"), " cny ").unwrap();
        assert_eq!(posting.currency, "CNY");
        assert!(Posting::new("Assets:Cash", dec("10"), "E").is_err());
        assert!(Posting::new("Assets:Cash", dec("10"), "TOOLONGCODE").is_err());
        assert!(Posting::new("Assets:Cash", dec("10"), "1EUR").is_err());
    }

    #[test]
    fn debit_credit_and_totals() {
        let posting = Posting::new("Assets:Broker", dec("-2"), "BTC")
            .unwrap()
            .with_cost(dec("30000.00"), "USD")
            .unwrap()
            .with_price(dec("31000.00"), "USD")
            .unwrap();
        assert!(posting.is_credit());
        assert!(!posting.is_debit());
        assert_eq!(posting.abs_amount(), dec("2"));
        assert_eq!(posting.total_cost().unwrap().value, dec("60000.00"));
        assert_eq!(posting.total_value().unwrap().value, dec("62000.00"));
        assert_eq!(posting.total_value().unwrap().currency, "USD");
    }

    #[test]
    fn flag_round_trips() {
        assert_eq!(Flag::try_from("*").unwrap(), Flag::Cleared);
        assert_eq!(Flag::try_from("!").unwrap(), Flag::Pending);
        assert_eq!(Flag::Pending.as_str(), "!");
        assert!(Flag::try_from("x").is_err());
    }
}
