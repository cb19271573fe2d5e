//! Ledger directives.
//!
//! One [`Directive`] per ledger record: account open/close, price, or a full
//! transaction. `include` lines are handled by the store while walking files
//! and never surface as directives.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Transaction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenDirective {
    pub date: NaiveDate,
    pub account: String,
    /// Currencies the account is constrained to; empty means unconstrained.
    pub currencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloseDirective {
    pub date: NaiveDate,
    pub account: String,
}

/// `YYYY-MM-DD price CUR RATE QUOTE_CUR`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceDirective {
    pub date: NaiveDate,
    pub currency: String,
    pub rate: Decimal,
    pub quote_currency: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    Open(OpenDirective),
    Close(CloseDirective),
    Price(PriceDirective),
    Transaction(Transaction),
}

impl Directive {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Open(open) => open.date,
            Self::Close(close) => close.date,
            Self::Price(price) => price.date,
            Self::Transaction(tx) => tx.date,
        }
    }

    #[must_use]
    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(tx) => Some(tx),
            _ => None,
        }
    }
}
