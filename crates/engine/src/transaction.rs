//! Transaction aggregate.
//!
//! A [`Transaction`] is an ordered list of at least two [`Posting`]s dated on
//! a single day. Construction enforces the double-entry invariant: for every
//! currency among its postings, the signed sum must stay within ±0.01 of
//! zero. A posting with a cost or price annotation counts at its converted
//! value in the annotation currency.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::posting::{Flag, Posting};
use crate::{LedgerError, ResultLedger};

/// Reserved metadata key holding the ledger file a transaction was parsed
/// from.
pub const META_SOURCE_FILE: &str = "source_file";
/// Reserved metadata key holding the 1-based header line number.
pub const META_SOURCE_LINE: &str = "source_line";

/// Per-currency tolerance for the double-entry balance check.
pub(crate) fn balance_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Classification of a transaction by the root account categories it touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Expense,
    Income,
    Transfer,
    Opening,
    Other,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
            Self::Opening => "opening",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for TransactionType {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            "opening" => Ok(Self::Opening),
            "other" => Ok(Self::Other),
            other => Err(LedgerError::Validation(format!(
                "invalid transaction type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identity, assigned on first persistence (see
    /// [`identity`](crate::identity)). `None` for a transaction that was
    /// never written to the ledger.
    pub id: Option<String>,
    pub date: NaiveDate,
    pub flag: Flag,
    pub payee: Option<String>,
    pub description: Option<String>,
    pub postings: Vec<Posting>,
    pub tags: BTreeSet<String>,
    pub links: BTreeSet<String>,
    /// Free-form metadata; [`META_SOURCE_FILE`] and [`META_SOURCE_LINE`] are
    /// reserved for the physical location once persisted.
    pub meta: BTreeMap<String, String>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        flag: Flag,
        payee: Option<String>,
        description: Option<String>,
        postings: Vec<Posting>,
    ) -> ResultLedger<Self> {
        if postings.len() < 2 {
            return Err(LedgerError::Validation(format!(
                "a transaction needs at least two postings, got {}",
                postings.len()
            )));
        }
        check_balance(&postings)?;
        Ok(Self {
            id: None,
            date,
            flag,
            payee,
            description,
            postings,
            tags: BTreeSet::new(),
            links: BTreeSet::new(),
            meta: BTreeMap::new(),
        })
    }

    /// Classifies the transaction by the root categories its postings touch.
    ///
    /// First matching rule wins: Expenses, then Income, then pure
    /// Assets/Liabilities transfers, then Equity openings, everything else
    /// is `Other`.
    #[must_use]
    pub fn detect_type(&self) -> TransactionType {
        let roots: BTreeSet<&str> = self.postings.iter().map(Posting::root).collect();
        if roots.contains("Expenses") {
            TransactionType::Expense
        } else if roots.contains("Income") {
            TransactionType::Income
        } else if roots.iter().all(|r| *r == "Assets" || *r == "Liabilities") {
            TransactionType::Transfer
        } else if roots.contains("Equity") {
            TransactionType::Opening
        } else {
            TransactionType::Other
        }
    }

    pub fn add_tag(&mut self, tag: &str) -> ResultLedger<()> {
        if tag.trim().is_empty() {
            return Err(LedgerError::Validation("empty tag".to_string()));
        }
        self.tags.insert(tag.trim().to_string());
        Ok(())
    }

    pub fn add_link(&mut self, link: &str) -> ResultLedger<()> {
        if link.trim().is_empty() {
            return Err(LedgerError::Validation("empty link".to_string()));
        }
        self.links.insert(link.trim().to_string());
        Ok(())
    }

    /// Physical location of the source block, when persisted: `(file, 1-based
    /// header line)`.
    #[must_use]
    pub fn source_location(&self) -> Option<(String, usize)> {
        let file = self.meta.get(META_SOURCE_FILE)?;
        let line = self.meta.get(META_SOURCE_LINE)?.parse().ok()?;
        Some((file.clone(), line))
    }

    pub(crate) fn set_source_location(&mut self, file: &str, line: usize) {
        self.meta
            .insert(META_SOURCE_FILE.to_string(), file.to_string());
        self.meta
            .insert(META_SOURCE_LINE.to_string(), line.to_string());
    }

    /// Content equality used by the fallback scan and the round-trip tests:
    /// date, flag, payee, description and the postings' (account, amount,
    /// currency) as a multiset.
    #[must_use]
    pub fn content_matches(&self, other: &Transaction) -> bool {
        self.date == other.date
            && self.flag == other.flag
            && self.payee == other.payee
            && self.description == other.description
            && self.posting_signature() == other.posting_signature()
    }

    fn posting_signature(&self) -> Vec<(String, Decimal, String)> {
        let mut sig: Vec<_> = self
            .postings
            .iter()
            .map(|p| (p.account.clone(), p.amount, p.currency.clone()))
            .collect();
        sig.sort();
        sig
    }
}

fn check_balance(postings: &[Posting]) -> ResultLedger<()> {
    let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();
    for posting in postings {
        // A posting held at cost (or with a price) weighs in at its
        // converted value, in the conversion currency.
        let (value, currency) = match (&posting.cost, &posting.price) {
            (Some(cost), _) => (posting.amount * cost.value, cost.currency.as_str()),
            (None, Some(price)) => (posting.amount * price.value, price.currency.as_str()),
            (None, None) => (posting.amount, posting.currency.as_str()),
        };
        *sums.entry(currency).or_default() += value;
    }

    let offenders: Vec<String> = sums
        .iter()
        .filter(|(_, sum)| sum.abs() > balance_tolerance())
        .map(|(currency, sum)| format!("{currency} off by {sum}"))
        .collect();
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(LedgerError::Balance(offenders.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn posting(account: &str, amount: &str, currency: &str) -> Posting {
        Posting::new(account, dec(amount), currency).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn requires_two_postings() {
        let err = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![posting("Assets:Cash", "10", "EUR")],
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn balances_within_tolerance() {
        let tx = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            Some("rounding".to_string()),
            vec![
                posting("Expenses:Food", "33.33", "EUR"),
                posting("Assets:Cash", "-33.34", "EUR"),
            ],
        );
        assert!(tx.is_ok());
    }

    #[test]
    fn unbalanced_names_the_currency() {
        let err = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![
                posting("Expenses:Food", "50.00", "CNY"),
                posting("Assets:Cash", "-40.00", "CNY"),
            ],
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::Balance("CNY off by 10.00".to_string()));
    }

    #[test]
    fn cost_annotations_balance_in_the_cost_currency() {
        let broker = |cost: &str| {
            Posting::new("Assets:Broker", dec("2.00"), "BTC")
                .unwrap()
                .with_cost(dec(cost), "USD")
                .unwrap()
        };
        let tx = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            Some("buy".to_string()),
            vec![broker("30000.00"), posting("Assets:Bank", "-60000.00", "USD")],
        );
        assert!(tx.is_ok());

        let err = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![broker("25000.00"), posting("Assets:Bank", "-60000.00", "USD")],
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Balance(_)));
    }

    #[test]
    fn balances_per_currency_independently() {
        let tx = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![
                posting("Assets:Broker", "100.00", "USD"),
                posting("Assets:Bank", "-100.00", "USD"),
                posting("Expenses:Fees", "5.00", "EUR"),
                posting("Assets:Bank", "-5.00", "EUR"),
            ],
        );
        assert!(tx.is_ok());
    }

    #[test]
    fn detect_type_priority() {
        let cases = [
            (
                vec![
                    posting("Expenses:Food", "50", "CNY"),
                    posting("Assets:Cash", "-50", "CNY"),
                ],
                TransactionType::Expense,
            ),
            (
                vec![
                    posting("Assets:Bank", "100", "CNY"),
                    posting("Income:Salary", "-100", "CNY"),
                ],
                TransactionType::Income,
            ),
            (
                vec![
                    posting("Assets:Bank", "100", "CNY"),
                    posting("Assets:Cash", "-100", "CNY"),
                ],
                TransactionType::Transfer,
            ),
            (
                vec![
                    posting("Assets:Bank", "100", "CNY"),
                    posting("Equity:Opening", "-100", "CNY"),
                ],
                TransactionType::Opening,
            ),
        ];
        for (postings, expected) in cases {
            let tx = Transaction::new(date(), Flag::Cleared, None, None, postings).unwrap();
            assert_eq!(tx.detect_type(), expected);
        }
    }

    #[test]
    fn expense_wins_over_income() {
        let tx = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![
                posting("Expenses:Tax", "20", "EUR"),
                posting("Income:Salary", "-20", "EUR"),
            ],
        )
        .unwrap();
        assert_eq!(tx.detect_type(), TransactionType::Expense);
    }

    #[test]
    fn rejects_empty_tags_and_links() {
        let mut tx = Transaction::new(
            date(),
            Flag::Cleared,
            None,
            None,
            vec![
                posting("Assets:Bank", "1", "EUR"),
                posting("Assets:Cash", "-1", "EUR"),
            ],
        )
        .unwrap();
        assert!(tx.add_tag("  ").is_err());
        assert!(tx.add_link("").is_err());
        tx.add_tag("trip").unwrap();
        tx.add_link("invoice-42").unwrap();
        assert!(tx.tags.contains("trip"));
        assert!(tx.links.contains("invoice-42"));
    }
}
