//! Aggregated counts and sums for reporting collaborators.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Transaction;
use crate::transaction::TransactionType;

/// One statistics bucket: all transactions of a type touching a currency.
///
/// `total` sums the debit (positive) side of each transaction in that
/// currency, so a 50.00 CNY expense contributes 50.00 rather than zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCurrencyTotal {
    pub tx_type: TransactionType,
    pub currency: String,
    pub count: usize,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of transactions in the requested window.
    pub transactions: usize,
    /// Buckets ordered by type, then currency.
    pub totals: Vec<TypeCurrencyTotal>,
}

impl Statistics {
    pub(crate) fn collect<'a>(transactions: impl Iterator<Item = &'a Transaction>) -> Self {
        let mut buckets: BTreeMap<(TransactionType, String), (usize, Decimal)> = BTreeMap::new();
        let mut total_count = 0;

        for tx in transactions {
            total_count += 1;
            let tx_type = tx.detect_type();

            let mut debits: BTreeMap<&str, Decimal> = BTreeMap::new();
            for posting in tx.postings.iter().filter(|p| p.is_debit()) {
                *debits.entry(posting.currency.as_str()).or_default() += posting.amount;
            }
            for (currency, sum) in debits {
                let entry = buckets
                    .entry((tx_type, currency.to_string()))
                    .or_default();
                entry.0 += 1;
                entry.1 += sum;
            }
        }

        Self {
            transactions: total_count,
            totals: buckets
                .into_iter()
                .map(|((tx_type, currency), (count, total))| TypeCurrencyTotal {
                    tx_type,
                    currency,
                    count,
                    total,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{Flag, Posting};
    use chrono::NaiveDate;

    fn tx(day: u32, debit: &str, credit: &str, amount: &str, currency: &str) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            Flag::Cleared,
            None,
            None,
            vec![
                Posting::new(debit, amount.parse().unwrap(), currency).unwrap(),
                Posting::new(credit, format!("-{amount}").parse().unwrap(), currency).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn groups_by_type_and_currency() {
        let txs = vec![
            tx(1, "Expenses:Food", "Assets:Cash", "50.00", "CNY"),
            tx(2, "Expenses:Food", "Assets:Cash", "30.00", "CNY"),
            tx(3, "Expenses:Hotel", "Assets:Cash", "90.00", "USD"),
            tx(4, "Assets:Bank", "Income:Salary", "1000.00", "CNY"),
        ];
        let stats = Statistics::collect(txs.iter());

        assert_eq!(stats.transactions, 4);
        assert_eq!(stats.totals.len(), 3);

        let food_cny = &stats.totals[0];
        assert_eq!(food_cny.tx_type, TransactionType::Expense);
        assert_eq!(food_cny.currency, "CNY");
        assert_eq!(food_cny.count, 2);
        assert_eq!(food_cny.total, "80.00".parse().unwrap());

        let income = stats
            .totals
            .iter()
            .find(|t| t.tx_type == TransactionType::Income)
            .unwrap();
        assert_eq!(income.total, "1000.00".parse().unwrap());
    }

    #[test]
    fn empty_input_is_empty_statistics() {
        let stats = Statistics::collect(std::iter::empty());
        assert_eq!(stats.transactions, 0);
        assert!(stats.totals.is_empty());
    }
}
