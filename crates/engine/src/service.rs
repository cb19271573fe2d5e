//! Transaction-level policy: account existence, duplicate detection,
//! classification.
//!
//! Structural invariants (balance, posting shape) live on the types
//! themselves; this service applies the policies that need context beyond a
//! single transaction.

use std::collections::{HashMap, HashSet};

use crate::ledger::Directive;
use crate::posting::survives_two_dp;
use crate::transaction::TransactionType;
use crate::{LedgerError, ResultLedger, Transaction, identity};

/// Account-existence oracle consumed by the validation policy.
///
/// The ledger's own open/close directives provide the default implementation
/// ([`DeclaredAccounts`]); embedding services may plug in their own.
pub trait AccountResolver {
    fn exists(&self, account: &str) -> bool;
}

/// Accounts declared by the loaded ledger: opened and not closed.
#[derive(Debug, Default)]
pub struct DeclaredAccounts {
    open: HashSet<String>,
    closed: HashSet<String>,
}

impl DeclaredAccounts {
    #[must_use]
    pub fn from_directives(directives: &[Directive]) -> Self {
        let mut accounts = Self::default();
        for directive in directives {
            match directive {
                Directive::Open(open) => {
                    accounts.open.insert(open.account.clone());
                }
                Directive::Close(close) => {
                    accounts.closed.insert(close.account.clone());
                }
                _ => {}
            }
        }
        accounts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl AccountResolver for DeclaredAccounts {
    fn exists(&self, account: &str) -> bool {
        self.open.contains(account) && !self.closed.contains(account)
    }
}

/// Validation policy applied before a transaction reaches the ledger files.
#[derive(Debug, Default)]
pub struct TransactionService {
    allow_duplicates: bool,
}

impl TransactionService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept transactions whose identity already exists in the cache.
    /// Legitimate duplicates (same shop, same day, same amount) do happen.
    #[must_use]
    pub fn allowing_duplicates(mut self) -> Self {
        self.allow_duplicates = true;
        self
    }

    /// Validates a transaction against policy and returns its resolved
    /// identity. Runs before any I/O; a failure leaves nothing applied.
    pub fn validate(
        &self,
        tx: &Transaction,
        accounts: &dyn AccountResolver,
        cache: &HashMap<String, Transaction>,
    ) -> ResultLedger<String> {
        for posting in &tx.postings {
            if !accounts.exists(&posting.account) {
                return Err(LedgerError::Validation(format!(
                    "account not declared in the ledger: {}",
                    posting.account
                )));
            }
            // Posting fields are public; serializability must hold at the
            // point of persistence, not just at construction.
            if posting.amount.is_zero() || !survives_two_dp(posting.amount) {
                return Err(LedgerError::Validation(format!(
                    "amount on {} cannot be written with two decimal places: {}",
                    posting.account, posting.amount
                )));
            }
        }

        let id = identity::resolve(tx);
        if !self.allow_duplicates && cache.contains_key(&id) {
            return Err(LedgerError::Validation(format!(
                "duplicate transaction, identity {id} already exists"
            )));
        }
        Ok(id)
    }

    #[must_use]
    pub fn classify(&self, tx: &Transaction) -> TransactionType {
        tx.detect_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::directive::{CloseDirective, OpenDirective};
    use crate::posting::{Flag, Posting};
    use chrono::NaiveDate;

    fn open(account: &str) -> Directive {
        Directive::Open(OpenDirective {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            account: account.to_string(),
            currencies: Vec::new(),
        })
    }

    fn sample() -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            Flag::Cleared,
            None,
            Some("lunch".to_string()),
            vec![
                Posting::new("Expenses:Food", "50".parse().unwrap(), "CNY").unwrap(),
                Posting::new("Assets:Cash", "-50".parse().unwrap(), "CNY").unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn closed_accounts_stop_existing() {
        let directives = vec![
            open("Assets:Cash"),
            Directive::Close(CloseDirective {
                date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                account: "Assets:Cash".to_string(),
            }),
        ];
        let accounts = DeclaredAccounts::from_directives(&directives);
        assert!(!accounts.exists("Assets:Cash"));
        assert!(!accounts.exists("Assets:Bank"));
    }

    #[test]
    fn undeclared_account_fails_validation() {
        let accounts = DeclaredAccounts::from_directives(&[open("Assets:Cash")]);
        let service = TransactionService::new();
        let err = service
            .validate(&sample(), &accounts, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(err.to_string().contains("Expenses:Food"));
    }

    #[test]
    fn duplicate_identity_is_rejected_unless_allowed() {
        let accounts =
            DeclaredAccounts::from_directives(&[open("Assets:Cash"), open("Expenses:Food")]);
        let service = TransactionService::new();

        let id = service
            .validate(&sample(), &accounts, &HashMap::new())
            .unwrap();
        let mut cache = HashMap::new();
        cache.insert(id.clone(), sample());

        let err = service.validate(&sample(), &accounts, &cache).unwrap_err();
        assert!(err.to_string().contains(&id));

        let lenient = TransactionService::new().allowing_duplicates();
        assert_eq!(lenient.validate(&sample(), &accounts, &cache).unwrap(), id);
    }
}
