//! Double-entry transaction engine backed by a plain-text ledger.
//!
//! The ledger files are the source of truth; a relational side-store holds
//! per-user annotations keyed by derived transaction identities. Start from
//! [`LedgerRepository`].

pub use error::LedgerError;
pub use ledger::{
    CloseDirective, Directive, LedgerStore, LoadedLedger, OpenDirective, ParseIssue,
    PriceDirective,
};
pub use metadata::MetadataRecord;
pub use posting::{Amount, Flag, Posting};
pub use repository::LedgerRepository;
pub use service::{AccountResolver, DeclaredAccounts, TransactionService};
pub use stats::{Statistics, TypeCurrencyTotal};
pub use transaction::{META_SOURCE_FILE, META_SOURCE_LINE, Transaction, TransactionType};

pub mod identity;
pub mod metadata;
pub mod users;

mod error;
mod ledger;
mod posting;
mod repository;
mod service;
mod stats;
mod transaction;

type ResultLedger<T> = Result<T, LedgerError>;
