//! The module contains the errors the ledger engine can throw.
//!
//! Absence is not an error here: read misses return `None` and delete misses
//! return `false`. Parse problems found during a reload are accumulated as
//! [`ParseIssue`](crate::ledger::ParseIssue)s instead of aborting the load.

use sea_orm::DbErr;
use thiserror::Error;

/// Ledger engine custom errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A domain constraint was violated before any I/O happened.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The double-entry invariant does not hold; the message names each
    /// offending currency and its residual.
    #[error("unbalanced transaction: {0}")]
    Balance(String),
    /// A stored file/line location no longer matches the ledger text,
    /// usually because the file was edited out-of-band since the last reload.
    #[error("stale location: {0}")]
    StaleLocation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::Balance(a), Self::Balance(b)) => a == b,
            (Self::StaleLocation(a), Self::StaleLocation(b)) => a == b,
            (Self::Io(a), Self::Io(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
