//! The ledger store: text grammar, file layout and block surgery.
//!
//! The plain-text ledger is the authoritative store for all financial data;
//! everything in this module exists to read it, extend it and carve blocks
//! out of it without corrupting unrelated bytes.

pub use directive::{CloseDirective, Directive, OpenDirective, PriceDirective};
pub use parse::ParseIssue;
pub use store::{LedgerStore, LoadedLedger};

pub mod directive;
pub(crate) mod format;
pub(crate) mod parse;
pub mod store;
