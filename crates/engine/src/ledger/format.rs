//! Serialization of directives back to ledger text.
//!
//! Machine-written blocks are what `parse` reads back: amounts with two
//! decimal places, accounts column-padded so the amounts line up, tags and
//! links on their own comment lines. Blocks end with a newline; the blank
//! separator line around a block is the store's job, not the formatter's.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::Transaction;
use crate::identity::META_IDENTITY;
use crate::ledger::directive::{CloseDirective, OpenDirective, PriceDirective};
use crate::posting::Posting;
use crate::transaction::{META_SOURCE_FILE, META_SOURCE_LINE};

const INDENT: &str = "  ";
const MIN_ACCOUNT_COLUMN: usize = 40;
const AMOUNT_COLUMN: usize = 12;

/// Formats a signed amount with exactly two decimal places.
pub(crate) fn format_amount(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

pub(crate) fn format_open(open: &OpenDirective) -> String {
    let mut line = format!("{} open {}", open.date.format("%Y-%m-%d"), open.account);
    if !open.currencies.is_empty() {
        line.push(' ');
        line.push_str(&open.currencies.join(","));
    }
    line.push('\n');
    line
}

pub(crate) fn format_close(close: &CloseDirective) -> String {
    format!("{} close {}\n", close.date.format("%Y-%m-%d"), close.account)
}

pub(crate) fn format_price(price: &PriceDirective) -> String {
    format!(
        "{} price {} {} {}\n",
        price.date.format("%Y-%m-%d"),
        price.currency,
        price.rate.normalize(),
        price.quote_currency
    )
}

/// Renders a transaction as one ledger block.
///
/// Reserved location metadata and the identity key are never written; the
/// identity is derived from content on reload.
pub(crate) fn format_transaction(tx: &Transaction) -> String {
    let mut out = format!("{} {}", tx.date.format("%Y-%m-%d"), tx.flag.as_str());
    match (&tx.payee, &tx.description) {
        (Some(payee), description) => {
            out.push_str(&format!(
                " {} {}",
                quote(payee),
                quote(description.as_deref().unwrap_or_default())
            ));
        }
        (None, Some(description)) => out.push_str(&format!(" {}", quote(description))),
        (None, None) => {}
    }
    out.push('\n');

    if !tx.tags.is_empty() {
        let tags: Vec<String> = tx.tags.iter().map(|t| format!("#{t}")).collect();
        out.push_str(&format!("{INDENT}; tags: {}\n", tags.join(" ")));
    }
    if !tx.links.is_empty() {
        let links: Vec<String> = tx.links.iter().map(|l| format!("^{l}")).collect();
        out.push_str(&format!("{INDENT}; links: {}\n", links.join(" ")));
    }
    for (key, value) in &tx.meta {
        if key == META_SOURCE_FILE || key == META_SOURCE_LINE || key == META_IDENTITY {
            continue;
        }
        out.push_str(&format!("{INDENT}{key}: {}\n", quote(value)));
    }

    let account_column = tx
        .postings
        .iter()
        .map(posting_label_width)
        .max()
        .unwrap_or(0)
        .max(MIN_ACCOUNT_COLUMN);
    for posting in &tx.postings {
        out.push_str(&format_posting(posting, account_column));
    }
    out
}

fn posting_label_width(posting: &Posting) -> usize {
    let flag_width = if posting.flag.is_some() { 2 } else { 0 };
    posting.account.chars().count() + flag_width
}

fn format_posting(posting: &Posting, account_column: usize) -> String {
    let label = match posting.flag {
        Some(flag) => format!("{} {}", flag.as_str(), posting.account),
        None => posting.account.clone(),
    };
    let mut line = format!(
        "{INDENT}{label:<account_column$} {:>AMOUNT_COLUMN$} {}",
        format_amount(posting.amount),
        posting.currency
    );
    if let Some(cost) = &posting.cost {
        line.push_str(&format!(
            " {{{} {}}}",
            format_amount(cost.value),
            cost.currency
        ));
    }
    if let Some(price) = &posting.price {
        line.push_str(&format!(
            " @ {} {}",
            format_amount(price.value),
            price.currency
        ));
    }
    line.push('\n');
    for (key, value) in &posting.meta {
        line.push_str(&format!("{INDENT}{INDENT}{key}: {}\n", quote(value)));
    }
    line
}

/// Quotes a string field, escaping the characters that would break the
/// line-oriented grammar: `"`, `\` and newlines.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
