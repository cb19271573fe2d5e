//! Line-based parser for the ledger text grammar.
//!
//! The grammar is deliberately line-oriented: directives start in column 0
//! with a date, continuation lines (postings, metadata, tag/link comments)
//! are indented. Block surgery elsewhere in the store relies on exactly this
//! structure, so the parser tracks the 1-based header line of every
//! transaction it produces.
//!
//! Parsing is tolerant: a malformed directive is recorded as a
//! [`ParseIssue`] and skipped, the rest of the file still loads.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ledger::directive::{CloseDirective, Directive, OpenDirective, PriceDirective};
use crate::posting::{Flag, Posting, normalize_currency, validate_account};
use crate::transaction::Transaction;

/// A non-fatal problem found while parsing a ledger file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseIssue {
    pub file: String,
    /// 1-based line the issue was found on.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

/// Result of parsing one physical file.
#[derive(Debug, Default)]
pub(crate) struct ParsedFile {
    pub directives: Vec<Directive>,
    /// Paths named by `include "..."` lines, in order of appearance.
    pub includes: Vec<String>,
    pub issues: Vec<ParseIssue>,
}

pub(crate) fn parse_file(file: &str, content: &str) -> ParsedFile {
    let lines: Vec<&str> = content.lines().collect();
    let mut parsed = ParsedFile::default();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if line.trim().is_empty() {
            index += 1;
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            parsed.issues.push(issue(
                file,
                index + 1,
                "indented line outside a directive block",
            ));
            index += 1;
            continue;
        }
        let trimmed = line.trim_end();
        if trimmed.starts_with(';') {
            index += 1;
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("include") {
            match first_quoted(rest) {
                Some(path) => parsed.includes.push(path),
                None => parsed
                    .issues
                    .push(issue(file, index + 1, "malformed include line")),
            }
            index += 1;
            continue;
        }

        let block_len = block_length(&lines, index);
        match parse_directive(file, &lines, index) {
            Ok(directive) => parsed.directives.push(directive),
            Err(err) => parsed.issues.push(err),
        }
        index += block_len;
    }

    parsed
}

/// Number of lines in the block starting at `start`: the header plus every
/// following indented, non-blank line.
fn block_length(lines: &[&str], start: usize) -> usize {
    let mut len = 1;
    while start + len < lines.len() {
        let line = lines[start + len];
        if line.trim().is_empty() || !line.starts_with(char::is_whitespace) {
            break;
        }
        len += 1;
    }
    len
}

fn parse_directive(file: &str, lines: &[&str], start: usize) -> Result<Directive, ParseIssue> {
    let header = lines[start].trim_end();
    let lineno = start + 1;
    let mut tokens = header.split_whitespace();

    let date_token = tokens.next().unwrap_or_default();
    let date = NaiveDate::parse_from_str(date_token, "%Y-%m-%d")
        .map_err(|_| issue(file, lineno, &format!("invalid date: {date_token:?}")))?;

    let keyword = tokens
        .next()
        .ok_or_else(|| issue(file, lineno, "directive keyword missing"))?;

    match keyword {
        "open" => {
            let account = tokens
                .next()
                .ok_or_else(|| issue(file, lineno, "open without an account"))?;
            validate_account(account).map_err(|e| issue(file, lineno, &e.to_string()))?;
            let currencies = match tokens.next() {
                Some(list) => list
                    .split(',')
                    .map(normalize_currency)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| issue(file, lineno, &e.to_string()))?,
                None => Vec::new(),
            };
            Ok(Directive::Open(OpenDirective {
                date,
                account: account.to_string(),
                currencies,
            }))
        }
        "close" => {
            let account = tokens
                .next()
                .ok_or_else(|| issue(file, lineno, "close without an account"))?;
            validate_account(account).map_err(|e| issue(file, lineno, &e.to_string()))?;
            Ok(Directive::Close(CloseDirective {
                date,
                account: account.to_string(),
            }))
        }
        "price" => {
            let currency = tokens
                .next()
                .and_then(|t| normalize_currency(t).ok())
                .ok_or_else(|| issue(file, lineno, "price without a currency"))?;
            let rate: Decimal = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| issue(file, lineno, "price without a rate"))?;
            let quote_currency = tokens
                .next()
                .and_then(|t| normalize_currency(t).ok())
                .ok_or_else(|| issue(file, lineno, "price without a quote currency"))?;
            Ok(Directive::Price(PriceDirective {
                date,
                currency,
                rate,
                quote_currency,
            }))
        }
        "*" | "!" => {
            let flag = Flag::try_from(keyword).map_err(|e| issue(file, lineno, &e.to_string()))?;
            parse_transaction(file, lines, start, date, flag)
        }
        other => Err(issue(
            file,
            lineno,
            &format!("unknown directive keyword: {other:?}"),
        )),
    }
}

fn parse_transaction(
    file: &str,
    lines: &[&str],
    start: usize,
    date: NaiveDate,
    flag: Flag,
) -> Result<Directive, ParseIssue> {
    let header = lines[start].trim_end();
    let lineno = start + 1;

    // Everything after `YYYY-MM-DD FLAG` carries the quoted payee/description
    // and, optionally, inline `#tag`/`^link` tokens.
    let rest = header
        .splitn(3, char::is_whitespace)
        .nth(2)
        .unwrap_or_default();
    let (quoted, outside) = split_quoted(rest);
    let (payee, description) = match quoted.len() {
        0 => (None, None),
        1 => (None, Some(quoted[0].clone())),
        2 => (Some(quoted[0].clone()), Some(quoted[1].clone())),
        n => {
            return Err(issue(
                file,
                lineno,
                &format!("expected at most two quoted strings, got {n}"),
            ));
        }
    };

    let mut tags: Vec<String> = Vec::new();
    let mut links: Vec<String> = Vec::new();
    let mut meta: Vec<(String, String)> = Vec::new();
    let mut postings: Vec<Posting> = Vec::new();

    for token in outside.split_whitespace() {
        if let Some(tag) = token.strip_prefix('#') {
            tags.push(tag.to_string());
        } else if let Some(link) = token.strip_prefix('^') {
            links.push(link.to_string());
        }
    }

    let len = block_length(lines, start);
    for offset in 1..len {
        let line = lines[start + offset].trim();
        let sub_lineno = start + offset + 1;

        if let Some(rest) = line.strip_prefix("; tags:") {
            tags.extend(marker_list(rest, '#'));
        } else if let Some(rest) = line.strip_prefix("; links:") {
            links.extend(marker_list(rest, '^'));
        } else if line.starts_with(';') {
            // Plain comment inside the block.
        } else if let Some((key, value)) = metadata_line(line) {
            // Metadata under a posting belongs to that posting, metadata
            // before the first posting belongs to the transaction.
            match postings.last_mut() {
                Some(posting) => {
                    posting.meta.insert(key, value);
                }
                None => meta.push((key, value)),
            }
        } else {
            let posting = parse_posting(line)
                .map_err(|message| issue(file, sub_lineno, &message))?;
            postings.push(posting);
        }
    }

    let mut tx = Transaction::new(date, flag, payee, description, postings)
        .map_err(|e| issue(file, lineno, &e.to_string()))?;
    tx.tags.extend(tags);
    tx.links.extend(links);
    tx.meta.extend(meta);
    tx.set_source_location(file, lineno);
    Ok(Directive::Transaction(tx))
}

fn parse_posting(line: &str) -> Result<Posting, String> {
    let mut tokens = line.split_whitespace().peekable();

    let flag = match tokens.peek() {
        Some(&"*") | Some(&"!") => {
            let token = tokens.next().unwrap_or_default();
            Flag::try_from(token).ok()
        }
        _ => None,
    };

    let account = tokens.next().ok_or("posting without an account")?;
    let amount: Decimal = tokens
        .next()
        .ok_or("posting without an amount")?
        .parse()
        .map_err(|_| format!("invalid amount on posting {account}"))?;
    let currency = tokens.next().ok_or("posting without a currency")?;

    let mut posting = Posting::new(account, amount, currency).map_err(|e| e.to_string())?;
    if let Some(flag) = flag {
        posting = posting.with_flag(flag);
    }

    while let Some(token) = tokens.next() {
        if let Some(cost_value) = token.strip_prefix('{') {
            let value: Decimal = cost_value
                .parse()
                .map_err(|_| format!("invalid cost on posting {account}"))?;
            let cur = tokens
                .next()
                .and_then(|t| t.strip_suffix('}'))
                .ok_or(format!("unterminated cost on posting {account}"))?;
            posting = posting.with_cost(value, cur).map_err(|e| e.to_string())?;
        } else if token == "@" {
            let value: Decimal = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or(format!("invalid price on posting {account}"))?;
            let cur = tokens
                .next()
                .ok_or(format!("price without a currency on posting {account}"))?;
            posting = posting.with_price(value, cur).map_err(|e| e.to_string())?;
        } else if token.starts_with(';') {
            break;
        } else {
            return Err(format!("unexpected token {token:?} on posting {account}"));
        }
    }

    Ok(posting)
}

/// `key: "value"` (or `key: value`) continuation line, keys start lowercase.
fn metadata_line(line: &str) -> Option<(String, String)> {
    let (key, rest) = line.split_once(':')?;
    if key.is_empty()
        || !key.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        || key.chars().any(char::is_whitespace)
    {
        return None;
    }
    let value = first_quoted(rest).unwrap_or_else(|| rest.trim().to_string());
    Some((key.to_string(), value))
}

/// Items of a `; tags:`/`; links:` list, stripped of their `#`/`^` marker.
fn marker_list(rest: &str, marker: char) -> Vec<String> {
    rest.split_whitespace()
        .map(|token| token.strip_prefix(marker).unwrap_or(token))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn first_quoted(s: &str) -> Option<String> {
    split_quoted(s).0.into_iter().next()
}

/// Splits a string into its quoted substrings (in order) and the text found
/// outside any quotes. Backslash escapes inside quotes (`\"`, `\\`, `\n`)
/// are decoded.
fn split_quoted(s: &str) -> (Vec<String>, String) {
    let mut quoted = Vec::new();
    let mut outside = String::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match (in_quote, c) {
            (false, '"') => in_quote = true,
            (true, '"') => {
                quoted.push(std::mem::take(&mut current));
                in_quote = false;
            }
            (true, '\\') => match chars.next() {
                Some('n') => current.push('\n'),
                Some(escaped) => current.push(escaped),
                None => {}
            },
            (true, c) => current.push(c),
            (false, c) => outside.push(c),
        }
    }
    (quoted, outside)
}

fn issue(file: &str, line: usize, message: &str) -> ParseIssue {
    ParseIssue {
        file: file.to_string(),
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{META_SOURCE_FILE, META_SOURCE_LINE};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn parses_open_close_price() {
        let content = "\
2020-01-01 open Assets:Bank:ICBC CNY,USD
2020-01-01 open Expenses:Food
2024-12-31 close Assets:Bank:ICBC
2025-01-02 price USD 7.19 CNY
";
        let parsed = parse_file("main.beancount", content);
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.directives.len(), 4);
        match &parsed.directives[0] {
            Directive::Open(open) => {
                assert_eq!(open.account, "Assets:Bank:ICBC");
                assert_eq!(open.currencies, vec!["CNY", "USD"]);
            }
            other => panic!("expected open, got {other:?}"),
        }
        match &parsed.directives[3] {
            Directive::Price(price) => {
                assert_eq!(price.currency, "USD");
                assert_eq!(price.rate, dec("7.19"));
                assert_eq!(price.quote_currency, "CNY");
            }
            other => panic!("expected price, got {other:?}"),
        }
    }

    #[test]
    fn parses_full_transaction_block() {
        let content = "\
2025-01-15 * \"Grocer\" \"weekly shop\"
  ; tags: #food #weekly
  ; links: ^receipt-1
  note: \"paid cash\"
  Expenses:Food        50.00 CNY
  Assets:Cash         -50.00 CNY
";
        let parsed = parse_file("transactions_2025.beancount", content);
        assert!(parsed.issues.is_empty(), "issues: {:?}", parsed.issues);
        let tx = parsed.directives[0].as_transaction().unwrap();
        assert_eq!(tx.payee.as_deref(), Some("Grocer"));
        assert_eq!(tx.description.as_deref(), Some("weekly shop"));
        assert!(tx.tags.contains("food") && tx.tags.contains("weekly"));
        assert!(tx.links.contains("receipt-1"));
        assert_eq!(tx.meta.get("note").map(String::as_str), Some("paid cash"));
        assert_eq!(
            tx.meta.get(META_SOURCE_FILE).map(String::as_str),
            Some("transactions_2025.beancount")
        );
        assert_eq!(tx.meta.get(META_SOURCE_LINE).map(String::as_str), Some("1"));
        assert_eq!(tx.postings.len(), 2);
        assert_eq!(tx.postings[0].amount, dec("50.00"));
    }

    #[test]
    fn decodes_escaped_quotes_in_strings() {
        let content = r#"2025-01-15 * "Bar \"El Paso\"" "a\" \"b"
  Assets:Bank    10.00 EUR
  Assets:Cash   -10.00 EUR
"#;
        let parsed = parse_file("t.beancount", content);
        assert!(parsed.issues.is_empty(), "issues: {:?}", parsed.issues);
        let tx = parsed.directives[0].as_transaction().unwrap();
        assert_eq!(tx.payee.as_deref(), Some(r#"Bar "El Paso""#));
        assert_eq!(tx.description.as_deref(), Some("a\" \"b"));
    }

    #[test]
    fn parses_cost_and_price_annotations() {
        let content = "\
2025-03-01 * \"broker\" \"buy\"
  Assets:Broker        2.00 BTC {30000.00 USD} @ 31000.00 USD
  Assets:Bank      -60000.00 USD
";
        let parsed = parse_file("t.beancount", content);
        assert!(parsed.issues.is_empty(), "issues: {:?}", parsed.issues);
        let tx = parsed.directives[0].as_transaction().unwrap();
        let cost = tx.postings[0].cost.as_ref().unwrap();
        assert_eq!(cost.value, dec("30000.00"));
        assert_eq!(cost.currency, "USD");
        let price = tx.postings[0].price.as_ref().unwrap();
        assert_eq!(price.value, dec("31000.00"));
    }

    #[test]
    fn single_quoted_string_is_the_description() {
        let content = "\
2025-01-15 ! \"just a narration\"
  Assets:Bank    10.00 EUR
  Assets:Cash   -10.00 EUR
";
        let parsed = parse_file("t.beancount", content);
        let tx = parsed.directives[0].as_transaction().unwrap();
        assert_eq!(tx.payee, None);
        assert_eq!(tx.description.as_deref(), Some("just a narration"));
        assert_eq!(tx.flag, Flag::Pending);
    }

    #[test]
    fn malformed_directive_is_an_issue_not_an_abort() {
        let content = "\
2025-01-15 * \"ok\"
  Expenses:Food    50.00 CNY
  Assets:Cash     -50.00 CNY

2025-01-16 frobnicate Assets:Cash

2025-01-17 * \"also ok\"
  Expenses:Food    10.00 CNY
  Assets:Cash     -10.00 CNY
";
        let parsed = parse_file("t.beancount", content);
        assert_eq!(parsed.directives.len(), 2);
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].line, 5);
        assert!(parsed.issues[0].message.contains("frobnicate"));
    }

    #[test]
    fn unbalanced_transaction_is_an_issue() {
        let content = "\
2025-01-15 * \"oops\"
  Expenses:Food    50.00 CNY
  Assets:Cash     -30.00 CNY
";
        let parsed = parse_file("t.beancount", content);
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.issues.len(), 1);
        assert!(parsed.issues[0].message.contains("CNY"));
    }

    #[test]
    fn header_tags_and_posting_meta() {
        let content = "\
2025-02-01 * \"Airline\" \"flight\" #travel ^trip-2025
  Expenses:Travel     1200.00 CNY
    booking: \"ABC123\"
  Liabilities:Card   -1200.00 CNY
";
        let parsed = parse_file("t.beancount", content);
        assert!(parsed.issues.is_empty(), "issues: {:?}", parsed.issues);
        let tx = parsed.directives[0].as_transaction().unwrap();
        assert!(tx.tags.contains("travel"));
        assert!(tx.links.contains("trip-2025"));
        assert_eq!(
            tx.postings[0].meta.get("booking").map(String::as_str),
            Some("ABC123")
        );
    }

    #[test]
    fn collects_includes() {
        let content = "\
;; main ledger
include \"transactions_2024.beancount\"
include \"transactions_2025.beancount\"
2020-01-01 open Assets:Cash
";
        let parsed = parse_file("main.beancount", content);
        assert_eq!(
            parsed.includes,
            vec!["transactions_2024.beancount", "transactions_2025.beancount"]
        );
        assert_eq!(parsed.directives.len(), 1);
    }
}
