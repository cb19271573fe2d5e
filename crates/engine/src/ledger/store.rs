//! On-disk ledger file set.
//!
//! The [`LedgerStore`] is the only component that reads or writes ledger
//! bytes. The layout is one `main` file (opens, closes, prices, includes)
//! plus one `transactions_<year>.beancount` file per calendar year, wired
//! into main with an `include` line.
//!
//! Writes are surgical: append never touches existing bytes, and block
//! removal deletes exactly one directive block, delimited structurally by
//! indentation.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::ResultLedger;
use crate::ledger::directive::Directive;
use crate::ledger::parse::{ParseIssue, parse_file};
use crate::transaction::Transaction;

/// Everything a full reload produced: the ordered directive list of all
/// reachable files plus the non-fatal issues found along the way.
#[derive(Debug, Default)]
pub struct LoadedLedger {
    pub directives: Vec<Directive>,
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug)]
pub struct LedgerStore {
    root: PathBuf,
    main_file: String,
}

impl LedgerStore {
    /// Opens a store rooted at `root`, creating the directory and an empty
    /// main file when absent.
    pub fn open(root: impl Into<PathBuf>, main_file: &str) -> ResultLedger<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let main_path = root.join(main_file);
        if !main_path.exists() {
            fs::write(&main_path, "")?;
        }
        Ok(Self {
            root,
            main_file: main_file.to_string(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn main_file(&self) -> &str {
        &self.main_file
    }

    /// Parses the main file and every file reachable through `include`
    /// lines into one ordered directive list.
    ///
    /// A missing include target becomes a [`ParseIssue`]; I/O failures on
    /// files that exist are fatal for the call.
    pub fn reload(&self) -> ResultLedger<LoadedLedger> {
        let mut loaded = LoadedLedger::default();
        let mut queue: Vec<String> = vec![self.main_file.clone()];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(name) = queue.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let path = self.root.join(&name);
            if !path.exists() {
                loaded.issues.push(ParseIssue {
                    file: name.clone(),
                    line: 0,
                    message: "included file does not exist".to_string(),
                });
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let parsed = parse_file(&name, &content);
            loaded.directives.extend(parsed.directives);
            loaded.issues.extend(parsed.issues);
            // Depth-first in reverse so includes load in file order.
            for include in parsed.includes.into_iter().rev() {
                queue.push(include);
            }
        }

        tracing::debug!(
            directives = loaded.directives.len(),
            issues = loaded.issues.len(),
            files = visited.len(),
            "ledger reloaded"
        );
        Ok(loaded)
    }

    /// Appends one formatted directive to `file_name`: a blank separator
    /// line, the block, and a trailing blank line. Existing bytes are never
    /// rewritten.
    pub fn append(&self, file_name: &str, block: &str) -> ResultLedger<()> {
        let path = self.root.join(file_name);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(b"\n")?;
        file.write_all(block.as_bytes())?;
        file.write_all(b"\n")?;
        tracing::debug!(file = file_name, bytes = block.len(), "directive appended");
        Ok(())
    }

    /// Returns the transactions file for `year`, creating it on first use.
    ///
    /// A fresh year file gets a two-line header comment and its `include`
    /// line is registered in the main file, grouped with the existing
    /// includes.
    pub fn year_file_for(&self, year: i32) -> ResultLedger<String> {
        let name = format!("transactions_{year}.beancount");
        let path = self.root.join(&name);
        if !path.exists() {
            fs::write(
                &path,
                format!(";; Transactions for {year}.\n;; One file per calendar year, included from the main ledger.\n"),
            )?;
            self.register_include(&name)?;
            tracing::info!(file = name, "year file created");
        }
        Ok(name)
    }

    /// Inserts `include "<name>"` into the main file, directly after the
    /// last existing include line (or at the top when there is none), so
    /// includes stay grouped.
    fn register_include(&self, name: &str) -> ResultLedger<()> {
        let main_path = self.root.join(&self.main_file);
        let content = fs::read_to_string(&main_path)?;
        let include_line = format!("include \"{name}\"");
        if content.lines().any(|line| line.trim_end() == include_line) {
            return Ok(());
        }

        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let insert_at = lines
            .iter()
            .rposition(|line| line.trim_start().starts_with("include "))
            .map_or(0, |last| last + 1);
        lines.insert(insert_at, include_line);

        fs::write(&main_path, lines.join("\n") + "\n")?;
        Ok(())
    }

    /// Removes the directive block starting at `start_line` (1-based) from
    /// `file_name`, provided the header line begins with `date_prefix`.
    ///
    /// The block ends at the first non-indented or blank line. Returns
    /// `false` without touching the file when no matching block exists.
    pub fn remove_block(
        &self,
        file_name: &str,
        start_line: usize,
        date_prefix: &str,
    ) -> ResultLedger<bool> {
        let path = self.root.join(file_name);
        if !path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&path)?;
        let mut lines: Vec<&str> = content.lines().collect();

        let Some(index) = start_line.checked_sub(1) else {
            return Ok(false);
        };
        let Some(header) = lines.get(index) else {
            return Ok(false);
        };
        if header.starts_with(char::is_whitespace) || !header.starts_with(date_prefix) {
            return Ok(false);
        }

        let mut end = index + 1;
        while end < lines.len()
            && !lines[end].trim().is_empty()
            && lines[end].starts_with(char::is_whitespace)
        {
            end += 1;
        }
        // Swallow one separator blank line so machine-managed files do not
        // accumulate empty runs.
        if end < lines.len()
            && lines[end].trim().is_empty()
            && (index == 0 || lines[index - 1].trim().is_empty())
        {
            end += 1;
        }

        lines.drain(index..end);
        let mut rewritten = lines.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        fs::write(&path, rewritten)?;
        tracing::debug!(
            file = file_name,
            line = start_line,
            "directive block removed"
        );
        Ok(true)
    }

    /// Content-matching scan: the 1-based header lines of every block in
    /// `file_name` whose parsed transaction matches `tx` on date, flag,
    /// payee, description and posting account/amount/currency.
    ///
    /// Best-effort by design: duplicates of the same content all match.
    pub fn find_matching(&self, file_name: &str, tx: &Transaction) -> ResultLedger<Vec<usize>> {
        let path = self.root.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        let parsed = parse_file(file_name, &content);
        let lines = parsed
            .directives
            .iter()
            .filter_map(Directive::as_transaction)
            .filter(|candidate| candidate.content_matches(tx))
            .filter_map(|candidate| candidate.source_location().map(|(_, line)| line))
            .collect();
        Ok(lines)
    }
}
