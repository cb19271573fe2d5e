//! Repository facade over the ledger files and the metadata side-store.
//!
//! The [`LedgerRepository`] owns everything with state: the [`LedgerStore`],
//! the identity-keyed transaction cache, the declared-accounts oracle and the
//! database connection. The cache is rebuilt from scratch on every reload and
//! never patched in place; a failed mutation leaves it at the last
//! successfully reloaded snapshot.
//!
//! Mutations take `&mut self`, so the borrow checker serializes writers with
//! the reads that follow them. The single-writer assumption of the file
//! layout still stands across processes.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::ledger::directive::{CloseDirective, Directive, OpenDirective, PriceDirective};
use crate::ledger::format::{format_close, format_open, format_price, format_transaction};
use crate::ledger::parse::ParseIssue;
use crate::ledger::store::LedgerStore;
use crate::metadata::{self, MetadataRecord};
use crate::service::{DeclaredAccounts, TransactionService};
use crate::stats::Statistics;
use crate::transaction::{META_SOURCE_FILE, META_SOURCE_LINE, Transaction, TransactionType};
use crate::{LedgerError, ResultLedger, identity};

pub struct LedgerRepository {
    store: LedgerStore,
    service: TransactionService,
    db: DatabaseConnection,
    /// Identity → transaction, rebuilt wholesale by [`reload`](Self::reload).
    cache: HashMap<String, Transaction>,
    directives: Vec<Directive>,
    issues: Vec<ParseIssue>,
    accounts: DeclaredAccounts,
    prices: Vec<PriceDirective>,
}

impl LedgerRepository {
    /// Builds a repository over an opened store and loads the initial
    /// snapshot.
    pub fn open(
        store: LedgerStore,
        service: TransactionService,
        db: DatabaseConnection,
    ) -> ResultLedger<Self> {
        let mut repository = Self {
            store,
            service,
            db,
            cache: HashMap::new(),
            directives: Vec::new(),
            issues: Vec::new(),
            accounts: DeclaredAccounts::default(),
            prices: Vec::new(),
        };
        repository.reload()?;
        Ok(repository)
    }

    /// Reparses every ledger file and rebuilds the cache, the account oracle
    /// and the price list from the result.
    pub fn reload(&mut self) -> ResultLedger<()> {
        let loaded = self.store.reload()?;

        let mut cache = HashMap::new();
        let mut prices = Vec::new();
        for directive in &loaded.directives {
            match directive {
                Directive::Transaction(tx) => {
                    let id = identity::resolve(tx);
                    let mut tx = tx.clone();
                    tx.id = Some(id.clone());
                    if let Some(previous) = cache.insert(id.clone(), tx) {
                        tracing::warn!(
                            id = %id,
                            date = %previous.date,
                            "identity collision on reload, keeping the later block"
                        );
                    }
                }
                Directive::Price(price) => prices.push(price.clone()),
                _ => {}
            }
        }

        self.accounts = DeclaredAccounts::from_directives(&loaded.directives);
        self.cache = cache;
        self.prices = prices;
        self.directives = loaded.directives;
        self.issues = loaded.issues;
        Ok(())
    }

    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Transaction> {
        self.cache.get(id)
    }

    /// All cached transactions, ordered by date then identity.
    #[must_use]
    pub fn find_all(&self) -> Vec<&Transaction> {
        let mut all: Vec<&Transaction> = self.cache.values().collect();
        all.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        all
    }

    /// Transactions dated within `[start, end]`, inclusive on both ends.
    #[must_use]
    pub fn find_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Transaction> {
        self.filtered(|tx| tx.date >= start && tx.date <= end)
    }

    /// Transactions with a posting on `account` or any of its
    /// sub-accounts (`Assets:Bank` matches `Assets:Bank:ICBC`).
    #[must_use]
    pub fn find_by_account(&self, account: &str) -> Vec<&Transaction> {
        self.filtered(|tx| {
            tx.postings.iter().any(|posting| {
                posting.account == account
                    || posting
                        .account
                        .strip_prefix(account)
                        .is_some_and(|rest| rest.starts_with(':'))
            })
        })
    }

    #[must_use]
    pub fn find_by_type(&self, tx_type: TransactionType) -> Vec<&Transaction> {
        self.filtered(|tx| tx.detect_type() == tx_type)
    }

    /// Transactions carrying at least one of the given tags.
    #[must_use]
    pub fn find_by_tags(&self, tags: &[&str]) -> Vec<&Transaction> {
        self.filtered(|tx| tags.iter().any(|tag| tx.tags.contains(*tag)))
    }

    /// Case-insensitive substring match over description and payee.
    #[must_use]
    pub fn find_by_description(&self, query: &str) -> Vec<&Transaction> {
        let query = query.to_lowercase();
        self.filtered(|tx| {
            tx.description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
                || tx
                    .payee
                    .as_deref()
                    .is_some_and(|p| p.to_lowercase().contains(&query))
        })
    }

    fn filtered(&self, predicate: impl Fn(&Transaction) -> bool) -> Vec<&Transaction> {
        let mut matched: Vec<&Transaction> =
            self.cache.values().filter(|tx| predicate(tx)).collect();
        matched.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));
        matched
    }

    /// Persists a new transaction: validates, appends to the year file for
    /// its date, optionally records a [`MetadataRecord`] for `user_id`,
    /// reloads, and returns the reloaded identity-bearing transaction.
    ///
    /// Validation runs before any I/O; an invalid transaction leaves both
    /// the files and the side-store untouched.
    pub async fn create(
        &mut self,
        mut tx: Transaction,
        user_id: Option<&str>,
    ) -> ResultLedger<Transaction> {
        // An identity-override key is only honored when it comes from the
        // ledger text itself; the serializer never writes it, so a
        // caller-supplied one could not survive the reload.
        tx.meta.remove(identity::META_IDENTITY);
        let id = self.service.validate(&tx, &self.accounts, &self.cache)?;

        let year_file = self.store.year_file_for(tx.date.year())?;
        self.store.append(&year_file, &format_transaction(&tx))?;

        self.reload()?;
        let created = self.cache.get(&id).cloned().ok_or_else(|| {
            LedgerError::Validation(format!(
                "transaction {id} did not survive the reload after its append"
            ))
        })?;

        // Side-store rows are written only once the reload has confirmed
        // the ledger entry.
        if let Some(user) = user_id {
            let record = MetadataRecord::new(&id, user);
            metadata::Entity::insert(metadata::ActiveModel::from(&record))
                .exec(&self.db)
                .await?;
        }

        tracing::info!(id = %id, date = %tx.date, file = %year_file, "transaction created");
        Ok(created)
    }

    /// Replaces a persisted transaction with an edited version.
    ///
    /// The edit is remove-then-recreate: the old block is carved out at its
    /// recorded location and the new content is appended like a fresh create.
    /// The new content gets a new identity; the metadata record's `user_id`
    /// follows it and the old record is deleted.
    pub async fn update(&mut self, tx: Transaction) -> ResultLedger<Transaction> {
        let old_id = tx.id.clone().ok_or_else(|| {
            LedgerError::StaleLocation("update needs a transaction with an identity".to_string())
        })?;
        let old = self.cache.get(&old_id).cloned().ok_or_else(|| {
            LedgerError::StaleLocation(format!("no cached transaction with identity {old_id}"))
        })?;
        let (file, line) = old.source_location().ok_or_else(|| {
            LedgerError::StaleLocation(format!(
                "transaction {old_id} carries no source location"
            ))
        })?;

        let mut fresh = tx;
        fresh.id = None;
        fresh.meta.remove(META_SOURCE_FILE);
        fresh.meta.remove(META_SOURCE_LINE);
        fresh.meta.remove(identity::META_IDENTITY);

        // Validate the replacement before any bytes move, with the old entry
        // ignored so an unchanged edit is not flagged as its own duplicate.
        let mut without_old = self.cache.clone();
        without_old.remove(&old_id);
        self.service
            .validate(&fresh, &self.accounts, &without_old)?;

        let date_prefix = old.date.format("%Y-%m-%d").to_string();
        if !self.store.remove_block(&file, line, &date_prefix)? {
            return Err(LedgerError::StaleLocation(format!(
                "no block for {old_id} at {file}:{line}, the ledger was edited out-of-band"
            )));
        }
        // An edit that keeps the identity (tags only, say) must not trip the
        // duplicate check against its own old entry.
        self.cache.remove(&old_id);

        let carried_user = match metadata::Entity::find_by_id(&old_id).one(&self.db).await? {
            Some(record) => {
                metadata::Entity::delete_by_id(&old_id).exec(&self.db).await?;
                Some(record.user_id)
            }
            None => None,
        };

        let replacement = self.create(fresh, carried_user.as_deref()).await?;
        tracing::info!(
            old_id = %old_id,
            new_id = replacement.id.as_deref().unwrap_or_default(),
            "transaction updated"
        );
        Ok(replacement)
    }

    /// Deletes a transaction by identity. Returns `false` for an unknown
    /// identity or when the backing block is already gone.
    ///
    /// The recorded location is tried first; when it no longer matches, a
    /// content scan of the same file finds the block. A scan that matches
    /// several duplicate blocks removes the first and logs the ambiguity.
    pub async fn delete(&mut self, id: &str) -> ResultLedger<bool> {
        let Some(tx) = self.cache.get(id).cloned() else {
            return Ok(false);
        };
        let Some((file, line)) = tx.source_location() else {
            return Ok(false);
        };
        let date_prefix = tx.date.format("%Y-%m-%d").to_string();

        let mut removed = self.store.remove_block(&file, line, &date_prefix)?;
        if !removed {
            let matches = self.store.find_matching(&file, &tx)?;
            if matches.len() > 1 {
                tracing::warn!(
                    id = %id,
                    file = %file,
                    candidates = matches.len(),
                    "ambiguous content scan, removing the first matching block"
                );
            }
            if let Some(&first) = matches.first() {
                removed = self.store.remove_block(&file, first, &date_prefix)?;
            }
        }

        if !removed {
            // The block vanished out-of-band; resync the cache with reality.
            self.reload()?;
            return Ok(false);
        }

        metadata::Entity::delete_by_id(id).exec(&self.db).await?;
        self.reload()?;
        tracing::info!(id = %id, file = %file, "transaction deleted");
        Ok(true)
    }

    /// Side-store record for a ledger identity, when one exists.
    pub async fn metadata(&self, id: &str) -> ResultLedger<Option<MetadataRecord>> {
        let record = metadata::Entity::find_by_id(id).one(&self.db).await?;
        Ok(record.map(MetadataRecord::from))
    }

    /// Creates or replaces the side-store record for a ledger identity.
    /// The ledger text is not touched.
    pub async fn upsert_metadata(&self, record: &MetadataRecord) -> ResultLedger<()> {
        metadata::Entity::insert(metadata::ActiveModel::from(record))
            .on_conflict(
                OnConflict::column(metadata::Column::LedgerId)
                    .update_columns([
                        metadata::Column::UserId,
                        metadata::Column::LastSyncedAt,
                        metadata::Column::Note,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Counts and debit sums grouped by transaction type and currency.
    ///
    /// `start`/`end` bound the window (inclusive); `user_id` restricts the
    /// input to transactions annotated for that user in the side-store.
    pub async fn get_statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        user_id: Option<&str>,
    ) -> ResultLedger<Statistics> {
        let owned_ids: Option<HashSet<String>> = match user_id {
            Some(user) => {
                let records = metadata::Entity::find()
                    .filter(metadata::Column::UserId.eq(user))
                    .all(&self.db)
                    .await?;
                Some(records.into_iter().map(|r| r.ledger_id).collect())
            }
            None => None,
        };

        let stats = Statistics::collect(self.cache.values().filter(|tx| {
            start.is_none_or(|s| tx.date >= s)
                && end.is_none_or(|e| tx.date <= e)
                && match (&owned_ids, &tx.id) {
                    (Some(ids), Some(id)) => ids.contains(id),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        }));
        Ok(stats)
    }

    /// Appends an `open` directive to the main file and reloads, making the
    /// account visible to validation.
    pub fn declare_account(&mut self, open: OpenDirective) -> ResultLedger<()> {
        let block = format_open(&open);
        let main = self.store.main_file().to_string();
        self.store.append(&main, block.trim_end())?;
        self.reload()
    }

    /// Appends a `close` directive to the main file and reloads; the account
    /// stops existing for future transactions.
    pub fn close_account(&mut self, close: CloseDirective) -> ResultLedger<()> {
        let block = format_close(&close);
        let main = self.store.main_file().to_string();
        self.store.append(&main, block.trim_end())?;
        self.reload()
    }

    /// Appends a `price` directive to the main file and reloads.
    pub fn record_price(&mut self, price: PriceDirective) -> ResultLedger<()> {
        let block = format_price(&price);
        let main = self.store.main_file().to_string();
        self.store.append(&main, block.trim_end())?;
        self.reload()
    }

    /// Non-fatal problems found by the last reload.
    #[must_use]
    pub fn parse_issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    /// Price directives from the last reload, in file order. Rate lookups
    /// and conversions are the caller's business.
    #[must_use]
    pub fn prices(&self) -> &[PriceDirective] {
        &self.prices
    }

    #[must_use]
    pub fn accounts(&self) -> &DeclaredAccounts {
        &self.accounts
    }

    /// Every directive from the last reload, in file order.
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    #[must_use]
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }
}
