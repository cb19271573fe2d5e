//! Stable transaction identity.
//!
//! The ledger text has no primary keys, so the engine derives one: a
//! name-based UUID (v5) over a canonical tuple of the fields that make a
//! transaction what it is. The same content always hashes to the same
//! identity, so identities survive full reloads without being written to the
//! file.
//!
//! If the text block carries an explicit `uuid:` metadata key (hand-written
//! or imported), that value is reused verbatim instead.

use uuid::Uuid;

use crate::Transaction;

/// Metadata key that overrides the derived identity when present.
pub const META_IDENTITY: &str = "uuid";

/// Project namespace for name-based identities. Changing this would change
/// every derived identity, so it never changes.
const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x8f8c_1f6e_4b0d_4c5a_9e2b_7d3a_5c41_96d0);

/// Resolves the stable identity of a transaction: the `uuid:` metadata value
/// when the text carries one, otherwise a v5 hash of the canonical tuple
/// (date, description, payee, and each posting's account/amount/currency in
/// order), encoded as 32 lowercase hex characters.
#[must_use]
pub fn resolve(tx: &Transaction) -> String {
    if let Some(existing) = tx.meta.get(META_IDENTITY) {
        return existing.clone();
    }
    let canonical = canonical_tuple(tx);
    Uuid::new_v5(&IDENTITY_NAMESPACE, canonical.as_bytes())
        .simple()
        .to_string()
}

fn canonical_tuple(tx: &Transaction) -> String {
    let mut parts: Vec<String> = vec![
        tx.date.format("%Y-%m-%d").to_string(),
        tx.description.clone().unwrap_or_default(),
        tx.payee.clone().unwrap_or_default(),
    ];
    for posting in &tx.postings {
        // Normalize so `50.0` and `50.00` hash identically.
        parts.push(format!(
            "{}|{}|{}",
            posting.account,
            posting.amount.normalize(),
            posting.currency
        ));
    }
    parts.join("\x1f")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting::{Flag, Posting};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample(amount: &str) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            Flag::Cleared,
            Some("Grocer".to_string()),
            Some("weekly shop".to_string()),
            vec![
                Posting::new("Expenses:Food", dec(amount), "CNY").unwrap(),
                Posting::new("Assets:Cash", -dec(amount), "CNY").unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn identical_content_yields_identical_identity() {
        assert_eq!(resolve(&sample("50.00")), resolve(&sample("50.00")));
        assert_eq!(resolve(&sample("50.0")), resolve(&sample("50.00")));
    }

    #[test]
    fn any_posting_change_yields_a_new_identity() {
        assert_ne!(resolve(&sample("50.00")), resolve(&sample("50.01")));

        let mut other_account = sample("50.00");
        other_account.postings[0].account = "Expenses:Transport".to_string();
        assert_ne!(resolve(&sample("50.00")), resolve(&other_account));

        let mut other_desc = sample("50.00");
        other_desc.description = Some("monthly shop".to_string());
        assert_ne!(resolve(&sample("50.00")), resolve(&other_desc));
    }

    #[test]
    fn identity_is_fixed_length_hex() {
        let id = resolve(&sample("50.00"));
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn explicit_uuid_meta_wins() {
        let mut tx = sample("50.00");
        tx.meta
            .insert(META_IDENTITY.to_string(), "cafebabe".to_string());
        assert_eq!(resolve(&tx), "cafebabe");
    }
}
