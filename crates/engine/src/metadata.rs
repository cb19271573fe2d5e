//! Metadata side-store records.
//!
//! A [`MetadataRecord`] carries the query-only extras the ledger text cannot
//! hold conveniently: owning user, sync bookkeeping, a free-text note. It is
//! keyed by the ledger identity as a weak reference; losing the record never
//! invalidates the ledger entry, and financial truth always lives in the
//! text.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Ledger identity of the annotated transaction (not a foreign key).
    pub ledger_id: String,
    pub user_id: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl MetadataRecord {
    #[must_use]
    pub fn new(ledger_id: &str, user_id: &str) -> Self {
        Self {
            ledger_id: ledger_id.to_string(),
            user_id: user_id.to_string(),
            last_synced_at: None,
            note: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_meta")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub ledger_id: String,
    pub user_id: String,
    pub last_synced_at: Option<DateTimeUtc>,
    pub note: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&MetadataRecord> for ActiveModel {
    fn from(record: &MetadataRecord) -> Self {
        Self {
            ledger_id: ActiveValue::Set(record.ledger_id.clone()),
            user_id: ActiveValue::Set(record.user_id.clone()),
            last_synced_at: ActiveValue::Set(record.last_synced_at),
            note: ActiveValue::Set(record.note.clone()),
        }
    }
}

impl From<Model> for MetadataRecord {
    fn from(model: Model) -> Self {
        Self {
            ledger_id: model.ledger_id,
            user_id: model.user_id,
            last_synced_at: model.last_synced_at,
            note: model.note,
        }
    }
}
