//! Users table (minimal entity).
//!
//! The side-store keys metadata by `user_id`, which is the username. Deleting
//! a user cascade-deletes their metadata records; the ledger text is not
//! touched.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::metadata::Entity")]
    TransactionMeta,
}

impl Related<super::metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionMeta.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
