//! Initial schema for the metadata side-store.
//!
//! The ledger text owns the financial truth; the database only carries
//! per-user annotations:
//!
//! - `users`: account owners
//! - `transaction_meta`: one optional record per ledger transaction, keyed
//!   by the derived ledger identity

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Users {
    Table,
    Username,
}

#[derive(Iden)]
enum TransactionMeta {
    Table,
    LedgerId,
    UserId,
    LastSyncedAt,
    Note,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TransactionMeta::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionMeta::LedgerId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TransactionMeta::UserId).string().not_null())
                    .col(ColumnDef::new(TransactionMeta::LastSyncedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TransactionMeta::Note).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transaction_meta-user_id")
                            .from(TransactionMeta::Table, TransactionMeta::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transaction_meta-user_id")
                    .table(TransactionMeta::Table)
                    .col(TransactionMeta::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TransactionMeta::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
