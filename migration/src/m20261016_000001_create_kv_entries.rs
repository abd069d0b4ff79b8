use sea_orm_migration::prelude::*;

/// Key-value entries (giveaway:<message_id> -> JSON record)
#[derive(DeriveIden)]
enum KvEntries {
    Table,
    Key,
    Value,
    UpdatedAt,
}

/// `key` is the primary key, which also serves the prefix scans
fn kv_entries_table() -> TableCreateStatement {
    Table::create()
        .table(KvEntries::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(KvEntries::Key)
                .text()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(KvEntries::Value).text().not_null())
        .col(
            ColumnDef::new(KvEntries::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::cust("NOW()")),
        )
        .to_owned()
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(kv_entries_table()).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(KvEntries::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_entries_keyed_by_text_primary_key() {
        let sql = kv_entries_table().to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "kv_entries""#));
        assert!(sql.contains(r#""key" text"#));
        assert!(sql.contains("PRIMARY KEY"));
        assert!(sql.contains(r#""value" text"#));
    }
}
