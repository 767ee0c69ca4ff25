use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};

use crate::entities::kv_entry;
use crate::error::AppError;

/// String-valued key/value store backed by the `kv_entries` table.
pub struct KvStore {
    db: DatabaseConnection,
}

impl KvStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entry = kv_entry::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;
        Ok(entry.map(|entry| entry.value))
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), AppError> {
        upsert_with_conn(&self.db, key, value).await
    }

    /// Writes all entries in one transaction so related keys never drift apart.
    pub async fn set_many(&self, entries: Vec<(&str, String)>) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin().await?;
        for (key, value) in entries {
            if let Err(err) = upsert_with_conn(&txn, key, value).await {
                txn.rollback().await?;
                return Err(err);
            }
        }
        txn.commit().await?;
        Ok(())
    }
}

async fn upsert_with_conn<C: ConnectionTrait>(
    db: &C,
    key: &str,
    value: String,
) -> Result<(), AppError> {
    let active = kv_entry::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value),
        updated_at: Set(Utc::now()),
    };
    kv_entry::Entity::insert(active)
        .on_conflict(
            OnConflict::column(kv_entry::Column::Key)
                .update_columns([kv_entry::Column::Value, kv_entry::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
