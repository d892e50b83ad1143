//! SQL-based store backend (MySQL/PostgreSQL/SQLite via SeaORM)
//!
//! Every lock mutation is a single server-side statement filtered by key and
//! token, so there is never a client-side "read token, compare, delete" step.
//! `set_result` runs the lock release and the result insert in one transaction.
//!
//! Expiry timestamps are computed from the caller's clock; hosts sharing a
//! database are expected to keep their clocks synchronized to well within the
//! configured lock TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oncely_common::{LockToken, StoreError, StoreKind, current_timestamp};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, Schema, SqlErr, TransactionTrait, prelude::Expr,
};

use crate::entity::{idempotency_lock, idempotency_result};
use crate::traits::{RefreshableStore, Store};

/// Convert a TTL into an absolute expiry; zero means never
fn expiry_millis(now: i64, ttl: Duration) -> i64 {
    if ttl.is_zero() {
        i64::MAX
    } else {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_add(ttl_ms)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Store shared by every process connected to the same database
pub struct DistributedStore {
    db: DatabaseConnection,
}

impl DistributedStore {
    /// Create a new DistributedStore with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect using SeaORM connection options
    pub async fn connect<C>(options: C) -> Result<Self, StoreError>
    where
        C: Into<ConnectOptions>,
    {
        let db = Database::connect(options)
            .await
            .map_err(StoreError::backend)?;
        Ok(Self::new(db))
    }

    /// Create the lock and result tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let statements = [
            schema
                .create_table_from_entity(idempotency_lock::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(idempotency_result::Entity)
                .if_not_exists()
                .to_owned(),
        ];

        for statement in statements {
            self.db
                .execute(backend.build(&statement))
                .await
                .map_err(StoreError::backend)?;
        }

        tracing::debug!(backend = ?backend, "Idempotency schema ready");
        Ok(())
    }

    /// Delete expired lock and result rows, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = current_timestamp();

        let locks = idempotency_lock::Entity::delete_many()
            .filter(idempotency_lock::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .map_err(StoreError::backend)?;
        let results = idempotency_result::Entity::delete_many()
            .filter(idempotency_result::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .map_err(StoreError::backend)?;

        Ok(locks.rows_affected + results.rows_affected)
    }
}

#[async_trait]
impl Store for DistributedStore {
    async fn lock(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, StoreError> {
        let now = current_timestamp();

        // Clear an expired holder; a live row never matches this filter
        idempotency_lock::Entity::delete_many()
            .filter(idempotency_lock::Column::LockKey.eq(key))
            .filter(idempotency_lock::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .map_err(StoreError::backend)?;

        let token = LockToken::generate();
        let row = idempotency_lock::ActiveModel {
            lock_key: Set(key.to_string()),
            token: Set(token.as_str().to_string()),
            expires_at: Set(expiry_millis(now, ttl)),
        };

        match idempotency_lock::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(Some(token)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn unlock(&self, key: &str, token: &LockToken) -> Result<(), StoreError> {
        idempotency_lock::Entity::delete_many()
            .filter(idempotency_lock::Column::LockKey.eq(key))
            .filter(idempotency_lock::Column::Token.eq(token.as_str()))
            .exec(&self.db)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn set_result(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        token: &LockToken,
    ) -> Result<(), StoreError> {
        let now = current_timestamp();
        let txn = self.db.begin().await.map_err(StoreError::backend)?;

        let released = idempotency_lock::Entity::delete_many()
            .filter(idempotency_lock::Column::LockKey.eq(key))
            .filter(idempotency_lock::Column::Token.eq(token.as_str()))
            .exec(&txn)
            .await
            .map_err(StoreError::backend)?;

        if released.rows_affected == 0 {
            txn.rollback().await.map_err(StoreError::backend)?;
            return Err(StoreError::LockLost {
                key: key.to_string(),
            });
        }

        idempotency_result::Entity::delete_many()
            .filter(idempotency_result::Column::ResultKey.eq(key))
            .filter(idempotency_result::Column::ExpiresAt.lte(now))
            .exec(&txn)
            .await
            .map_err(StoreError::backend)?;

        let existing = idempotency_result::Entity::find_by_id(key.to_string())
            .one(&txn)
            .await
            .map_err(StoreError::backend)?;

        if existing.is_none() {
            let row = idempotency_result::ActiveModel {
                result_key: Set(key.to_string()),
                value: Set(value.to_vec()),
                expires_at: Set(expiry_millis(now, ttl)),
            };
            idempotency_result::Entity::insert(row)
                .exec_without_returning(&txn)
                .await
                .map_err(StoreError::backend)?;
        }

        txn.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_result(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row = idempotency_result::Entity::find()
            .filter(idempotency_result::Column::ResultKey.eq(key))
            .filter(idempotency_result::Column::ExpiresAt.gt(current_timestamp()))
            .one(&self.db)
            .await
            .map_err(StoreError::backend)?;

        Ok(row.map(|r| r.value))
    }

    fn as_refreshable(self: Arc<Self>) -> Option<Arc<dyn RefreshableStore>> {
        Some(self)
    }

    fn kind(&self) -> &'static str {
        StoreKind::Database.as_str()
    }
}

#[async_trait]
impl RefreshableStore for DistributedStore {
    async fn refresh(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = expiry_millis(current_timestamp(), ttl);

        let updated = idempotency_lock::Entity::update_many()
            .col_expr(idempotency_lock::Column::ExpiresAt, Expr::value(expires_at))
            .filter(idempotency_lock::Column::LockKey.eq(key))
            .filter(idempotency_lock::Column::Token.eq(token.as_str()))
            .exec(&self.db)
            .await
            .map_err(StoreError::backend)?;

        if updated.rows_affected == 0 {
            return Err(StoreError::LockLost {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}
