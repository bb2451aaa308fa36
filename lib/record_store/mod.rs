use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::{Pool, PoolError};
use diesel_async::RunQueryDsl;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::db::models::RecordInfo;
use crate::db::schema::t_record_info;
use crate::sync_service::types::Watermark;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    DieselError(#[from] diesel::result::Error),

    #[error(transparent)]
    DBPoolError(#[from] PoolError),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view over the account record table.
///
/// Every method returns rows in ascending `id` order; no matches is `Ok(vec![])`.
pub trait RecordStore: Send + Sync {
    /// Startup snapshot: every row whose key is in `keys`.
    fn find_records_by_keys<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>>;

    /// Rows with `id` strictly greater than `after`.
    fn find_records_after<'a>(
        &'a self,
        after: Watermark,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>>;

    /// Current rows of one account.
    fn find_account_records<'a>(
        &'a self,
        account: &'a str,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>>;
}

impl<T> RecordStore for Arc<T>
where
    T: RecordStore + ?Sized,
{
    fn find_records_by_keys<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        (**self).find_records_by_keys(keys)
    }

    fn find_records_after<'a>(
        &'a self,
        after: Watermark,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        (**self).find_records_after(after, keys)
    }

    fn find_account_records<'a>(
        &'a self,
        account: &'a str,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        (**self).find_account_records(account, keys)
    }
}

/// Postgres-backed store used by the production runtime.
pub struct PgRecordStore {
    pool: Pool<diesel_async::AsyncPgConnection>,
}

impl PgRecordStore {
    pub fn new(pool: Pool<diesel_async::AsyncPgConnection>) -> Self {
        Self { pool }
    }

    /// Fails fast when the database cannot be reached at startup.
    pub async fn check_connection(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        t_record_info::table
            .select(t_record_info::id)
            .limit(1)
            .load::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}

impl RecordStore for PgRecordStore {
    fn find_records_by_keys<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.pool.get().await?;
            let rows = t_record_info::table
                .filter(t_record_info::key.eq_any(keys.to_vec()))
                .order(t_record_info::id.asc())
                .select(RecordInfo::as_select())
                .load(&mut conn)
                .await?;
            Ok(rows)
        })
    }

    fn find_records_after<'a>(
        &'a self,
        after: Watermark,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.pool.get().await?;
            let query = t_record_info::table
                .filter(t_record_info::key.eq_any(keys.to_vec()))
                .order(t_record_info::id.asc())
                .select(RecordInfo::as_select());

            let rows = match after.id() {
                Some(id) => {
                    query
                        .filter(t_record_info::id.gt(id))
                        .load(&mut conn)
                        .await?
                }
                None => query.load(&mut conn).await?,
            };
            Ok(rows)
        })
    }

    fn find_account_records<'a>(
        &'a self,
        account: &'a str,
        keys: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<RecordInfo>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.pool.get().await?;
            let rows = t_record_info::table
                .filter(t_record_info::account.eq(account))
                .filter(t_record_info::key.eq_any(keys.to_vec()))
                .order(t_record_info::id.asc())
                .select(RecordInfo::as_select())
                .load(&mut conn)
                .await?;
            Ok(rows)
        })
    }
}
